use crate::config::StoreSettings;
use crate::models::Profile;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when reading from the profile store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: invalid API key")]
    Unauthorized,

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// Read-only access to the profile corpus
///
/// Implementations must tolerate concurrent calls without outside locking.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Every profile currently visible to search
    async fn list_all_profiles(&self) -> Result<Vec<Profile>, StoreError>;

    async fn get_profile(&self, id: &str) -> Result<Profile, StoreError> {
        self.list_all_profiles()
            .await?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("Profile {} not found", id)))
    }
}

/// Profile store backed by a Supabase (PostgREST) table
pub struct SupabaseProfileStore {
    base_url: String,
    api_key: String,
    table: String,
    client: Client,
}

impl SupabaseProfileStore {
    /// Create a new store client
    pub fn new(settings: &StoreSettings) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            base_url: settings.url.clone(),
            api_key: settings.api_key.clone(),
            table: settings.table.clone(),
            client,
        })
    }

    async fn fetch_rows(&self, filter: Option<&str>) -> Result<Vec<Value>, StoreError> {
        let mut url = format!(
            "{}/rest/v1/{}?select=*",
            self.base_url.trim_end_matches('/'),
            self.table
        );
        if let Some(filter) = filter {
            url.push('&');
            url.push_str(filter);
        }

        tracing::debug!("Fetching profiles from: {}", url);

        let response = self
            .client
            .get(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(StoreError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unable to read body".to_string());
            tracing::error!("Failed to fetch profiles: {} - {}", status, body);
            return Err(StoreError::ApiError(format!("Failed to fetch profiles: {}", status)));
        }

        let json: Value = response.json().await?;
        match json {
            Value::Array(rows) => Ok(rows),
            _ => Err(StoreError::InvalidResponse("Expected an array of rows".into())),
        }
    }
}

/// Deserialize and validate rows, skipping the ones that are not usable profiles
fn to_profiles(rows: Vec<Value>) -> Vec<Profile> {
    let total = rows.len();
    let profiles: Vec<Profile> = rows
        .into_iter()
        .filter_map(|row| match serde_json::from_value::<Profile>(row) {
            Ok(profile) => match profile.check() {
                Ok(()) => Some(profile),
                Err(e) => {
                    tracing::warn!("Skipping invalid profile {}: {}", profile.id, e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Skipping unreadable profile row: {}", e);
                None
            }
        })
        .collect();

    if profiles.len() < total {
        tracing::warn!("Loaded {} of {} profile rows", profiles.len(), total);
    }
    profiles
}

#[async_trait]
impl ProfileStore for SupabaseProfileStore {
    async fn list_all_profiles(&self) -> Result<Vec<Profile>, StoreError> {
        let rows = self.fetch_rows(None).await?;
        let profiles = to_profiles(rows);
        tracing::debug!("Loaded {} profiles", profiles.len());
        Ok(profiles)
    }

    async fn get_profile(&self, id: &str) -> Result<Profile, StoreError> {
        let filter = format!("id=eq.{}", urlencoding::encode(id));
        let rows = self.fetch_rows(Some(&filter)).await?;

        to_profiles(rows)
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("Profile {} not found", id)))
    }
}

/// Fixed in-memory corpus, mostly for tests and local runs
#[derive(Debug, Clone, Default)]
pub struct InMemoryProfileStore {
    profiles: Arc<Vec<Profile>>,
}

impl InMemoryProfileStore {
    pub fn new(profiles: Vec<Profile>) -> Self {
        Self {
            profiles: Arc::new(profiles),
        }
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn list_all_profiles(&self) -> Result<Vec<Profile>, StoreError> {
        Ok(self.profiles.as_ref().clone())
    }
}
