use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::core::parser::{self, Anomalies};
use crate::core::prompt::PromptBuilder;
use crate::models::Match;
use crate::services::reasoning::ReasoningClient;
use crate::services::store::ProfileStore;

/// Failure of a single search call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Profile corpus too large for one request: {size} bytes exceeds the {limit} byte budget")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Reasoning backend timed out")]
    BackendTimeout,

    #[error("Reasoning backend is rate limiting requests")]
    BackendRateLimited { retry_after: Option<Duration> },

    #[error("Reasoning backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Reasoning backend rejected the request: {0}")]
    BackendRejected(String),

    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    #[error("Profile store error: {0}")]
    ProfileStore(String),
}

impl SearchError {
    /// Stable machine-readable error code
    pub fn kind(&self) -> &'static str {
        match self {
            SearchError::InvalidQuery(_) => "invalid_query",
            SearchError::PayloadTooLarge { .. } => "payload_too_large",
            SearchError::BackendTimeout => "backend_timeout",
            SearchError::BackendRateLimited { .. } => "backend_rate_limited",
            SearchError::BackendUnavailable(_) => "backend_unavailable",
            SearchError::BackendRejected(_) => "backend_rejected",
            SearchError::MalformedResponse(_) => "malformed_response",
            SearchError::ProfileStore(_) => "profile_store_error",
        }
    }

    /// Whether repeating the same call later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SearchError::BackendTimeout
                | SearchError::BackendRateLimited { .. }
                | SearchError::BackendUnavailable(_)
                | SearchError::ProfileStore(_)
        )
    }
}

impl From<crate::services::store::StoreError> for SearchError {
    fn from(err: crate::services::store::StoreError) -> Self {
        SearchError::ProfileStore(err.to_string())
    }
}

/// Result of a search with the bookkeeping gathered along the way
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOutcome {
    /// Best match first
    pub matches: Vec<Match>,
    pub corpus_size: usize,
    pub anomalies: Anomalies,
    pub retries: u32,
}

/// Matching engine - turns a free-text query into ranked, explained matches
///
/// # Pipeline
/// 1. Snapshot the corpus from the profile store
/// 2. Build the bounded prompt payload
/// 3. Complete it through the reasoning client (timeouts and retries)
/// 4. Parse and validate the answer against the same snapshot
///
/// The engine keeps no state between calls and never writes to the store.
#[derive(Clone)]
pub struct MatchingEngine {
    store: Arc<dyn ProfileStore>,
    reasoning: ReasoningClient,
    prompt: PromptBuilder,
}

impl MatchingEngine {
    pub fn new(store: Arc<dyn ProfileStore>, reasoning: ReasoningClient, prompt: PromptBuilder) -> Self {
        Self { store, reasoning, prompt }
    }

    /// Ranked matches for `query`, best first
    pub async fn search(&self, query: &str) -> Result<Vec<Match>, SearchError> {
        self.search_detailed(query).await.map(|outcome| outcome.matches)
    }

    /// Like [`search`](Self::search), giving up once `deadline` has elapsed
    ///
    /// The in-flight backend request is dropped on expiry and the call
    /// reports [`SearchError::BackendTimeout`].
    pub async fn search_within(&self, query: &str, deadline: Duration) -> Result<SearchOutcome, SearchError> {
        match tokio::time::timeout(deadline, self.search_detailed(query)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Search abandoned after caller deadline of {:?}", deadline);
                Err(SearchError::BackendTimeout)
            }
        }
    }

    pub async fn search_detailed(&self, query: &str) -> Result<SearchOutcome, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::InvalidQuery("query must not be blank".to_string()));
        }

        let started = Instant::now();

        // Validation below must run against this exact snapshot
        let corpus = self.store.list_all_profiles().await?;
        if corpus.is_empty() {
            tracing::info!("Profile corpus is empty, nothing to match");
            return Ok(SearchOutcome::default());
        }

        let payload = self.prompt.build(query, &corpus)?;
        tracing::debug!(
            "Built payload: {} profiles, {} corpus bytes, {} bytes total",
            payload.profile_count,
            payload.corpus_bytes,
            payload.len()
        );

        let completion = self.reasoning.complete(&payload).await?;
        let parsed = parser::parse(&completion.text, &corpus)?;

        if parsed.anomalies.total() > 0 {
            tracing::warn!(
                "Discarded {} backend entries (unknown ids: {}, duplicates: {}, empty reasons: {})",
                parsed.anomalies.total(),
                parsed.anomalies.unknown_ids,
                parsed.anomalies.duplicates,
                parsed.anomalies.empty_reasons
            );
        }

        tracing::info!(
            "Search matched {} of {} profiles in {:?} ({} retries)",
            parsed.matches.len(),
            corpus.len(),
            started.elapsed(),
            completion.retries
        );

        Ok(SearchOutcome {
            matches: parsed.matches,
            corpus_size: corpus.len(),
            anomalies: parsed.anomalies,
            retries: completion.retries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Profile;
    use crate::services::reasoning::{RetryPolicy, StubBackend};
    use crate::services::store::InMemoryProfileStore;

    fn corpus() -> Vec<Profile> {
        vec![
            Profile {
                id: "p1".to_string(),
                name: "Ada".to_string(),
                skills: vec!["ML".to_string()],
                bio: "ML engineer".to_string(),
                projects: vec![],
                collaboration_interests: vec![],
                portfolio_url: "https://ada.dev".to_string(),
            },
            Profile {
                id: "p2".to_string(),
                name: "Bo".to_string(),
                skills: vec!["Frontend".to_string()],
                bio: "React dev".to_string(),
                projects: vec![],
                collaboration_interests: vec![],
                portfolio_url: "https://bo.dev".to_string(),
            },
        ]
    }

    fn engine(profiles: Vec<Profile>, stub: Arc<StubBackend>) -> MatchingEngine {
        MatchingEngine::new(
            Arc::new(InMemoryProfileStore::new(profiles)),
            ReasoningClient::new(stub, RetryPolicy::default()),
            PromptBuilder::default(),
        )
    }

    #[tokio::test]
    async fn test_blank_query_rejected_before_backend() {
        let stub = Arc::new(StubBackend::always("[]"));
        let engine = engine(corpus(), stub.clone());

        for query in ["", "   ", "\n\t"] {
            assert!(matches!(engine.search(query).await, Err(SearchError::InvalidQuery(_))));
        }
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_corpus_skips_backend() {
        let stub = Arc::new(StubBackend::always("[]"));
        let outcome = engine(vec![], stub.clone()).search_detailed("anyone").await.unwrap();

        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.corpus_size, 0);
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_outcome_reports_anomalies() {
        let stub = Arc::new(StubBackend::always(
            r#"[{"id": "p2", "reason": "React"}, {"id": "p7", "reason": "ghost"}, {"id": "p2", "reason": "again"}]"#,
        ));
        let outcome = engine(corpus(), stub).search_detailed("frontend").await.unwrap();

        assert_eq!(outcome.matches, vec![Match::new("p2", "React")]);
        assert_eq!(outcome.corpus_size, 2);
        assert_eq!(outcome.anomalies.unknown_ids, 1);
        assert_eq!(outcome.anomalies.duplicates, 1);
        assert_eq!(outcome.retries, 0);
    }

    #[tokio::test]
    async fn test_query_is_trimmed_before_prompting() {
        let stub = Arc::new(StubBackend::always("[]"));
        engine(corpus(), stub.clone()).search("  find ML experts \n").await.unwrap();

        let payloads = stub.payloads().await;
        assert!(payloads[0].user.contains("Current query: \"find ML experts\""));
    }

    #[test]
    fn test_error_kinds_are_distinct() {
        let errors = [
            SearchError::InvalidQuery(String::new()),
            SearchError::PayloadTooLarge { size: 2, limit: 1 },
            SearchError::BackendTimeout,
            SearchError::BackendRateLimited { retry_after: None },
            SearchError::BackendUnavailable(String::new()),
            SearchError::BackendRejected(String::new()),
            SearchError::MalformedResponse(String::new()),
            SearchError::ProfileStore(String::new()),
        ];
        let kinds: std::collections::HashSet<_> = errors.iter().map(SearchError::kind).collect();
        assert_eq!(kinds.len(), errors.len());

        assert!(!SearchError::InvalidQuery(String::new()).is_retryable());
        assert!(!SearchError::MalformedResponse(String::new()).is_retryable());
        assert!(SearchError::BackendRateLimited { retry_after: None }.is_retryable());
    }
}
