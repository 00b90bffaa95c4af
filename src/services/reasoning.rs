use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::core::engine::SearchError;
use crate::core::prompt::Payload;

/// Failure of a single attempt against the reasoning backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend attempt timed out")]
    Timeout,

    #[error("backend is rate limiting requests")]
    RateLimited { retry_after: Option<Duration> },

    /// Network failures and 5xx-equivalent responses
    #[error("transient backend failure: {0}")]
    Transient(String),

    /// The backend refused the request itself; sending it again cannot help
    #[error("backend rejected the request: {0}")]
    Rejected(String),
}

impl BackendError {
    pub fn is_transient(&self) -> bool {
        !matches!(self, BackendError::Rejected(_))
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            BackendError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<BackendError> for SearchError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Timeout => SearchError::BackendTimeout,
            BackendError::RateLimited { retry_after } => SearchError::BackendRateLimited { retry_after },
            BackendError::Transient(message) => SearchError::BackendUnavailable(message),
            BackendError::Rejected(message) => SearchError::BackendRejected(message),
        }
    }
}

/// Opaque text-completion capability
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    /// Send one request carrying `payload` and return the completion text
    async fn complete(&self, payload: &Payload) -> Result<String, BackendError>;
}

/// Timeout and retry bounds for backend calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upper bound for a single attempt
    pub attempt_timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): doubles from
    /// `initial_backoff`, raised to a rate-limit hint, capped at `max_backoff`
    pub fn backoff(&self, retry: u32, hint: Option<Duration>) -> Duration {
        let exponential = self.initial_backoff.saturating_mul(1u32 << retry.min(16));
        let delay = match hint {
            Some(hint) => exponential.max(hint),
            None => exponential,
        };
        delay.min(self.max_backoff)
    }

    /// Upper bound on one call: every attempt runs to its timeout and every
    /// retry waits the full `max_backoff`
    pub fn worst_case(&self) -> Duration {
        let attempts = self.attempt_timeout.saturating_mul(self.max_retries.saturating_add(1));
        attempts.saturating_add(self.max_backoff.saturating_mul(self.max_retries))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(15),
            max_retries: 2,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(4),
        }
    }
}

/// Raw completion text and the number of retries it took
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub retries: u32,
}

/// Applies [`RetryPolicy`] around a [`ReasoningBackend`]
///
/// Every attempt is a fresh request; nothing from a failed attempt is kept.
#[derive(Clone)]
pub struct ReasoningClient {
    backend: Arc<dyn ReasoningBackend>,
    policy: RetryPolicy,
}

impl ReasoningClient {
    pub fn new(backend: Arc<dyn ReasoningBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    pub async fn complete(&self, payload: &Payload) -> Result<Completion, SearchError> {
        let mut retries = 0;

        loop {
            let attempt = tokio::time::timeout(self.policy.attempt_timeout, self.backend.complete(payload)).await;

            let err = match attempt {
                Ok(Ok(text)) => return Ok(Completion { text, retries }),
                Ok(Err(err)) => err,
                Err(_elapsed) => BackendError::Timeout,
            };

            if !err.is_transient() {
                tracing::error!("Reasoning backend rejected request: {}", err);
                return Err(err.into());
            }

            if retries >= self.policy.max_retries {
                tracing::error!("Reasoning backend failed after {} retries: {}", retries, err);
                return Err(err.into());
            }

            let delay = self.policy.backoff(retries, err.retry_after());
            retries += 1;
            tracing::warn!(
                "Reasoning backend attempt failed ({}), retry {} of {} in {:?}",
                err,
                retries,
                self.policy.max_retries,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Scripted reply for [`StubBackend`]
#[derive(Debug, Clone)]
pub enum StubReply {
    Text(String),
    Fail(BackendError),
    /// Never answers; only a timeout ends the attempt
    Hang,
}

/// Deterministic backend that plays back scripted replies in order
///
/// Once the script is used up it answers with the fallback text, or rejects
/// the request when there is none.
#[derive(Debug, Default)]
pub struct StubBackend {
    script: Mutex<VecDeque<StubReply>>,
    fallback: Option<String>,
    calls: AtomicUsize,
    payloads: Mutex<Vec<Payload>>,
}

impl StubBackend {
    pub fn new(script: impl IntoIterator<Item = StubReply>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Answer every request with the same text
    pub fn always(text: impl Into<String>) -> Self {
        Self {
            fallback: Some(text.into()),
            ..Self::default()
        }
    }

    /// Number of requests received so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn payloads(&self) -> Vec<Payload> {
        self.payloads.lock().await.clone()
    }
}

#[async_trait]
impl ReasoningBackend for StubBackend {
    async fn complete(&self, payload: &Payload) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.payloads.lock().await.push(payload.clone());

        let reply = self.script.lock().await.pop_front();
        match reply {
            Some(StubReply::Text(text)) => Ok(text),
            Some(StubReply::Fail(err)) => Err(err),
            Some(StubReply::Hang) => std::future::pending().await,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| BackendError::Rejected("stub script exhausted".to_string())),
        }
    }
}
