//! Profile Discovery - semantic profile matching service
//!
//! Turns a free-text query ("find developers with machine learning
//! experience") into a ranked list of member profiles, each with a short
//! justification, by asking an LLM reasoning backend to rank a snapshot of
//! the profile corpus and validating its answer against that snapshot.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use core::{MatchingEngine, PromptBuilder, SearchError, SearchOutcome};
pub use models::{Match, Profile, SearchRequest, SearchResponse};
pub use services::{ProfileStore, ReasoningBackend, ReasoningClient, RetryPolicy};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let payload = PromptBuilder::default().build("anyone", &[]).unwrap();
        assert_eq!(payload.profile_count, 0);
        assert_eq!(RetryPolicy::default().max_retries, 2);
    }
}
