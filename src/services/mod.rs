// Service exports
pub mod cache;
pub mod completions;
pub mod reasoning;
pub mod store;

pub use cache::CachedProfileStore;
pub use completions::ChatCompletionsBackend;
pub use reasoning::{BackendError, Completion, ReasoningBackend, ReasoningClient, RetryPolicy, StubBackend, StubReply};
pub use store::{InMemoryProfileStore, ProfileStore, StoreError, SupabaseProfileStore};
