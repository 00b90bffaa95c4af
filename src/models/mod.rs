// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{Match, Profile};
pub use requests::SearchRequest;
pub use responses::{ErrorResponse, HealthResponse, SearchResponse};
