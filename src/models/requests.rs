use serde::{Deserialize, Serialize};
use validator::Validate;

/// Request to search profiles with a free-text query
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SearchRequest {
    #[validate(length(min = 1, max = 2000))]
    pub query: String,
}
