// Core search pipeline exports
pub mod engine;
pub mod parser;
pub mod prompt;

pub use engine::{MatchingEngine, SearchError, SearchOutcome};
pub use parser::{parse, Anomalies, ParsedMatches};
pub use prompt::{Payload, PromptBuilder};
