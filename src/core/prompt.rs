use crate::core::engine::SearchError;
use crate::models::Profile;

/// Default byte budget for the serialized corpus plus query
pub const DEFAULT_MAX_CORPUS_BYTES: usize = 48_000;

const SYSTEM_PROMPT: &str = "You are an assistant that searches a directory of member profiles \
using natural language queries. You analyze the profiles you are given and return the ones \
that match the search criteria, best match first, with a short explanation for each.";

const FEW_SHOT_EXAMPLES: &str = r#"Query: "Find developers interested in AI and machine learning"
Relevant criteria: skills in AI, ML or deep learning, or collaboration interests in AI projects

Query: "Show me full-stack developers with React experience"
Relevant criteria: skills mentioning full-stack, React or web development

Query: "Find people interested in blockchain projects"
Relevant criteria: blockchain skills, crypto projects or Web3 collaboration interests"#;

const RESPONSE_CONTRACT: &str = r#"Respond with ONLY a JSON array and no other text. Each element must be an object with exactly two string fields:
  {"id": "<profile id>", "reason": "<one sentence explaining the match>"}
Order the array from best match to worst match. Include each profile at most once.
Use only "id" values that appear in the profiles above, copied exactly. Fabricated ids are invalid: an id that is not present in the profile list must never appear in your answer.
If no profile matches, respond with []."#;

/// Instruction payload sent to the reasoning backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub system: String,
    pub user: String,
    /// Bytes taken by the serialized corpus records
    pub corpus_bytes: usize,
    pub profile_count: usize,
}

impl Payload {
    /// Total size of the instruction text in bytes
    pub fn len(&self) -> usize {
        self.system.len() + self.user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Compact record of the fields that carry matching semantics
fn profile_record(profile: &Profile) -> String {
    serde_json::json!({
        "id": profile.id,
        "skills": profile.skills,
        "bio": profile.bio,
        "projects": profile.projects,
        "collaboration_interests": profile.collaboration_interests,
    })
    .to_string()
}

/// Serializes a query and corpus into a bounded payload
///
/// Overflow policy is to reject: a corpus that does not fit the budget fails
/// with [`SearchError::PayloadTooLarge`]; profiles are never dropped.
#[derive(Debug, Clone, Copy)]
pub struct PromptBuilder {
    max_corpus_bytes: usize,
}

impl PromptBuilder {
    pub fn new(max_corpus_bytes: usize) -> Self {
        Self { max_corpus_bytes }
    }

    pub fn build(&self, query: &str, corpus: &[Profile]) -> Result<Payload, SearchError> {
        let mut records = String::new();
        for profile in corpus {
            records.push_str(&profile_record(profile));
            records.push('\n');

            // Fail fast rather than serializing a huge corpus just to reject it
            if records.len() + query.len() > self.max_corpus_bytes {
                break;
            }
        }

        let size = records.len() + query.len();
        if size > self.max_corpus_bytes {
            return Err(SearchError::PayloadTooLarge {
                size,
                limit: self.max_corpus_bytes,
            });
        }

        // A JSON string literal keeps quotes and newlines in the query from
        // bleeding into the surrounding instructions
        let quoted_query = serde_json::Value::String(query.to_string()).to_string();

        let user = format!(
            "{FEW_SHOT_EXAMPLES}\n\nCurrent query: {quoted_query}\n\n\
             Profiles (one JSON object per line):\n{records}\n{RESPONSE_CONTRACT}"
        );

        Ok(Payload {
            system: SYSTEM_PROMPT.to_string(),
            user,
            corpus_bytes: records.len(),
            profile_count: corpus.len(),
        })
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CORPUS_BYTES)
    }
}
