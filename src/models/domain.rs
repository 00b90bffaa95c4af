use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Member profile as stored in the profile store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Profile {
    pub id: String,
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub skills: Vec<String>,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub projects: Vec<String>,
    #[serde(default)]
    pub collaboration_interests: Vec<String>,
    #[validate(url, custom(function = "validate_https"))]
    pub portfolio_url: String,
}

impl Profile {
    /// Validate the profile and reject records that could not have been
    /// written through the profile API (empty name/skills, non-HTTPS portfolio).
    pub fn check(&self) -> Result<(), validator::ValidationErrors> {
        if self.id.trim().is_empty() {
            let mut errors = validator::ValidationErrors::new();
            errors.add("id", ValidationError::new("empty_id"));
            return Err(errors);
        }
        self.validate()
    }
}

fn validate_https(url: &str) -> Result<(), ValidationError> {
    if url.starts_with("https://") {
        Ok(())
    } else {
        Err(ValidationError::new("portfolio_url_not_https"))
    }
}

/// A ranked match produced by the reasoning backend and validated against the corpus
///
/// Position in the result list is the ranking; there is no score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    #[serde(rename = "id")]
    pub profile_id: String,
    pub reason: String,
}

impl Match {
    pub fn new(profile_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            profile_id: profile_id.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(url: &str) -> Profile {
        Profile {
            id: "p1".to_string(),
            name: "Ada".to_string(),
            skills: vec!["ML".to_string()],
            bio: "ML engineer".to_string(),
            projects: vec![],
            collaboration_interests: vec![],
            portfolio_url: url.to_string(),
        }
    }

    #[test]
    fn test_valid_profile() {
        assert!(profile("https://ada.dev").check().is_ok());
    }

    #[test]
    fn test_rejects_plain_http_portfolio() {
        assert!(profile("http://ada.dev").check().is_err());
        assert!(profile("not a url").check().is_err());
    }

    #[test]
    fn test_rejects_empty_skills_and_id() {
        let mut p = profile("https://ada.dev");
        p.skills.clear();
        assert!(p.check().is_err());

        let mut p = profile("https://ada.dev");
        p.id = "  ".to_string();
        assert!(p.check().is_err());
    }

    #[test]
    fn test_match_serializes_profile_id_as_id() {
        let json = serde_json::to_value(Match::new("p1", "ML skill match")).unwrap();
        assert_eq!(json, serde_json::json!({"id": "p1", "reason": "ML skill match"}));
    }

    #[test]
    fn test_profile_defaults_optional_lists() {
        let p: Profile = serde_json::from_value(serde_json::json!({
            "id": "p2",
            "name": "Bo",
            "skills": ["Frontend"],
            "portfolio_url": "https://bo.dev"
        }))
        .unwrap();
        assert!(p.projects.is_empty());
        assert_eq!(p.bio, "");
    }
}
