use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;

use crate::core::engine::SearchError;
use crate::models::{Match, Profile};

/// Entries dropped while validating a backend response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Anomalies {
    /// Ids that do not reference a profile of the corpus
    pub unknown_ids: usize,
    /// Repeated ids after their first (highest-ranked) occurrence
    pub duplicates: usize,
    /// Entries with a blank reason
    pub empty_reasons: usize,
}

impl Anomalies {
    pub fn total(&self) -> usize {
        self.unknown_ids + self.duplicates + self.empty_reasons
    }
}

/// Validated matches plus the count of entries that had to be discarded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedMatches {
    pub matches: Vec<Match>,
    pub anomalies: Anomalies,
}

/// Parse the backend's text into matches and validate them against `corpus`
///
/// The text must hold a JSON array of `{"id", "reason"}` objects, optionally
/// wrapped in a markdown fence, surrounded by prose, or nested under a
/// `"matches"` key. Anything else is a [`SearchError::MalformedResponse`].
/// Entries naming profiles outside the corpus, repeated ids and blank reasons
/// are dropped; the relative order of the rest is kept.
pub fn parse(raw: &str, corpus: &[Profile]) -> Result<ParsedMatches, SearchError> {
    let entries = extract_entries(raw)?;

    let known: HashSet<&str> = corpus.iter().map(|p| p.id.as_str()).collect();
    let mut seen: HashSet<&str> = HashSet::with_capacity(entries.len());
    let mut parsed = ParsedMatches::default();

    for (index, entry) in entries.iter().enumerate() {
        let (id, reason) = read_entry(index, entry)?;

        if !known.contains(id) {
            tracing::debug!("Dropping match for unknown profile id {:?}", id);
            parsed.anomalies.unknown_ids += 1;
            continue;
        }
        if seen.contains(id) {
            parsed.anomalies.duplicates += 1;
            continue;
        }
        if reason.is_empty() {
            parsed.anomalies.empty_reasons += 1;
            continue;
        }

        seen.insert(id);
        parsed.matches.push(Match::new(id, reason));
    }

    Ok(parsed)
}

fn read_entry(index: usize, entry: &Value) -> Result<(&str, &str), SearchError> {
    let object = entry.as_object().ok_or_else(|| {
        SearchError::MalformedResponse(format!("entry {} is not an object", index))
    })?;

    let id = object
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| SearchError::MalformedResponse(format!("entry {} has no string \"id\"", index)))?;

    let reason = object
        .get("reason")
        .and_then(Value::as_str)
        .ok_or_else(|| SearchError::MalformedResponse(format!("entry {} has no string \"reason\"", index)))?;

    Ok((id.trim(), reason.trim()))
}

/// Locate the array of match entries in the raw text
fn extract_entries(raw: &str) -> Result<Vec<Value>, SearchError> {
    let text = strip_code_fence(raw.trim());

    let value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        // Models often wrap the array in a sentence or two
        Err(first_err) => embedded_array(text).ok_or_else(|| malformed(raw, &first_err.to_string()))?,
    };

    match value {
        Value::Array(entries) => Ok(entries),
        Value::Object(mut object) => match object.remove("matches") {
            Some(Value::Array(entries)) => Ok(entries),
            _ => Err(malformed(raw, "expected an array of matches")),
        },
        _ => Err(malformed(raw, "expected an array of matches")),
    }
}

/// First JSON array inside `text` that holds nothing but objects
///
/// Bracketed prose such as "top [2]" is skipped. When no array qualifies the
/// first one found is returned so entry checks can report what is wrong.
fn embedded_array(text: &str) -> Option<Value> {
    let mut first = None;

    for (start, _) in text.match_indices('[') {
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        let Some(Ok(Value::Array(entries))) = stream.next() else {
            continue;
        };

        if entries.iter().all(Value::is_object) {
            return Some(Value::Array(entries));
        }
        first.get_or_insert(Value::Array(entries));
    }

    first
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (e.g. "json") on the opening fence line
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn malformed(raw: &str, detail: &str) -> SearchError {
    let preview: String = raw.chars().take(120).collect();
    SearchError::MalformedResponse(format!("{} (response starts with {:?})", detail, preview))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(ids: &[&str]) -> Vec<Profile> {
        ids.iter()
            .map(|id| Profile {
                id: id.to_string(),
                name: format!("Member {}", id),
                skills: vec!["Rust".to_string()],
                bio: String::new(),
                projects: vec![],
                collaboration_interests: vec![],
                portfolio_url: format!("https://{}.example.com", id),
            })
            .collect()
    }

    fn ids(parsed: &ParsedMatches) -> Vec<&str> {
        parsed.matches.iter().map(|m| m.profile_id.as_str()).collect()
    }

    #[test]
    fn test_parses_plain_array() {
        let raw = r#"[{"id": "p1", "reason": "ML skill match"}]"#;
        let parsed = parse(raw, &corpus(&["p1", "p2"])).unwrap();
        assert_eq!(parsed.matches, vec![Match::new("p1", "ML skill match")]);
        assert_eq!(parsed.anomalies, Anomalies::default());
    }

    #[test]
    fn test_preserves_backend_order() {
        let raw = r#"[{"id": "p2", "reason": "b"}, {"id": "p1", "reason": "a"}]"#;
        let parsed = parse(raw, &corpus(&["p1", "p2"])).unwrap();
        assert_eq!(ids(&parsed), vec!["p2", "p1"]);
    }

    #[test]
    fn test_drops_unknown_and_duplicate_ids() {
        let raw = r#"[
            {"id": "p9", "reason": "invented"},
            {"id": "p1", "reason": "first"},
            {"id": "p1", "reason": "second"},
            {"id": "p2", "reason": "  "}
        ]"#;
        let parsed = parse(raw, &corpus(&["p1", "p2"])).unwrap();
        assert_eq!(parsed.matches, vec![Match::new("p1", "first")]);
        assert_eq!(
            parsed.anomalies,
            Anomalies { unknown_ids: 1, duplicates: 1, empty_reasons: 1 }
        );
        assert_eq!(parsed.anomalies.total(), 3);
    }

    #[test]
    fn test_all_filtered_is_empty_not_error() {
        let raw = r#"[{"id": "ghost", "reason": "made up"}]"#;
        let parsed = parse(raw, &corpus(&["p1"])).unwrap();
        assert!(parsed.matches.is_empty());
        assert_eq!(parsed.anomalies.unknown_ids, 1);

        assert!(parse("[]", &corpus(&["p1"])).unwrap().matches.is_empty());
    }

    #[test]
    fn test_accepts_fenced_and_wrapped_output() {
        let fenced = "```json\n[{\"id\": \"p1\", \"reason\": \"fits\"}]\n```";
        assert_eq!(ids(&parse(fenced, &corpus(&["p1"])).unwrap()), vec!["p1"]);

        let prose = "Here are the matches:\n[{\"id\": \"p1\", \"reason\": \"fits\"}]\nHope this helps!";
        assert_eq!(ids(&parse(prose, &corpus(&["p1"])).unwrap()), vec!["p1"]);

        let object = r#"{"matches": [{"id": "p1", "reason": "fits"}]}"#;
        assert_eq!(ids(&parse(object, &corpus(&["p1"])).unwrap()), vec!["p1"]);
    }

    #[test]
    fn test_brackets_in_surrounding_prose() {
        let before = "Here are the top [2] matches:\n[{\"id\": \"p1\", \"reason\": \"fits\"}]";
        assert_eq!(ids(&parse(before, &corpus(&["p1"])).unwrap()), vec!["p1"]);

        let after = "[{\"id\": \"p1\", \"reason\": \"fits [ML]\"}]\nNote: ids are from [the list].";
        let parsed = parse(after, &corpus(&["p1"])).unwrap();
        assert_eq!(parsed.matches, vec![Match::new("p1", "fits [ML]")]);

        let empty = "Sorry [none found]: []";
        assert!(parse(empty, &corpus(&["p1"])).unwrap().matches.is_empty());

        // Only a non-object array present: reported as an entry problem
        match parse("Ids: [\"p1\"] and more", &corpus(&["p1"])) {
            Err(SearchError::MalformedResponse(message)) => assert!(message.contains("not an object")),
            other => panic!("expected MalformedResponse, got {:?}", other),
        }
    }

    #[test]
    fn test_trims_ids_and_reasons() {
        let raw = r#"[{"id": " p1 ", "reason": " fits \n"}]"#;
        let parsed = parse(raw, &corpus(&["p1"])).unwrap();
        assert_eq!(parsed.matches, vec![Match::new("p1", "fits")]);
    }

    #[test]
    fn test_rejects_garbage() {
        for raw in [
            "I could not find anyone.",
            "",
            "[{'id': 'p1', 'reason': 'python literal'}]",
            r#"{"id": "p1", "reason": "not a list"}"#,
            r#"[{"id": 1, "reason": "numeric id"}]"#,
            r#"[{"id": "p1"}]"#,
            r#"["p1", "p2"]"#,
        ] {
            match parse(raw, &corpus(&["p1", "p2"])) {
                Err(SearchError::MalformedResponse(_)) => {}
                other => panic!("expected MalformedResponse for {:?}, got {:?}", raw, other),
            }
        }
    }
}
