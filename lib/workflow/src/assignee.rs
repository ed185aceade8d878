//! Assignee normalization.
//!
//! Definitions encode assignees and recipients in several historical shapes:
//! a single identifier string, an array of strings, an array of structured
//! `{id: "kind:identifier", ...}` records, or any of those JSON-encoded as a
//! string. Everything is normalized into a flat list of [`UserId`]s at the
//! boundary so the engine core never sees the ambiguous shapes.

use caseflow_core::UserId;
use serde_json::Value as JsonValue;

/// Normalizes any accepted assignee shape into a deduplicated user list.
///
/// Unrecognized shapes (numbers, booleans, records without an `id`)
/// contribute nothing rather than failing.
#[must_use]
pub fn normalize_assignees(value: &JsonValue) -> Vec<UserId> {
    let mut users = Vec::new();
    collect(value, &mut users);
    let mut seen = std::collections::HashSet::new();
    users.retain(|u| seen.insert(u.clone()));
    users
}

fn collect(value: &JsonValue, out: &mut Vec<UserId>) {
    match value {
        JsonValue::String(s) => {
            // A string that parses as structured data is parsed before
            // interpretation.
            if let Ok(parsed) = serde_json::from_str::<JsonValue>(s)
                && (parsed.is_array() || parsed.is_object())
            {
                collect(&parsed, out);
                return;
            }
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                out.push(UserId::new(trimmed));
            }
        }
        JsonValue::Array(items) => {
            for item in items {
                collect(item, out);
            }
        }
        JsonValue::Object(record) => {
            if let Some(id) = record.get("id").and_then(JsonValue::as_str) {
                let identifier = id.split_once(':').map_or(id, |(_, rest)| rest);
                if !identifier.is_empty() {
                    out.push(UserId::new(identifier));
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_identifier_string() {
        assert_eq!(
            normalize_assignees(&json!("alice")),
            vec![UserId::new("alice")]
        );
    }

    #[test]
    fn array_of_identifier_strings() {
        assert_eq!(
            normalize_assignees(&json!(["alice", "bob"])),
            vec![UserId::new("alice"), UserId::new("bob")]
        );
    }

    #[test]
    fn structured_records_extract_id_after_colon() {
        let value = json!([
            {"id": "user:alice", "name": "Alice"},
            {"id": "group:finance"}
        ]);
        assert_eq!(
            normalize_assignees(&value),
            vec![UserId::new("alice"), UserId::new("finance")]
        );
    }

    #[test]
    fn json_encoded_string_is_parsed_first() {
        let value = json!("[\"alice\", {\"id\": \"user:bob\"}]");
        assert_eq!(
            normalize_assignees(&value),
            vec![UserId::new("alice"), UserId::new("bob")]
        );
    }

    #[test]
    fn only_first_colon_splits() {
        let value = json!([{"id": "user:dept:alice"}]);
        assert_eq!(normalize_assignees(&value), vec![UserId::new("dept:alice")]);
    }

    #[test]
    fn duplicates_collapse() {
        let value = json!(["alice", {"id": "user:alice"}, "alice"]);
        assert_eq!(normalize_assignees(&value), vec![UserId::new("alice")]);
    }

    #[test]
    fn junk_shapes_contribute_nothing() {
        assert!(normalize_assignees(&json!(null)).is_empty());
        assert!(normalize_assignees(&json!(42)).is_empty());
        assert!(normalize_assignees(&json!({"name": "no id"})).is_empty());
        assert!(normalize_assignees(&json!("   ")).is_empty());
    }
}
