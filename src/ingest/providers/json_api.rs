// src/ingest/providers/json_api.rs
use serde_json::{Map, Value};

use super::Extraction;
use crate::ingest::clean_opt;
use crate::ingest::error::ExtractionError;
use crate::ingest::normalize::{DEFAULT_DESCRIPTION, DEFAULT_TITLE};
use crate::ingest::types::CandidateRecord;

/// Top-level keys that may wrap the record array, in priority order.
pub const CONTAINER_KEYS: &[&str] = &["scholarships", "data", "results", "items"];

const TITLE_KEYS: &[&str] = &["title", "name"];
const DESCRIPTION_KEYS: &[&str] = &["description", "summary", "details"];
const AMOUNT_KEYS: &[&str] = &["amount", "value"];
const DEADLINE_KEYS: &[&str] = &["deadline", "due_date"];
const URL_KEYS: &[&str] = &["url", "link", "source_url"];

/// First alias holding a usable scalar; numbers are stringified.
fn field(obj: &Map<String, Value>, aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|k| match obj.get(*k)? {
        Value::String(s) => clean_opt(Some(s.as_str())),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn locate_items<'a>(
    root: &'a Value,
    items_key: Option<&str>,
) -> Result<&'a Vec<Value>, ExtractionError> {
    match root {
        Value::Array(items) => Ok(items),
        Value::Object(obj) => items_key
            .into_iter()
            .chain(CONTAINER_KEYS.iter().copied())
            .find_map(|k| obj.get(k)?.as_array())
            .ok_or_else(|| {
                ExtractionError::UnexpectedShape(format!(
                    "no array under any of {:?}",
                    items_key
                        .into_iter()
                        .chain(CONTAINER_KEYS.iter().copied())
                        .collect::<Vec<_>>()
                ))
            }),
        other => Err(ExtractionError::UnexpectedShape(format!(
            "top-level {} is neither array nor object",
            kind(other)
        ))),
    }
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One candidate per JSON object; non-object entries are skipped individually.
pub fn extract(body: &str, items_key: Option<&str>) -> Result<Extraction, ExtractionError> {
    let root: Value = serde_json::from_str(body).map_err(|e| ExtractionError::Malformed {
        format: "json",
        reason: e.to_string(),
    })?;
    let items = locate_items(&root, items_key)?;

    let mut out = Extraction::default();
    for (index, item) in items.iter().enumerate() {
        let Value::Object(obj) = item else {
            out.skipped.push(ExtractionError::Item {
                index,
                reason: format!("expected object, found {}", kind(item)),
            });
            continue;
        };
        out.candidates.push(CandidateRecord {
            title: Some(field(obj, TITLE_KEYS).unwrap_or_else(|| DEFAULT_TITLE.to_string())),
            description: Some(
                field(obj, DESCRIPTION_KEYS).unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
            ),
            raw_amount: field(obj, AMOUNT_KEYS),
            raw_deadline: field(obj, DEADLINE_KEYS),
            source_url: field(obj, URL_KEYS),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_level_array_with_aliases() {
        let body = r#"[
            {"name": "Lagos STEM Award", "summary": "For Lagos residents", "value": 250000,
             "due_date": "2026-02-28", "link": "https://api.test/1"},
            {"title": "Plain", "description": "d", "amount": "$300"}
        ]"#;
        let out = extract(body, None).unwrap();
        assert_eq!(out.candidates.len(), 2);
        let a = &out.candidates[0];
        assert_eq!(a.title.as_deref(), Some("Lagos STEM Award"));
        assert_eq!(a.description.as_deref(), Some("For Lagos residents"));
        assert_eq!(a.raw_amount.as_deref(), Some("250000"));
        assert_eq!(a.raw_deadline.as_deref(), Some("2026-02-28"));
        assert_eq!(a.source_url.as_deref(), Some("https://api.test/1"));
        assert_eq!(out.candidates[1].source_url, None);
    }

    #[test]
    fn container_keys_and_hint_are_honoured() {
        let body = r#"{"meta": {}, "results": [{"title": "R"}], "awards": [{"title": "A"}]}"#;
        let default = extract(body, None).unwrap();
        assert_eq!(default.candidates[0].title.as_deref(), Some("R"));
        let hinted = extract(body, Some("awards")).unwrap();
        assert_eq!(hinted.candidates[0].title.as_deref(), Some("A"));
        assert_eq!(
            hinted.candidates[0].description.as_deref(),
            Some(DEFAULT_DESCRIPTION)
        );
    }

    #[test]
    fn non_object_entries_are_skipped_not_fatal() {
        let body = r#"{"data": [1, {"title": "ok"}, "x", null]}"#;
        let out = extract(body, None).unwrap();
        assert_eq!(out.candidates.len(), 1);
        assert_eq!(out.skipped.len(), 3);
        assert_eq!(
            out.skipped[0],
            ExtractionError::Item {
                index: 0,
                reason: "expected object, found number".into()
            }
        );
    }

    #[test]
    fn unusable_shapes_are_errors() {
        assert!(matches!(
            extract("not json", None),
            Err(ExtractionError::Malformed { format: "json", .. })
        ));
        assert!(matches!(
            extract(r#"{"nothing": 1}"#, None),
            Err(ExtractionError::UnexpectedShape(_))
        ));
        assert!(matches!(
            extract("42", None),
            Err(ExtractionError::UnexpectedShape(_))
        ));
    }
}
