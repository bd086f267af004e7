//! Pull structured data out of free-form model and script output.

use serde_json::{Map, Value};

/// Result of looking for a JSON object inside arbitrary text.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    /// No complete, balanced `{...}` span exists.
    NotFound,
    /// A balanced span exists but is not a valid JSON object.
    Malformed { span: String, reason: String },
    Object(Map<String, Value>),
}

impl Extracted {
    pub fn object(self) -> Option<Map<String, Value>> {
        match self {
            Extracted::Object(map) => Some(map),
            _ => None,
        }
    }
}

/// Locate the first balanced `{...}` span in `text`.
///
/// Scans from the first `{`, tracking nesting depth and skipping braces that
/// appear inside JSON string literals, and stops at the brace that closes
/// the first one. Trailing prose, including further braces, is ignored.
pub fn balanced_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Every balanced `{...}` span in `text`, left to right.
///
/// Scanning resumes after each span. A `{` that never closes is skipped so a
/// later complete object is still found.
pub fn balanced_object_spans(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || loop {
        let start = rest.find('{')?;
        match balanced_object_span(&rest[start..]) {
            Some(span) => {
                rest = &rest[start + span.len()..];
                return Some(span);
            }
            None => rest = &rest[start + 1..],
        }
    })
}

/// Extract the first JSON object embedded in `text`.
pub fn extract_json(text: &str) -> Extracted {
    let Some(span) = balanced_object_span(text) else {
        return Extracted::NotFound;
    };
    match serde_json::from_str::<Value>(span) {
        Ok(Value::Object(map)) => Extracted::Object(map),
        Ok(_) => Extracted::Malformed {
            span: span.to_string(),
            reason: "not an object".into(),
        },
        Err(e) => Extracted::Malformed {
            span: span.to_string(),
            reason: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
    use serde_json::json;

    /// First `{` to last `}`; kept only to show where it goes wrong.
    fn greedy_span(text: &str) -> Option<&str> {
        Regex::new(r"(?s)\{.*\}")
            .unwrap()
            .find(text)
            .map(|m| m.as_str())
    }

    #[test]
    fn recovers_object_from_surrounding_prose() {
        let original = json!({
            "post_url": "/submit",
            "payload": {"answer": 4, "meta": {"source": "page"}}
        });
        let text = format!(
            "Sure! Here is the decision:\n```json\n{}\n```\nLet me know if {{anything}} else is needed.",
            serde_json::to_string_pretty(&original).unwrap()
        );

        let Extracted::Object(map) = extract_json(&text) else {
            panic!("expected object");
        };
        assert_eq!(Value::Object(map), original);
    }

    #[test]
    fn greedy_extraction_overreaches_where_balanced_does_not() {
        let original = json!({"answer": {"value": 4}});
        let text = format!("Result: {} (see {{notes}} below)", original);

        let greedy = greedy_span(&text).unwrap();
        assert_eq!(greedy, r#"{"answer":{"value":4}} (see {notes}"#);
        assert!(serde_json::from_str::<Value>(greedy).is_err());

        let balanced = balanced_object_span(&text).unwrap();
        assert_eq!(serde_json::from_str::<Value>(balanced).unwrap(), original);
    }

    #[test]
    fn braces_inside_strings_do_not_affect_depth() {
        let text = r#"out: {"answer": "a } b { c", "esc": "quote \" }"} trailing }"#;
        let map = extract_json(text).object().unwrap();
        assert_eq!(map["answer"], "a } b { c");
        assert_eq!(map["esc"], "quote \" }");
    }

    #[test]
    fn unbalanced_text_is_not_found() {
        assert_eq!(extract_json("no braces at all"), Extracted::NotFound);
        assert_eq!(extract_json(r#"{"answer": {"open": 1}"#), Extracted::NotFound);
        assert_eq!(extract_json("only a closer }"), Extracted::NotFound);
    }

    #[test]
    fn balanced_but_invalid_is_malformed() {
        match extract_json("reply: {answer: 4} done") {
            Extracted::Malformed { span, .. } => assert_eq!(span, "{answer: 4}"),
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[test]
    fn first_object_wins() {
        let map = extract_json(r#"{"a": 1} and {"b": 2}"#).object().unwrap();
        assert_eq!(map.get("a"), Some(&json!(1)));
        assert!(map.get("b").is_none());
    }

    #[test]
    fn spans_cover_every_object_in_order() {
        let text = r#"sent {"answer": 4} got {"correct": true, "note": "}"} done"#;
        let spans: Vec<&str> = balanced_object_spans(text).collect();
        assert_eq!(spans, vec![r#"{"answer": 4}"#, r#"{"correct": true, "note": "}"}"#]);
    }

    #[test]
    fn unclosed_brace_does_not_hide_later_objects() {
        let text = r#"log { unterminated then {"correct": true}"#;
        let spans: Vec<&str> = balanced_object_spans(text).collect();
        assert_eq!(spans, vec![r#"{"correct": true}"#]);
        assert_eq!(balanced_object_spans("no objects }{").count(), 0);
    }

    #[test]
    fn handles_multibyte_text() {
        let map = extract_json("résultat → {\"réponse\": \"été\"} ✓").object().unwrap();
        assert_eq!(map["réponse"], "été");
    }
}
