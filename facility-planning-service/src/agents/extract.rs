//! Extraction of JSON embedded in model prose.
//!
//! Generative responses often wrap their payload in commentary or code
//! fences. These helpers locate the first balanced `[...]` or `{...}`
//! span (string- and escape-aware) and parse it. The failure mode is
//! explicit: no balanced span or unparseable JSON yields `None` / an
//! empty collection, never an error.

use serde::de::DeserializeOwned;

/// Locate the first balanced JSON array or object span in `text`.
pub fn first_json_span(text: &str) -> Option<&str> {
    let start = text.find(['[', '{'])?;
    let open = text[start..].chars().next()?;
    let close = if open == '[' { ']' } else { '}' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        } else if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Some(&text[start..start + i + c.len_utf8()]);
            }
        }
    }
    None
}

/// Parse the first balanced span as `T`. `None` when there is no span or
/// it does not deserialize.
pub fn extract_object<T: DeserializeOwned>(text: &str) -> Option<T> {
    let span = first_json_span(text)?;
    serde_json::from_str(span).ok()
}

/// Parse the first balanced span as a list of `T`. A lone object is
/// wrapped into a single-element list, mirroring responses that return
/// one record where a list was requested. Anything unusable yields an
/// empty vec.
pub fn extract_array<T: DeserializeOwned>(text: &str) -> Vec<T> {
    let Some(span) = first_json_span(text) else {
        return Vec::new();
    };
    if span.starts_with('[') {
        serde_json::from_str(span).unwrap_or_default()
    } else {
        serde_json::from_str::<T>(span)
            .map(|one| vec![one])
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Facility {
        name: String,
    }

    #[test]
    fn finds_array_wrapped_in_prose() {
        let text = r#"Here is what I found:
            [{"name": "Korle-Bu"}, {"name": "Tamale Regional"}]
            Let me know if you need more."#;
        let facilities: Vec<Facility> = extract_array(text);
        assert_eq!(facilities.len(), 2);
        assert_eq!(facilities[0].name, "Korle-Bu");
    }

    #[test]
    fn nested_brackets_stay_balanced() {
        let text = r#"```json
            {"outer": {"inner": [1, 2, 3]}, "tail": "x"}
            ```"#;
        let span = first_json_span(text).unwrap();
        assert!(span.starts_with('{'));
        assert!(span.ends_with('}'));
        let value: serde_json::Value = serde_json::from_str(span).unwrap();
        assert_eq!(value["outer"]["inner"][2], 3);
    }

    #[test]
    fn brackets_inside_strings_are_ignored() {
        let text = r#"{"note": "beds [approx]", "quote": "she said \"ok}\""}"#;
        let span = first_json_span(text).unwrap();
        assert_eq!(span, text);
    }

    #[test]
    fn lone_object_is_wrapped_into_a_list() {
        let text = r#"Only one match: {"name": "Bolgatanga Central"} in the area."#;
        let facilities: Vec<Facility> = extract_array(text);
        assert_eq!(facilities.len(), 1);
    }

    #[test]
    fn no_span_yields_empty_collection() {
        let facilities: Vec<Facility> = extract_array("I could not find any facilities.");
        assert!(facilities.is_empty());
        assert!(first_json_span("plain prose").is_none());
    }

    #[test]
    fn unbalanced_span_yields_nothing() {
        assert!(first_json_span(r#"{"name": "Trailing"#).is_none());
    }

    #[test]
    fn mismatched_payload_yields_none() {
        let parsed: Option<Facility> = extract_object(r#"{"beds": 12}"#);
        assert!(parsed.is_none());
    }
}
