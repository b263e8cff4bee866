//! Response sanitising: turn raw model text into parsed JSON.
//!
//! Even when asked for `application/json`, models wrap replies in
//! ```` ```json ```` fences, prepend a stray `json` tag or a sentence of
//! preamble, or leave a trailing comma after the last array element. The
//! passes here are deterministic string rules; each one is independently
//! tested.
//!
//! ## Order
//!
//! 1. Strip invisible characters (BOM, zero-width spaces)
//! 2. Strip outer code fences
//! 3. Strip a bare leading `json` tag
//! 4. Trim whitespace
//! 5. Parse; on failure run the repair pass (slice to the outermost
//!    brackets, drop trailing commas) and parse again
//!
//! A reply that still does not parse becomes
//! [`ApiError::MalformedResponse`] carrying the original text.

use crate::error::ApiError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Strip wrapping artifacts without parsing.
pub fn clean_response(raw: &str) -> String {
    let s = remove_invisible_chars(raw);
    let s = strip_code_fences(&s);
    let s = strip_json_tag(&s);
    s.trim().to_string()
}

/// Sanitize and parse `raw` into a JSON value.
pub fn parse_value(raw: &str) -> Result<Value, ApiError> {
    let cleaned = clean_response(raw);
    if cleaned.is_empty() {
        return Err(malformed("empty response", raw));
    }

    let first_err = match serde_json::from_str::<Value>(&cleaned) {
        Ok(v) => return Ok(v),
        Err(e) => e,
    };

    let repaired = repair_json(&cleaned);
    serde_json::from_str::<Value>(&repaired).map_err(|_| malformed(&first_err.to_string(), raw))
}

/// Sanitize `raw` and deserialize it into `T`.
pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, ApiError> {
    let value = parse_value(raw)?;
    serde_json::from_value(value).map_err(|e| malformed(&format!("unexpected shape: {e}"), raw))
}

fn malformed(reason: &str, raw: &str) -> ApiError {
    ApiError::MalformedResponse {
        reason: reason.to_string(),
        raw: raw.to_string(),
    }
}

// ── Pass 1: invisible characters ─────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}'))
        .collect()
}

// ── Pass 2: outer code fences ────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)\r?\n?```\s*$").unwrap()
});

static RE_INNER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n(.*?)\r?\n```").unwrap());

fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    if let Some(caps) = RE_OUTER_FENCES.captures(trimmed) {
        return caps[1].to_string();
    }
    // Fence preceded by a sentence of preamble ("Here is the JSON: ```json …```").
    if let Some(caps) = RE_INNER_FENCE.captures(trimmed) {
        return caps[1].to_string();
    }
    trimmed.to_string()
}

// ── Pass 3: bare `json` tag ──────────────────────────────────────────────

fn strip_json_tag(input: &str) -> String {
    let trimmed = input.trim_start();
    match trimmed.strip_prefix("json").or_else(|| trimmed.strip_prefix("JSON")) {
        Some(rest) if rest.trim_start().starts_with(['{', '[']) => rest.to_string(),
        _ => input.to_string(),
    }
}

// ── Pass 5: repair ───────────────────────────────────────────────────────

/// Best-effort repair: keep the outermost JSON container, drop trailing commas.
fn repair_json(input: &str) -> String {
    let sliced = slice_outer_container(input).unwrap_or(input);
    remove_trailing_commas(sliced)
}

/// Drop a comma whose next non-space character closes an object or array.
/// Text inside string literals is copied untouched.
fn remove_trailing_commas(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in input.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' if input[i + 1..].trim_start().starts_with(['}', ']']) => {}
            _ => out.push(c),
        }
    }
    out
}

fn slice_outer_container(input: &str) -> Option<&str> {
    let start = input.find(['{', '['])?;
    let close = if input[start..].starts_with('{') { '}' } else { ']' };
    let end = input.rfind(close)?;
    (end > start).then(|| &input[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn fenced_and_unfenced_parse_identically() {
        let body = r#"{"summary": "Cells", "key_points": ["mitosis", "meiosis"]}"#;
        let fenced = format!("```json\n{body}\n```");
        assert_eq!(parse_value(&fenced).unwrap(), parse_value(body).unwrap());
    }

    #[test]
    fn bare_fence_without_language() {
        let raw = "```\n[1, 2, 3]\n```";
        assert_eq!(parse_value(raw).unwrap(), json!([1, 2, 3]));
    }

    #[test]
    fn crlf_fence() {
        let raw = "```json\r\n{\"a\": 1}\r\n```\r\n";
        assert_eq!(parse_value(raw).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn fence_after_preamble() {
        let raw = "Here is the analysis:\n```json\n{\"a\": true}\n```\nHope this helps!";
        assert_eq!(parse_value(raw).unwrap(), json!({"a": true}));
    }

    #[test]
    fn json_tag_and_whitespace() {
        let raw = "  json\n {\"a\": 2}  \n";
        assert_eq!(parse_value(raw).unwrap(), json!({"a": 2}));
    }

    #[test]
    fn bom_and_zero_width_removed() {
        let raw = "\u{FEFF}{\"a\":\u{200B} 3}";
        assert_eq!(parse_value(raw).unwrap(), json!({"a": 3}));
    }

    #[test]
    fn trailing_commas_repaired() {
        let raw = r#"{"key_points": ["a", "b",], "topics": [],}"#;
        assert_eq!(
            parse_value(raw).unwrap(),
            json!({"key_points": ["a", "b"], "topics": []})
        );
    }

    #[test]
    fn comma_repair_leaves_string_contents_alone() {
        let raw = r#"{"key_points": ["lists end like [a, b, ]", "say \"x, }\"",], }"#;
        assert_eq!(
            parse_value(raw).unwrap(),
            json!({"key_points": ["lists end like [a, b, ]", "say \"x, }\""]})
        );
    }

    #[test]
    fn prose_around_object_is_sliced_off() {
        let raw = r#"Sure! {"a": [1]} Let me know if you need more."#;
        assert_eq!(parse_value(raw).unwrap(), json!({"a": [1]}));
    }

    #[test]
    fn malformed_yields_typed_error_with_raw_text() {
        let raw = "```json\n{\"summary\": \"unterminated\n```";
        match parse_value(raw) {
            Err(ApiError::MalformedResponse { raw: kept, .. }) => assert_eq!(kept, raw),
            other => panic!("expected MalformedResponse, got {other:?}"),
        }
    }

    #[test]
    fn empty_is_malformed() {
        assert!(matches!(
            parse_value("```json\n```"),
            Err(ApiError::MalformedResponse { .. })
        ));
        assert!(matches!(parse_value("   "), Err(ApiError::MalformedResponse { .. })));
    }

    #[test]
    fn wrong_shape_is_malformed() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Needs {
            questions: Vec<String>,
        }
        let err = parse_json::<Needs>(r#"{"summary": "x"}"#).unwrap_err();
        match err {
            ApiError::MalformedResponse { reason, .. } => {
                assert!(reason.contains("unexpected shape"), "got: {reason}")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn clean_leaves_plain_text_alone() {
        assert_eq!(clean_response("  {\"a\":1}\n"), "{\"a\":1}");
    }
}
