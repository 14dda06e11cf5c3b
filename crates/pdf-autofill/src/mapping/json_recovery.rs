//! Recovers a JSON object from model output that was asked to be bare JSON
//! and frequently is not.

use anyhow::{anyhow, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static FENCED_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("fenced block regex is valid")
});

static TRAILING_COMMA_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r",\s*([}\]])").expect("trailing comma regex is valid"));

static WHITESPACE_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\s+").expect("whitespace regex is valid"));

/// Parse the first JSON object found in `output`.
///
/// Four-tier strategy:
/// 1. Direct JSON parse of the trimmed output
/// 2. Contents of a fenced code block
/// 3. The span from the first `{` to the last `}`
/// 4. That span with whitespace collapsed and trailing commas removed
pub fn parse_json_object(output: &str) -> Result<Map<String, Value>> {
    let trimmed = output.trim();

    // Strategy 1: direct parse
    if let Some(obj) = as_object(trimmed) {
        return Ok(obj);
    }

    // Strategy 2: fenced block
    if let Some(obj) = FENCED_RE
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .and_then(|m| as_object(m.as_str().trim()))
    {
        return Ok(obj);
    }

    // Strategy 3: outermost brace span
    let span = brace_span(trimmed)
        .ok_or_else(|| anyhow!("No JSON object in model output ({} chars)", output.len()))?;
    if let Some(obj) = as_object(span) {
        return Ok(obj);
    }

    // Strategy 4: cleanup
    let collapsed = WHITESPACE_RE.replace_all(span, " ");
    let cleaned = TRAILING_COMMA_RE.replace_all(&collapsed, "$1");
    if let Some(obj) = as_object(&cleaned) {
        return Ok(obj);
    }

    let preview: String = trimmed.chars().take(200).collect();
    Err(anyhow!("Model output is not a recoverable JSON object: {}", preview))
}

/// Field → value pairs as strings. Nulls and blank values are dropped.
pub fn to_string_map(obj: Map<String, Value>) -> BTreeMap<String, String> {
    obj.into_iter()
        .filter_map(|(k, v)| {
            let text = match v {
                Value::Null => return None,
                Value::String(s) => s,
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                other => other.to_string(),
            };
            (!text.trim().is_empty()).then_some((k, text))
        })
        .collect()
}

fn as_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(obj)) => Some(obj),
        _ => None,
    }
}

fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_object() {
        let obj = parse_json_object(r#" {"First Name": "John"} "#).unwrap();
        assert_eq!(obj["First Name"], "John");
    }

    #[test]
    fn test_fenced_block() {
        let output = "Here you go:\n```json\n{\"City\": \"Toronto\"}\n```\nLet me know!";
        let obj = parse_json_object(output).unwrap();
        assert_eq!(obj["City"], "Toronto");
    }

    #[test]
    fn test_brace_span_in_prose() {
        let obj = parse_json_object(r#"Mapping: {"a": "1", "b": {"c": 2}} done"#).unwrap();
        assert_eq!(obj["a"], "1");
    }

    #[test]
    fn test_trailing_commas_repaired() {
        let output = "{\n  \"a\": \"x\",\n  \"b\": [1, 2,],\n}";
        let obj = parse_json_object(output).unwrap();
        assert_eq!(obj["a"], "x");
        assert_eq!(obj["b"], serde_json::json!([1, 2]));
    }

    #[test]
    fn test_unrecoverable_output_errors() {
        assert!(parse_json_object("I cannot help with that.").is_err());
        assert!(parse_json_object("[1, 2, 3]").is_err());
        assert!(parse_json_object("{not json at all}").is_err());
    }

    #[test]
    fn test_string_map_drops_null_and_blank() {
        let obj = parse_json_object(r#"{"a": null, "b": "  ", "c": 3, "d": true, "e": "x"}"#).unwrap();
        let map = to_string_map(obj);
        assert_eq!(map.len(), 3);
        assert_eq!(map["c"], "3");
        assert_eq!(map["d"], "true");
        assert_eq!(map["e"], "x");
    }
}
