//! Robust JSON extraction from LLM responses: every provider funnels its
//! raw text through this before the caller ever sees `serde_json::Value`.
//!
//! Four-stage fallback: strip markdown fences, direct parse, find the
//! outermost `{ }` pair, then repair truncation by closing unbalanced
//! brackets/braces.

use serde_json::Value;

pub fn extract_json(text: &str) -> Result<Value, String> {
    let mut text = text.trim().to_string();

    if text.starts_with("```") {
        let lines: Vec<&str> = text.split('\n').collect();
        let end = if lines.last().map(|l| l.trim()) == Some("```") {
            lines.len() - 1
        } else {
            lines.len()
        };
        text = lines[1..end].join("\n").trim().to_string();
    }

    if let Ok(value) = serde_json::from_str::<Value>(&text) {
        return Ok(value);
    }

    let start = text.find('{');
    let end = text.rfind('}');
    if let (Some(start), Some(end)) = (start, end) {
        if end > start {
            if let Ok(value) = serde_json::from_str::<Value>(&text[start..=end]) {
                return Ok(value);
            }
        }
    }

    if let Some(start) = start {
        let mut fragment = text[start..].trim_end().trim_end_matches(',').to_string();
        let open_brackets = fragment.matches('[').count() as i64 - fragment.matches(']').count() as i64;
        for _ in 0..open_brackets.max(0) {
            fragment.push(']');
        }
        let open_braces = fragment.matches('{').count() as i64 - fragment.matches('}').count() as i64;
        for _ in 0..open_braces.max(0) {
            fragment.push('}');
        }
        if let Ok(value) = serde_json::from_str::<Value>(&fragment) {
            return Ok(value);
        }
    }

    Err(format!("could not extract JSON from response: {text}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_json_parses() {
        let value = extract_json(r#"{"summary": "a cat"}"#).unwrap();
        assert_eq!(value["summary"], "a cat");
    }

    #[test]
    fn strips_markdown_fences() {
        let value = extract_json("```json\n{\"summary\": \"a dog\"}\n```").unwrap();
        assert_eq!(value["summary"], "a dog");
    }

    #[test]
    fn finds_json_amid_leading_and_trailing_prose() {
        let value = extract_json("Sure, here you go:\n{\"summary\": \"ok\"}\nHope that helps!").unwrap();
        assert_eq!(value["summary"], "ok");
    }

    #[test]
    fn repairs_truncated_object() {
        let value = extract_json(r#"{"evaluations": [{"rule_id": "r1", "triggered": true"#).unwrap();
        assert!(value["evaluations"].is_array());
    }

    #[test]
    fn gives_up_gracefully_on_pure_prose() {
        assert!(extract_json("no json here at all").is_err());
    }
}
