//! Tolerant extraction of a JSON object from free-form model output.

use serde_json::Value;
use warden_core::{Result, WardenError};

/// Pull the first JSON object out of `text`.
///
/// Code fences are stripped, then everything from the first `{` to the last
/// `}` is parsed. Anything that is not a JSON object is an `LlmParse` error.
pub fn extract_json_object(text: &str) -> Result<Value> {
    let stripped = strip_code_fences(text);
    let start = stripped
        .find('{')
        .ok_or_else(|| WardenError::LlmParse("no JSON object in response".into()))?;
    let end = stripped
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| WardenError::LlmParse("unterminated JSON object".into()))?;

    let value: Value = serde_json::from_str(&stripped[start..=end])
        .map_err(|e| WardenError::LlmParse(e.to_string()))?;
    if !value.is_object() {
        return Err(WardenError::LlmParse("top-level JSON is not an object".into()));
    }
    Ok(value)
}

fn strip_code_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}
