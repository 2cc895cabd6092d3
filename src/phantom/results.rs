//! Result payload handling: locating the result file and decoding profiles.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::PhantomError;
use crate::models::ProfileData;

// Finished agents print "JSON saved at <url>" in their console output.
static RESULT_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"JSON saved at (https?://\S+\.json)").unwrap());

/// Scan container console output for the result file URL.
pub fn extract_result_url(output: &str) -> Option<String> {
    RESULT_URL
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Decode a result payload into profiles. The payload is an array of profile
/// objects, but webhooks sometimes deliver it JSON-encoded inside a string;
/// one level of re-parsing is tolerated. Anything else is a parse error so
/// the caller can record it instead of silently storing nothing.
pub fn parse_profiles(value: &Value) -> Result<Vec<ProfileData>, PhantomError> {
    match value {
        Value::Array(entries) => Ok(entries.iter().map(ProfileData::from_value).collect()),
        Value::String(s) => {
            let inner: Value = serde_json::from_str(s)
                .map_err(|e| PhantomError::Parse(format!("result string is not JSON: {e}")))?;
            match inner {
                Value::Array(entries) => {
                    Ok(entries.iter().map(ProfileData::from_value).collect())
                }
                other => Err(PhantomError::Parse(format!(
                    "result string decoded to {} instead of an array",
                    json_kind(&other)
                ))),
            }
        }
        other => Err(PhantomError::Parse(format!(
            "expected a result array, got {}",
            json_kind(other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
