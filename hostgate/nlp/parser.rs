use indexmap::IndexMap;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::interpretation::{
    clamp_confidence, Intent, Interpretation, SafetyLevel, DEFAULT_CONFIDENCE,
};

/// Explanation used when a reply omits one.
pub const DEFAULT_EXPLANATION: &str = "Unable to interpret command";

/// Reasons a provider reply could not be turned into an interpretation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// No `{ ... }` span in the reply.
    #[error("no JSON object found in reply")]
    NoObject,
    /// The span is not valid JSON.
    #[error("reply JSON is malformed: {0}")]
    Malformed(String),
    /// The span parsed but is not an object.
    #[error("reply JSON is not an object")]
    NotAnObject,
}

/// Extracts and normalises the interpretation embedded in a provider reply.
///
/// Chatty replies are tolerated: everything before the first `{` and after
/// the last `}` is ignored. Missing or mistyped fields take their defaults
/// and the confidence is clamped.
pub fn parse_reply(reply: &str) -> Result<Interpretation, ParseError> {
    let span = json_span(reply).ok_or(ParseError::NoObject)?;
    let value: Value =
        serde_json::from_str(span).map_err(|err| ParseError::Malformed(err.to_string()))?;
    let object = value.as_object().ok_or(ParseError::NotAnObject)?;
    Ok(from_object(object))
}

fn json_span(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

fn from_object(object: &Map<String, Value>) -> Interpretation {
    let intent = object
        .get("intent")
        .and_then(Value::as_str)
        .map_or(Intent::Unknown, Intent::parse);

    let confidence = object
        .get("confidence")
        .and_then(|raw| match raw {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        })
        .map_or(DEFAULT_CONFIDENCE, clamp_confidence);

    let safety_level = object
        .get("safety_level")
        .and_then(Value::as_str)
        .and_then(SafetyLevel::parse)
        .unwrap_or(SafetyLevel::Caution);

    let requires_confirmation = object
        .get("requires_confirmation")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    let parameters = object
        .get("parameters")
        .and_then(Value::as_object)
        .map(flatten_parameters)
        .unwrap_or_default();

    Interpretation {
        intent,
        parameters,
        confidence,
        safety_level,
        requires_confirmation,
        suggested_command: text_field(object, "suggested_command").unwrap_or_default(),
        explanation: text_field(object, "explanation")
            .unwrap_or_else(|| DEFAULT_EXPLANATION.to_string()),
    }
}

fn text_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

// nested values are kept as their JSON text so parameters stay primitive
fn flatten_parameters(raw: &Map<String, Value>) -> IndexMap<String, Value> {
    raw.iter()
        .map(|(key, value)| {
            let value = match value {
                Value::Array(_) | Value::Object(_) => Value::String(value.to_string()),
                other => other.clone(),
            };
            (key.clone(), value)
        })
        .collect()
}
