use serde::de::DeserializeOwned;
use serde_json::{from_str, from_value, Value};
use anyhow::Result;
use std::error::Error;
use std::fmt;
use std::fmt::Formatter;


/// Filters invalid content and tries to parse the valid json string.
///
/// The json part spans from the first `{` (or `[`, whichever comes first) to the last matching closing bracket,
/// so chatter around an object or array in a block is ignored. If that span does not parse, the span of the other
/// bracket kind is tried.
///
/// Returns a [serde_json::Value] if the string is valid json else an [InvalidJSON] error.
///
/// # Example
/// ```
/// use blockweave::utils::postprocess::json::filter_to_json;
/// let valid_str = "partially valid: {\"a\":\"alice\"}";
/// let json_value = filter_to_json(valid_str).expect("Expect to be fine but failed");
/// assert_eq!(json_value["a"], "alice");
///
/// let invalid_str = "partially valid: \"a\":\"alice\"}";
/// assert_eq!(filter_to_json(invalid_str).is_err(), true)
/// ```
pub fn filter_to_json(string: impl Into<String>) -> Result<Value> {
    let string = string.into();
    let mut spans: Vec<(usize, usize)> = [span(&string, '{', '}'), span(&string, '[', ']')]
        .into_iter()
        .flatten()
        .collect();
    spans.sort();
    // a bracketed aside may open before the json itself
    let mut first_error = None;
    for (left, right) in spans {
        match from_str(&string[left..right + 1]) {
            Ok(value) => return Ok(value),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e.into()),
        None => Err(InvalidJSON { invalid_string: string }.into()),
    }
}

/// Like [filter_to_json] but deserializes into `T`.
pub fn filter_to<T: DeserializeOwned>(string: impl Into<String>) -> Result<T> {
    let value = filter_to_json(string)?;
    Ok(from_value(value)?)
}

fn span(string: &str, open: char, close: char) -> Option<(usize, usize)> {
    let left = string.find(open)?;
    let right = string.rfind(close)?;
    (left < right).then_some((left, right))
}

/// Error when the string is not a valid json.
#[derive(Debug, Clone)]
pub struct InvalidJSON {
    pub invalid_string: String,
}


impl fmt::Display for InvalidJSON {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid string to be parsed:\n{}", self.invalid_string)
    }
}

impl Error for InvalidJSON {}
