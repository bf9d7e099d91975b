use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::{Error, Result};

/// Key a request must carry the input document under.
pub const DOCUMENTS_KEY: &str = "documents";

/// An incoming summarization request.
///
/// Kept as raw JSON so that a missing or mistyped `documents` field is
/// reported as [`Error::InvalidInput`] at call time instead of failing
/// somewhere in deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Request(Value);

impl Request {
    pub fn new(documents: impl Into<String>) -> Self {
        let mut map = serde_json::Map::new();
        map.insert(DOCUMENTS_KEY.to_string(), Value::String(documents.into()));
        Self(Value::Object(map))
    }

    /// Extract the document text.
    pub fn documents(&self) -> Result<&str> {
        let map = self.0.as_object().ok_or_else(|| {
            Error::InvalidInput(format!("request must be a JSON object, got {}", json_type(&self.0)))
        })?;

        match map.get(DOCUMENTS_KEY) {
            Some(Value::String(text)) => Ok(text),
            Some(other) => Err(Error::InvalidInput(format!(
                "`{}` must be a string, got {}",
                DOCUMENTS_KEY,
                json_type(other)
            ))),
            None => Err(Error::InvalidInput(format!("missing key `{}`", DOCUMENTS_KEY))),
        }
    }
}

impl From<Value> for Request {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl From<&str> for Request {
    fn from(documents: &str) -> Self {
        Self::new(documents)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// One result record produced by a summarization backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub summary_text: String,
}

impl SummaryRecord {
    pub fn new(summary_text: impl Into<String>) -> Self {
        Self {
            summary_text: summary_text.into(),
        }
    }
}

/// The response contract: a single `summary` key holding the backend's records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Response {
    pub summary: Vec<SummaryRecord>,
}

impl Response {
    pub fn new(summary: Vec<SummaryRecord>) -> Self {
        Self { summary }
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// How an over-long input is cut down before it reaches the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationStrategy {
    /// Truncate the first sequence only. With a single document this keeps its head.
    OnlyFirst,
    LongestFirst,
    DoNotTruncate,
}

impl TruncationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnlyFirst => "only_first",
            Self::LongestFirst => "longest_first",
            Self::DoNotTruncate => "do_not_truncate",
        }
    }
}

impl fmt::Display for TruncationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
