//! The JSON envelope wrapped around every API response.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{null_default, ApiMessage, ApiMessages, DynError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failure,
    Incomplete,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Failure => "failure",
            Status::Incomplete => "incomplete",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub status: Status,
    #[serde(default)]
    pub data: Value,
    #[serde(default, deserialize_with = "null_default")]
    pub msgs: Vec<ApiMessage>,
    #[serde(default)]
    job_id: Option<Value>,
}

impl Envelope {
    /// Parse a raw body, mapping anything unreadable to `InvalidResponse`.
    pub fn parse(http_status: u16, body: &str) -> Result<Self, DynError> {
        if body.trim().is_empty() {
            return Err(DynError::from_body(http_status, body, "empty body"));
        }
        serde_json::from_str(body)
            .map_err(|e| DynError::from_body(http_status, body, &format!("decode error ({})", e)))
    }

    /// The job identifier, whether the API sent it as a number or a string.
    pub fn job_id(&self) -> Option<String> {
        match self.job_id.as_ref()? {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    pub fn messages(&self) -> ApiMessages {
        ApiMessages(self.msgs.clone())
    }
}
