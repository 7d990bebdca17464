use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Read an explicit `null` as the type's default.
pub(crate) fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One entry of the `msgs` list returned with every API response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMessage {
    #[serde(rename = "INFO", default, deserialize_with = "null_default")]
    pub info: String,
    #[serde(rename = "ERR_CD", default)]
    pub code: Option<String>,
    #[serde(rename = "LVL", default)]
    pub level: Option<String>,
    #[serde(rename = "SOURCE", default)]
    pub source: Option<String>,
}

impl ApiMessage {
    pub fn new(info: impl Into<String>) -> Self {
        Self {
            info: info.into(),
            code: None,
            level: None,
            source: None,
        }
    }
}

/// The sub-errors attached to a failed API call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiMessages(pub Vec<ApiMessage>);

impl ApiMessages {
    pub fn iter(&self) -> impl Iterator<Item = &ApiMessage> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when any message carries the given `ERR_CD`.
    pub fn has_code(&self, code: &str) -> bool {
        self.0.iter().any(|m| m.code.as_deref() == Some(code))
    }

    /// True when the API blamed the login, typically an expired token.
    pub fn is_login_failure(&self) -> bool {
        self.0.iter().any(|m| m.info.contains("login"))
    }
}

impl From<Vec<ApiMessage>> for ApiMessages {
    fn from(messages: Vec<ApiMessage>) -> Self {
        Self(messages)
    }
}

impl fmt::Display for ApiMessages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .filter(|m| !m.info.is_empty())
            .map(|m| format!("{}.", m.info))
            .collect::<Vec<_>>()
            .join(" ");
        if joined.is_empty() {
            f.write_str("An unknown error occurred.")
        } else {
            f.write_str(&joined)
        }
    }
}

#[derive(Error, Debug)]
pub enum DynError {
    #[error("Connection error: {0}")]
    Connect(String),

    #[error("Authentication failed: {0}")]
    Auth(ApiMessages),

    #[error("Create failed: {0}")]
    Create(ApiMessages),

    #[error("Update failed: {0}")]
    Update(ApiMessages),

    #[error("Get failed: {0}")]
    Get(ApiMessages),

    #[error("Delete failed: {0}")]
    Delete(ApiMessages),

    #[error("Job {job} did not complete within {elapsed:?}")]
    QueryTimeout { job: String, elapsed: Duration },

    #[error("No session found for {0}")]
    NotFound(String),

    #[error("Invalid argument ({arg}, {value})")]
    InvalidArgument { arg: String, value: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Secret sealing failed: {0}")]
    Cipher(String),

    /// Message Management status 451
    #[error("API key missing or invalid: {0}")]
    ApiKey(String),

    /// Message Management status 452
    #[error("Request rejected: {0}")]
    InvalidRequest(String),

    /// Message Management status 453
    #[error("Object error: {0}")]
    Object(String),
}

impl From<reqwest::Error> for DynError {
    fn from(err: reqwest::Error) -> Self {
        DynError::Connect(err.to_string())
    }
}

/// Maximum length for response bodies quoted in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl DynError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..end],
                body.len()
            )
        }
    }

    /// Error for a body that could not be read as a response envelope.
    pub(crate) fn from_body(status: u16, body: &str, reason: &str) -> Self {
        let truncated = Self::truncate_body(body);
        if body.trim().is_empty() {
            DynError::InvalidResponse(format!("Status {}: empty response body", status))
        } else {
            DynError::InvalidResponse(format!("Status {}: {}: {}", status, reason, truncated))
        }
    }

    pub fn invalid_argument(arg: impl Into<String>, value: impl fmt::Display) -> Self {
        DynError::InvalidArgument {
            arg: arg.into(),
            value: value.to_string(),
        }
    }

    /// API messages attached to a verb-specific or auth failure.
    pub fn messages(&self) -> Option<&ApiMessages> {
        match self {
            DynError::Auth(m)
            | DynError::Create(m)
            | DynError::Update(m)
            | DynError::Get(m)
            | DynError::Delete(m) => Some(m),
            _ => None,
        }
    }

    /// True for login failures and for CRUD failures caused by an expired
    /// or invalidated token. The session has to authenticate again.
    pub fn needs_reauth(&self) -> bool {
        match self {
            DynError::Auth(_) => true,
            _ => self.messages().is_some_and(ApiMessages::is_login_failure),
        }
    }

    /// Only transport failures are worth retrying at the caller's level.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DynError::Connect(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_display_joins_info() {
        let messages = ApiMessages(vec![
            ApiMessage::new("zone: No such zone"),
            ApiMessage::new("detail: Operation failed"),
        ]);
        assert_eq!(
            messages.to_string(),
            "zone: No such zone. detail: Operation failed."
        );
    }

    #[test]
    fn test_messages_display_empty() {
        assert_eq!(ApiMessages::default().to_string(), "An unknown error occurred.");
    }

    #[test]
    fn test_message_parses_api_keys() {
        let json = r#"{"INFO": "login: Credentials you entered did not match", "SOURCE": "BLL", "ERR_CD": "INVALID_DATA", "LVL": "ERROR"}"#;
        let msg: ApiMessage = serde_json::from_str(json).expect("message should parse");
        assert_eq!(msg.code.as_deref(), Some("INVALID_DATA"));
        assert_eq!(msg.level.as_deref(), Some("ERROR"));
        assert!(msg.info.starts_with("login:"));
    }

    #[test]
    fn test_truncate_body() {
        let short = "short body";
        assert_eq!(DynError::truncate_body(short), short);

        let long = "x".repeat(800);
        let truncated = DynError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(500)));
        assert!(truncated.ends_with("(truncated, 800 total bytes)"));
    }

    #[test]
    fn test_only_connect_is_retryable() {
        assert!(DynError::Connect("reset".into()).is_retryable());
        assert!(!DynError::Auth(ApiMessages::default()).is_retryable());
        assert!(!DynError::QueryTimeout {
            job: "1".into(),
            elapsed: Duration::from_secs(1)
        }
        .is_retryable());
    }

    #[test]
    fn test_expired_token_needs_reauth() {
        let expired = DynError::Get(ApiMessages(vec![ApiMessage::new(
            "login: Bad or expired credentials",
        )]));
        assert!(expired.needs_reauth());
        assert!(DynError::Auth(ApiMessages::default()).needs_reauth());

        let missing = DynError::Get(ApiMessages(vec![ApiMessage::new("zone: No such zone")]));
        assert!(!missing.needs_reauth());
        assert!(!DynError::Connect("reset".into()).needs_reauth());
    }

    #[test]
    fn test_null_info_reads_as_empty() {
        let json = r#"{"INFO": null, "SOURCE": "BLL", "ERR_CD": null, "LVL": "ERROR"}"#;
        let msg: ApiMessage = serde_json::from_str(json).expect("message should parse");
        assert_eq!(msg.info, "");
    }
}
