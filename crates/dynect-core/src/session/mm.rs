//! Session against the Message Management (email) API.
//!
//! The email API has no login handshake: an API key travels with every
//! request. Arguments are form encoded, in the query string for `GET` and
//! in the body for `POST`, and replies are wrapped as
//! `{"response": {"status", "message", "data"}}` with numeric statuses.

use std::fmt;
use std::sync::Arc;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::registry::{ClassId, ManagedSession};
use crate::api::{
    history::{redact, CallHistory, CallOutcome},
    ApiRequest, DynError, HttpTransport, RawResponse, Transport, Verb,
};
use crate::auth::{CredentialKey, SealedSecret, SecretCipher};
use crate::config::SessionConfig;

const URI_ROOT: &str = "/rest/json";

const CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

const APIKEY_ARG: &str = "apikey";

/// Unreserved characters stay as they are, everything else is escaped.
const FORM_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Deserialize)]
struct MmEnvelope {
    response: MmResponse,
}

#[derive(Debug, Deserialize)]
struct MmResponse {
    status: u16,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Value,
}

pub struct MmSession {
    key: CredentialKey,
    cipher: SecretCipher,
    apikey: SealedSecret,
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    history: Option<CallHistory>,
}

impl fmt::Debug for MmSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MmSession")
            .field("key", &self.key)
            .field("host", &self.config.host)
            .field("apikey", &"*****")
            .finish()
    }
}

impl ManagedSession for MmSession {
    fn key(&self) -> &CredentialKey {
        &self.key
    }

    /// The email API keeps no server-side session.
    fn logout(&mut self) -> Result<(), DynError> {
        Ok(())
    }
}

impl MmSession {
    /// Registry class for Message Management sessions.
    pub const CLASS: ClassId = ClassId::new("dynect.mm");

    /// Session for `apikey`, registered under `key`, with an HTTP
    /// transport built from `config`.
    pub fn new(key: CredentialKey, apikey: &str, config: SessionConfig) -> Result<Self, DynError> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Self::with_transport(key, apikey, config, transport)
    }

    pub fn with_transport(
        key: CredentialKey,
        apikey: &str,
        config: SessionConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, DynError> {
        if apikey.is_empty() {
            return Err(DynError::invalid_argument(APIKEY_ARG, "empty"));
        }
        let cipher = SecretCipher::random();
        let apikey = cipher.seal(apikey)?;
        let history = config
            .history
            .then(|| CallHistory::new(config.history_capacity));
        Ok(Self {
            key,
            cipher,
            apikey,
            config,
            transport,
            history,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn history(&self) -> Option<&CallHistory> {
        self.history.as_ref()
    }

    /// Run one email API call and return the response `data`.
    ///
    /// Only `GET` and `POST` exist on this API. `args` must be a JSON object
    /// or null; the session's API key is added unless `args` carries one.
    pub fn execute(&mut self, verb: Verb, path: &str, args: &Value) -> Result<Value, DynError> {
        let path = normalize_path(path);
        let request = self.build_request(verb, &path, args)?;
        debug!(verb = %verb, path = %path, args = %redact(args), "Email API request");

        let outcome = self
            .transport
            .send(&request)
            .and_then(|raw| settle(&raw));

        if let Some(ref mut history) = self.history {
            let recorded = match &outcome {
                Ok(_) => CallOutcome::Success,
                Err(DynError::InvalidResponse(_)) | Err(DynError::Connect(_)) => CallOutcome::Error,
                Err(_) => CallOutcome::Failure,
            };
            history.record(&path, verb, args, recorded);
        }

        outcome
    }

    fn build_request(&self, verb: Verb, path: &str, args: &Value) -> Result<ApiRequest, DynError> {
        if !matches!(verb, Verb::Get | Verb::Post) {
            return Err(DynError::invalid_argument("verb", verb));
        }

        let mut pairs = form_pairs(args)?;
        if !pairs.iter().any(|(name, _)| name == APIKEY_ARG) {
            pairs.push((APIKEY_ARG.to_string(), self.cipher.open(&self.apikey)?));
        }
        let encoded = encode_form(&pairs);

        let mut headers = vec![(
            "User-Agent",
            format!("dynect-rs/{}", env!("CARGO_PKG_VERSION")),
        )];
        let (path, body) = match verb {
            Verb::Get => (format!("{}?{}", path, encoded), String::new()),
            _ => {
                headers.push(("Content-Type", CONTENT_TYPE.to_string()));
                (path.to_string(), encoded)
            }
        };

        Ok(ApiRequest {
            verb,
            path,
            headers,
            body,
        })
    }
}

fn settle(raw: &RawResponse) -> Result<Value, DynError> {
    let envelope: MmEnvelope = serde_json::from_str(&raw.body)
        .map_err(|e| DynError::from_body(raw.status, &raw.body, &e.to_string()))?;
    let response = envelope.response;
    let reason = response.message.unwrap_or_default();

    match response.status {
        200 => Ok(response.data),
        451 => Err(DynError::ApiKey(reason)),
        452 => Err(DynError::InvalidRequest(reason)),
        453 => Err(DynError::Object(reason)),
        other => Err(DynError::InvalidResponse(format!(
            "unexpected email API status {}: {}",
            other, reason
        ))),
    }
}

fn normalize_path(path: &str) -> String {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    if path.starts_with(URI_ROOT) {
        path
    } else {
        format!("{}{}", URI_ROOT, path)
    }
}

/// Flatten a JSON object into form fields. Nulls are dropped, arrays repeat
/// the field name and nested objects are sent as JSON text.
fn form_pairs(args: &Value) -> Result<Vec<(String, String)>, DynError> {
    let empty = Map::new();
    let map = match args {
        Value::Null => &empty,
        Value::Object(map) => map,
        other => return Err(DynError::invalid_argument("args", other)),
    };

    let mut pairs = Vec::with_capacity(map.len() + 1);
    for (name, value) in map {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    pairs.push((name.clone(), form_value(item)));
                }
            }
            _ => pairs.push((name.clone(), form_value(value))),
        }
    }
    Ok(pairs)
}

fn form_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        other => other.to_string(),
    }
}

fn encode_form(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(name, value)| {
            format!(
                "{}={}",
                utf8_percent_encode(name, FORM_SET),
                utf8_percent_encode(value, FORM_SET)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}
