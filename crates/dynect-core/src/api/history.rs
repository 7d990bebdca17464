//! Bounded in-memory log of API calls made through a session.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::envelope::Status;
use super::transport::Verb;

/// Replacement text for secret values
const REDACTED: &str = "*****";

/// Default number of entries kept before the oldest are dropped
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Success,
    Failure,
    Incomplete,
    /// The request never produced a readable envelope.
    Error,
}

impl From<Status> for CallOutcome {
    fn from(status: Status) -> Self {
        match status {
            Status::Success => CallOutcome::Success,
            Status::Failure => CallOutcome::Failure,
            Status::Incomplete => CallOutcome::Incomplete,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub path: String,
    pub verb: String,
    pub args: Value,
    pub outcome: CallOutcome,
}

#[derive(Debug, Clone)]
pub struct CallHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl CallHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append a call; arguments are redacted before they are stored.
    pub fn record(&mut self, path: &str, verb: Verb, args: &Value, outcome: CallOutcome) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry {
            timestamp: Utc::now(),
            path: path.to_string(),
            verb: verb.as_str().to_string(),
            args: redact(args),
            outcome,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.contains("password") || key == "token" || key == "auth_token" || key == "apikey"
}

/// Copy of `args` with every password, token or API key value masked.
pub fn redact(args: &Value) -> Value {
    match args {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = if is_secret_key(k) {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact(v)
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}
