use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{deserialize_string_or_number, from_data};
use crate::api::{DynError, Verb};
use crate::session::Session;

/// A long-running system task, e.g. a zone import or a publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub task_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    pub blocking: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub zone_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    pub created_ts: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    pub modified_ts: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    pub step_count: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    pub total_steps: Option<String>,
    #[serde(default)]
    pub debug: Option<String>,
    #[serde(default)]
    pub args: Vec<TaskArg>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskArg {
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    pub value: Option<String>,
}

fn epoch(ts: Option<&str>) -> Option<DateTime<Utc>> {
    ts.and_then(|s| s.parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

impl Task {
    pub fn list(session: &mut Session) -> Result<Vec<Task>, DynError> {
        let data = session.execute(Verb::Get, "/Task/", &json!({}))?;
        from_data(data, "task list")
    }

    pub fn get(session: &mut Session, task_id: &str) -> Result<Task, DynError> {
        let data = session.execute(Verb::Get, &format!("/Task/{}/", task_id), &json!({}))?;
        from_data(data, "task")
    }

    fn path(&self) -> Result<String, DynError> {
        self.task_id
            .as_deref()
            .map(|id| format!("/Task/{}/", id))
            .ok_or_else(|| DynError::invalid_argument("task_id", "None"))
    }

    /// Reload the task's state.
    pub fn refresh(&mut self, session: &mut Session) -> Result<(), DynError> {
        let data = session.execute(Verb::Get, &self.path()?, &json!({}))?;
        *self = from_data(data, "task")?;
        Ok(())
    }

    /// Ask the API to cancel the task.
    pub fn cancel(&mut self, session: &mut Session) -> Result<(), DynError> {
        let data = session.execute(Verb::Delete, &self.path()?, &json!({}))?;
        if data.is_object() && data.get("task_id").is_some() {
            *self = from_data(data, "task")?;
        }
        Ok(())
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        epoch(self.created_ts.as_deref())
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        epoch(self.modified_ts.as_deref())
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self.blocking.as_deref(), Some("Y") | Some("y") | Some("true") | Some("1"))
    }

    /// Value of the named task argument.
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|a| a.name == name)
            .and_then(|a| a.value.as_deref())
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Task>: {} - {}",
            self.task_id.as_deref().unwrap_or("?"),
            self.status.as_deref().unwrap_or("unknown")
        )
    }
}

impl TryFrom<Value> for Task {
    type Error = DynError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        from_data(value, "task")
    }
}
