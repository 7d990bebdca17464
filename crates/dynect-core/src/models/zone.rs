use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::record::Record;
use super::{deserialize_string_or_number, from_data};
use crate::api::{DynError, Verb};
use crate::session::Session;

/// How the SOA serial advances on publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialStyle {
    #[default]
    Increment,
    Epoch,
    Day,
    Minute,
}

impl SerialStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            SerialStyle::Increment => "increment",
            SerialStyle::Epoch => "epoch",
            SerialStyle::Day => "day",
            SerialStyle::Minute => "minute",
        }
    }
}

impl fmt::Display for SerialStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A primary zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    #[serde(rename = "zone")]
    pub name: String,
    #[serde(default)]
    pub serial: u64,
    #[serde(default)]
    pub serial_style: Option<SerialStyle>,
    #[serde(default)]
    pub zone_type: Option<String>,
    /// Task started by the last change, if the API reported one
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    pub task_id: Option<String>,
}

/// An entry of the zone notes report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneNote {
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    pub serial: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    pub timestamp: Option<String>,
}

impl Zone {
    fn path(name: &str) -> String {
        format!("/Zone/{}/", name)
    }

    /// Every zone visible to the logged-in user.
    pub fn list(session: &mut Session) -> Result<Vec<Zone>, DynError> {
        let data = session.execute(Verb::Get, "/Zone/", &json!({"detail": "Y"}))?;
        from_data(data, "zone list")
    }

    pub fn get(session: &mut Session, name: &str) -> Result<Zone, DynError> {
        let data = session.execute(Verb::Get, &Self::path(name), &json!({}))?;
        from_data(data, "zone")
    }

    /// Create a primary zone. `contact` is the administrative email address.
    pub fn create(
        session: &mut Session,
        name: &str,
        contact: &str,
        ttl: u32,
        serial_style: SerialStyle,
    ) -> Result<Zone, DynError> {
        if name.trim().is_empty() {
            return Err(DynError::invalid_argument("name", "\"\""));
        }
        if contact.trim().is_empty() {
            return Err(DynError::invalid_argument("contact", "\"\""));
        }
        let args = json!({
            "zone": name,
            "rname": contact,
            "ttl": ttl,
            "serial_style": serial_style,
        });
        let data = session.execute(Verb::Post, &Self::path(name), &args)?;
        from_data(data, "zone")
    }

    /// Push pending changes to the nameservers.
    pub fn publish(&mut self, session: &mut Session, notes: Option<&str>) -> Result<(), DynError> {
        let mut args = Map::new();
        args.insert("publish".into(), Value::Bool(true));
        if let Some(notes) = notes.filter(|n| !n.is_empty()) {
            args.insert("notes".into(), Value::String(notes.to_string()));
        }
        self.update(session, Value::Object(args))
    }

    /// Block changes until the zone is thawed.
    pub fn freeze(&mut self, session: &mut Session) -> Result<(), DynError> {
        self.update(session, json!({"freeze": true}))
    }

    pub fn thaw(&mut self, session: &mut Session) -> Result<(), DynError> {
        self.update(session, json!({"thaw": true}))
    }

    fn update(&mut self, session: &mut Session, args: Value) -> Result<(), DynError> {
        let data = session.execute(Verb::Put, &Self::path(&self.name), &args)?;
        *self = from_data(data, "zone")?;
        Ok(())
    }

    pub fn delete(self, session: &mut Session) -> Result<(), DynError> {
        session.execute(Verb::Delete, &Self::path(&self.name), &json!({}))?;
        Ok(())
    }

    /// All records in the zone, grouped by the API's `*_records` keys.
    /// Empty groups are left out.
    pub fn records(&self, session: &mut Session) -> Result<BTreeMap<String, Vec<Record>>, DynError> {
        let path = format!("/AllRecord/{}/", self.name);
        let data = session.execute(Verb::Get, &path, &json!({"detail": "Y"}))?;
        let groups: BTreeMap<String, Vec<Value>> = from_data(data, "record listing")?;

        groups
            .into_iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(group, list)| -> Result<_, DynError> {
                let records = list
                    .into_iter()
                    .map(Record::from_value)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((group, records))
            })
            .collect()
    }

    /// Fully qualified names of every node in the zone.
    pub fn node_list(&self, session: &mut Session) -> Result<Vec<String>, DynError> {
        let path = format!("/NodeList/{}/", self.name);
        let data = session.execute(Verb::Get, &path, &json!({}))?;
        from_data(data, "node list")
    }

    pub fn notes(
        &self,
        session: &mut Session,
        offset: Option<u32>,
        limit: Option<u32>,
    ) -> Result<Vec<ZoneNote>, DynError> {
        let mut args = Map::new();
        args.insert("zone".into(), Value::String(self.name.clone()));
        if let Some(offset) = offset {
            args.insert("offset".into(), offset.into());
        }
        if let Some(limit) = limit {
            args.insert("limit".into(), limit.into());
        }
        let data = session.execute(Verb::Post, "/ZoneNoteReport/", &Value::Object(args))?;
        from_data(data, "zone notes")
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Zone>: {}", self.name)
    }
}

/// Name of the zone that `node` lives in.
pub fn get_apex(session: &mut Session, node: &str) -> Result<String, DynError> {
    let path = format!("/Apex/{}/", node.trim_end_matches('.'));
    let data = session.execute(Verb::Get, &path, &json!({}))?;
    data.get("zone")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DynError::InvalidResponse("Apex response has no zone".into()))
}
