//! Typed DNS resource records.
//!
//! A record lives at `/{Type}Record/{zone}/{fqdn}/{record_id}/`. Only the
//! common types get a typed [`RecordData`] variant; anything else is kept
//! as raw `rdata` under [`RecordData::Unknown`] and still round-trips
//! through create, update and delete.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};

use super::{deserialize_string_or_number, from_data};
use crate::api::{DynError, Verb};
use crate::session::Session;

/// Serializes as `{"record_type": .., "rdata": ..}`, the same shape it is
/// read from.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "record_type", content = "rdata")]
pub enum RecordData {
    #[serde(rename = "A")]
    A { address: Ipv4Addr },
    #[serde(rename = "AAAA")]
    Aaaa { address: Ipv6Addr },
    #[serde(rename = "CNAME")]
    Cname { cname: String },
    #[serde(rename = "MX")]
    Mx { exchange: String, preference: u16 },
    #[serde(rename = "NS")]
    Ns { nsdname: String },
    #[serde(rename = "PTR")]
    Ptr { ptrdname: String },
    #[serde(rename = "SRV")]
    Srv {
        port: u16,
        priority: u16,
        target: String,
        weight: u16,
    },
    #[serde(rename = "TXT")]
    Txt { txtdata: String },
    #[serde(skip_deserializing)]
    Unknown { record_type: String, rdata: Value },
}

const KNOWN_TYPES: [&str; 8] = ["A", "AAAA", "CNAME", "MX", "NS", "PTR", "SRV", "TXT"];

impl RecordData {
    /// Upper-case type name, e.g. `"MX"`.
    pub fn record_type(&self) -> String {
        match self {
            RecordData::A { .. } => "A".into(),
            RecordData::Aaaa { .. } => "AAAA".into(),
            RecordData::Cname { .. } => "CNAME".into(),
            RecordData::Mx { .. } => "MX".into(),
            RecordData::Ns { .. } => "NS".into(),
            RecordData::Ptr { .. } => "PTR".into(),
            RecordData::Srv { .. } => "SRV".into(),
            RecordData::Txt { .. } => "TXT".into(),
            RecordData::Unknown { record_type, .. } => record_type.to_ascii_uppercase(),
        }
    }

    /// Build from a type name and the API's `rdata` object.
    pub fn from_rdata(record_type: &str, rdata: Value) -> Result<Self, DynError> {
        let record_type = record_type.to_ascii_uppercase();
        if !KNOWN_TYPES.contains(&record_type.as_str()) {
            return Ok(RecordData::Unknown { record_type, rdata });
        }
        from_data(
            json!({"record_type": record_type, "rdata": rdata}),
            "record data",
        )
    }

    /// The `rdata` object sent to the API.
    pub fn to_rdata(&self) -> Value {
        match self {
            RecordData::A { address } => json!({"address": address.to_string()}),
            RecordData::Aaaa { address } => json!({"address": address.to_string()}),
            RecordData::Cname { cname } => json!({"cname": cname}),
            RecordData::Mx { exchange, preference } => {
                json!({"exchange": exchange, "preference": preference})
            }
            RecordData::Ns { nsdname } => json!({"nsdname": nsdname}),
            RecordData::Ptr { ptrdname } => json!({"ptrdname": ptrdname}),
            RecordData::Srv { port, priority, target, weight } => json!({
                "port": port,
                "priority": priority,
                "target": target,
                "weight": weight,
            }),
            RecordData::Txt { txtdata } => json!({"txtdata": txtdata}),
            RecordData::Unknown { rdata, .. } => rdata.clone(),
        }
    }

    /// Host names in rdata with the trailing dot the API expects.
    fn qualified(self) -> Self {
        match self {
            RecordData::Cname { cname } => RecordData::Cname { cname: qualify(&cname) },
            RecordData::Mx { exchange, preference } => RecordData::Mx {
                exchange: qualify(&exchange),
                preference,
            },
            RecordData::Ns { nsdname } => RecordData::Ns { nsdname: qualify(&nsdname) },
            RecordData::Ptr { ptrdname } => RecordData::Ptr { ptrdname: qualify(&ptrdname) },
            RecordData::Srv { port, priority, target, weight } => RecordData::Srv {
                port,
                priority,
                target: qualify(&target),
                weight,
            },
            other => other,
        }
    }

    fn resource(&self) -> String {
        format!("{}Record", self.record_type())
    }
}

impl Serialize for RecordData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("record_type", &self.record_type())?;
        map.serialize_entry("rdata", &self.to_rdata())?;
        map.end()
    }
}

/// `name` with exactly one trailing dot.
pub fn qualify(name: &str) -> String {
    format!("{}.", name.trim_end_matches('.'))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub zone: String,
    pub fqdn: String,
    pub record_id: Option<String>,
    /// 0 means the zone default
    pub ttl: u32,
    pub data: RecordData,
}

#[derive(Deserialize)]
struct RawRecord {
    zone: String,
    fqdn: String,
    record_type: String,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    record_id: Option<String>,
    #[serde(default)]
    ttl: u32,
    #[serde(default)]
    rdata: Value,
}

fn node_path(resource: &str, zone: &str, fqdn: &str) -> String {
    format!("/{}/{}/{}/", resource, zone, fqdn.trim_end_matches('.'))
}

impl Record {
    pub(crate) fn from_value(value: Value) -> Result<Record, DynError> {
        let raw: RawRecord = from_data(value, "record")?;
        Ok(Record {
            data: RecordData::from_rdata(&raw.record_type, raw.rdata)?,
            zone: raw.zone,
            fqdn: raw.fqdn,
            record_id: raw.record_id,
            ttl: raw.ttl,
        })
    }

    fn path(&self) -> Result<String, DynError> {
        let id = self
            .record_id
            .as_deref()
            .ok_or_else(|| DynError::invalid_argument("record_id", "None"))?;
        Ok(format!("{}{}/", node_path(&self.data.resource(), &self.zone, &self.fqdn), id))
    }

    /// Add a record at `fqdn`. Takes effect on the next zone publish.
    pub fn create(
        session: &mut Session,
        zone: &str,
        fqdn: &str,
        ttl: u32,
        data: RecordData,
    ) -> Result<Record, DynError> {
        let data = data.qualified();
        let args = json!({"rdata": data.to_rdata(), "ttl": ttl});
        let path = node_path(&data.resource(), zone, fqdn);
        let response = session.execute(Verb::Post, &path, &args)?;
        Record::from_value(response)
    }

    pub fn get(
        session: &mut Session,
        zone: &str,
        fqdn: &str,
        record_type: &str,
        record_id: &str,
    ) -> Result<Record, DynError> {
        let resource = format!("{}Record", record_type.to_ascii_uppercase());
        let path = format!("{}{}/", node_path(&resource, zone, fqdn), record_id);
        let response = session.execute(Verb::Get, &path, &json!({}))?;
        Record::from_value(response)
    }

    /// Every record of `record_type` at `fqdn`.
    pub fn list_by_type(
        session: &mut Session,
        zone: &str,
        fqdn: &str,
        record_type: &str,
    ) -> Result<Vec<Record>, DynError> {
        let resource = format!("{}Record", record_type.to_ascii_uppercase());
        let path = node_path(&resource, zone, fqdn);
        let response = session.execute(Verb::Get, &path, &json!({"detail": "Y"}))?;
        let list: Vec<Value> = from_data(response, "record list")?;
        list.into_iter().map(Record::from_value).collect()
    }

    pub fn update_ttl(&mut self, session: &mut Session, ttl: u32) -> Result<(), DynError> {
        let args = json!({"rdata": self.data.to_rdata(), "ttl": ttl});
        self.update(session, args)
    }

    /// Replace the rdata. The record type cannot change.
    pub fn update_rdata(&mut self, session: &mut Session, data: RecordData) -> Result<(), DynError> {
        if data.record_type() != self.data.record_type() {
            return Err(DynError::invalid_argument("record_type", data.record_type()));
        }
        let args = json!({"rdata": data.qualified().to_rdata(), "ttl": self.ttl});
        self.update(session, args)
    }

    fn update(&mut self, session: &mut Session, args: Value) -> Result<(), DynError> {
        let path = self.path()?;
        let response = session.execute(Verb::Put, &path, &args)?;
        *self = Record::from_value(response)?;
        Ok(())
    }

    /// Delete this record. Without a record id every record of this type at
    /// the node is deleted.
    pub fn delete(self, session: &mut Session) -> Result<(), DynError> {
        let path = match self.record_id {
            Some(_) => self.path()?,
            None => node_path(&self.data.resource(), &self.zone, &self.fqdn),
        };
        session.execute(Verb::Delete, &path, &json!({}))?;
        Ok(())
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}Record>: {}", self.data.record_type(), self.fqdn)
    }
}
