//! Resource bindings on top of the session engine.
//!
//! Each call takes an explicit session and maps to one or two REST
//! calls:
//!
//! - `Zone`: primary zones, publishing, freeze/thaw, node and record listings
//! - `Record`, `RecordData`: typed resource records
//! - `Task`: long-running system tasks
//! - `MmAccounts`, `MmSender`: email accounts and approved senders, on an
//!   `MmSession`

pub mod mm;
pub mod record;
pub mod task;
pub mod zone;

pub use mm::{MmAccount, MmAccounts, MmSender};
pub use record::{Record, RecordData};
pub use task::{Task, TaskArg};
pub use zone::{get_apex, SerialStyle, Zone, ZoneNote};

/// Ids come back as numbers from some endpoints and strings from others.
pub(crate) fn deserialize_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct StringOrNumberVisitor;

    impl<'de> de::Visitor<'de> for StringOrNumberVisitor {
        type Value = Option<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or number")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
            if v.is_empty() {
                Ok(None)
            } else {
                Ok(Some(v.to_string()))
            }
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
    }

    deserializer.deserialize_any(StringOrNumberVisitor)
}

/// Decode `data` into `T`, reporting failures as `InvalidResponse`.
pub(crate) fn from_data<T: serde::de::DeserializeOwned>(
    data: serde_json::Value,
    what: &str,
) -> Result<T, crate::api::DynError> {
    serde_json::from_value(data)
        .map_err(|e| crate::api::DynError::InvalidResponse(format!("Unreadable {}: {}", what, e)))
}
