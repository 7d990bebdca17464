//! Client SDK for the DynECT Managed DNS REST API.
//!
//! The core is the session engine:
//!
//! - [`Session`]: authenticates one credential set, executes API calls and
//!   polls asynchronous jobs until they complete
//! - [`MmSession`]: the Message Management (email) API, keyed by API key
//! - [`SessionRegistry`]: tracks sessions per class and thread, with one
//!   active session each
//! - [`models`]: zones, records and tasks on top of a session
//!
//! ```no_run
//! use dynect_core::{CredentialSet, Session, SessionConfig, SessionRegistry, Zone};
//!
//! # fn main() -> anyhow::Result<()> {
//! let registry = SessionRegistry::new();
//! let scope = registry.current_thread(Session::CLASS);
//! let creds = CredentialSet::from_env()?;
//! let key = creds.key().clone();
//! let config = SessionConfig::from_env()?;
//!
//! let handle = scope.get_or_create(&key, || Session::open(creds, config))?;
//! let zones = Zone::list(&mut handle.lock())?;
//! println!("{} zones", zones.len());
//! scope.logout(&key)?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod logging;
pub mod models;
pub mod session;

pub use api::{ApiMessage, ApiMessages, CallHistory, CallOutcome, DynError, HistoryEntry, Verb};
pub use auth::{CredentialKey, CredentialSet, CredentialStore};
pub use config::{ProxyConfig, SessionConfig};
pub use models::{MmAccounts, MmSender, Record, RecordData, SerialStyle, Task, Zone};
pub use session::{
    AuthInfo, ClassId, ManagedSession, MmSession, Session, SessionHandle, SessionRegistry, ThreadScope,
};
