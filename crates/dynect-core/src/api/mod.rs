//! Wire-level pieces of the DynECT REST API.
//!
//! This module provides the error taxonomy, the response envelope, the
//! call history log and the [`Transport`] seam the session engine sends
//! requests through.

pub mod envelope;
pub mod error;
pub mod history;
pub mod transport;

pub use envelope::{Envelope, Status};
pub use error::{ApiMessage, ApiMessages, DynError};
pub use history::{CallHistory, CallOutcome, HistoryEntry};
pub use transport::{ApiRequest, HttpTransport, RawResponse, Transport, Verb};
