//! Credentials for authenticating to the DynECT API.
//!
//! This module provides:
//! - `CredentialSet`: customer, username and an in-memory sealed password
//! - `CredentialKey`: the (customer, username) pair identifying a session
//! - `CredentialStore`: OS-level password storage via keyring

pub mod cipher;
pub mod credentials;

pub use cipher::{SealedSecret, SecretCipher};
pub use credentials::{CredentialKey, CredentialSet, CredentialStore};
