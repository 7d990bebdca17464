use std::fmt;

use anyhow::{Context, Result};
use keyring::Entry;
use serde::{Deserialize, Serialize};

use super::cipher::{SealedSecret, SecretCipher};
use crate::api::DynError;

const SERVICE_NAME: &str = "dynect-rs";

/// Identifies one session within a thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CredentialKey {
    pub customer: String,
    pub username: String,
}

impl CredentialKey {
    pub fn new(customer: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            customer: customer.into(),
            username: username.into(),
        }
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.customer, self.username)
    }
}

/// Customer, username and sealed password for one account.
#[derive(Clone)]
pub struct CredentialSet {
    key: CredentialKey,
    password: SealedSecret,
    cipher: SecretCipher,
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("customer", &self.key.customer)
            .field("username", &self.key.username)
            .field("password", &"*****")
            .finish()
    }
}

impl CredentialSet {
    /// Seal `password` under a random per-set key.
    pub fn new(
        customer: impl Into<String>,
        username: impl Into<String>,
        password: &str,
    ) -> Result<Self, DynError> {
        Self::with_cipher(customer, username, password, SecretCipher::random())
    }

    /// Seal `password` under a key derived from `passphrase`.
    pub fn with_passphrase(
        customer: impl Into<String>,
        username: impl Into<String>,
        password: &str,
        passphrase: &str,
    ) -> Result<Self, DynError> {
        Self::with_cipher(customer, username, password, SecretCipher::from_passphrase(passphrase)?)
    }

    pub fn with_cipher(
        customer: impl Into<String>,
        username: impl Into<String>,
        password: &str,
        cipher: SecretCipher,
    ) -> Result<Self, DynError> {
        let key = CredentialKey::new(customer, username);
        if key.customer.is_empty() {
            return Err(DynError::invalid_argument("customer", "\"\""));
        }
        if key.username.is_empty() {
            return Err(DynError::invalid_argument("username", "\"\""));
        }
        let password = cipher.seal(password)?;
        Ok(Self {
            key,
            password,
            cipher,
        })
    }

    /// Read `DYN_CUSTOMER`, `DYN_USERNAME` and `DYN_PASSWORD`.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let var = |name: &str| {
            std::env::var(name).with_context(|| format!("{} is not set", name))
        };
        let set = Self::new(var("DYN_CUSTOMER")?, var("DYN_USERNAME")?, &var("DYN_PASSWORD")?)?;
        Ok(set)
    }

    /// Build a set from a password previously saved with [`CredentialStore::store`].
    pub fn from_keychain(customer: &str, username: &str) -> Result<Self> {
        let key = CredentialKey::new(customer, username);
        let password = CredentialStore::get_password(&key)?;
        Ok(Self::new(customer, username, &password)?)
    }

    pub fn key(&self) -> &CredentialKey {
        &self.key
    }

    pub fn customer(&self) -> &str {
        &self.key.customer
    }

    pub fn username(&self) -> &str {
        &self.key.username
    }

    pub(crate) fn password(&self) -> Result<String, DynError> {
        self.cipher.open(&self.password)
    }

    pub(crate) fn replace_password(&mut self, password: &str) -> Result<(), DynError> {
        self.password = self.cipher.seal(password)?;
        Ok(())
    }
}

/// Passwords kept in the OS keychain, one entry per customer/username.
pub struct CredentialStore;

impl CredentialStore {
    /// Store a password in the OS keychain
    pub fn store(key: &CredentialKey, password: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, &key.to_string())
            .context("Failed to create keyring entry")?;
        entry
            .set_password(password)
            .context("Failed to store password in keychain")?;
        Ok(())
    }

    /// Retrieve the password for an account from the OS keychain
    pub fn get_password(key: &CredentialKey) -> Result<String> {
        let entry = Entry::new(SERVICE_NAME, &key.to_string())
            .context("Failed to create keyring entry")?;
        entry
            .get_password()
            .with_context(|| format!("Failed to retrieve password for {} from keychain", key))
    }

    pub fn delete(key: &CredentialKey) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, &key.to_string())
            .context("Failed to create keyring entry")?;
        entry
            .delete_credential()
            .context("Failed to delete credential from keychain")?;
        Ok(())
    }

    pub fn has_credentials(key: &CredentialKey) -> bool {
        if let Ok(entry) = Entry::new(SERVICE_NAME, &key.to_string()) {
            entry.get_password().is_ok()
        } else {
            false
        }
    }
}
