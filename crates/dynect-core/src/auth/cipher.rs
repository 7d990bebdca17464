//! In-memory sealing of the account password.
//!
//! The password is only needed when a session (re)authenticates, so it is
//! kept as ChaCha20-Poly1305 ciphertext the rest of the time. The key lives
//! alongside it in process memory; sealing keeps the plaintext out of
//! `Debug` output, logs, history and casual heap dumps, nothing more.

use std::fmt;

use argon2::Argon2;
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;

use crate::api::DynError;

/// Salt length for passphrase key derivation
const SALT_LEN: usize = 16;

/// ChaCha20-Poly1305 key length in bytes
pub const KEY_LEN: usize = 32;

/// Ciphertext plus the nonce it was sealed with.
#[derive(Clone, PartialEq, Eq)]
pub struct SealedSecret {
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
}

impl fmt::Debug for SealedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SealedSecret({} bytes)", self.ciphertext.len())
    }
}

#[derive(Clone)]
pub struct SecretCipher {
    cipher: ChaCha20Poly1305,
}

impl fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretCipher(..)")
    }
}

impl SecretCipher {
    /// Cipher with a freshly generated random key.
    pub fn random() -> Self {
        let key = ChaCha20Poly1305::generate_key(&mut OsRng);
        Self {
            cipher: ChaCha20Poly1305::new(&key),
        }
    }

    /// Cipher with a caller-supplied 256-bit key.
    pub fn from_key(key: &[u8; KEY_LEN]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }

    /// Derive the key from a passphrase with Argon2id and a random salt.
    pub fn from_passphrase(passphrase: &str) -> Result<Self, DynError> {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);

        let mut key = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(passphrase.as_bytes(), &salt, &mut key)
            .map_err(|e| DynError::Cipher(format!("key derivation failed: {}", e)))?;
        Ok(Self::from_key(&key))
    }

    pub fn seal(&self, plaintext: &str) -> Result<SealedSecret, DynError> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| DynError::Cipher(format!("encrypt: {}", e)))?;
        Ok(SealedSecret {
            nonce: nonce.to_vec(),
            ciphertext,
        })
    }

    pub fn open(&self, sealed: &SealedSecret) -> Result<String, DynError> {
        let nonce = Nonce::from_slice(&sealed.nonce);
        let plaintext = self
            .cipher
            .decrypt(nonce, sealed.ciphertext.as_ref())
            .map_err(|e| DynError::Cipher(format!("decrypt: {}", e)))?;
        String::from_utf8(plaintext)
            .map_err(|_| DynError::Cipher("decrypted secret is not UTF-8".into()))
    }
}
