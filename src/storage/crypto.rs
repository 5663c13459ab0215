//! AES-256-GCM codec for the settings file
//!
//! File layout:
//!
//! ```text
//! "SSET" | version (1 byte) | salt (16 bytes) | nonce (12 bytes) | ciphertext
//! ```
//!
//! The ciphertext is the JSON store document. The salt only matters for
//! passphrase keys; it is kept stable across rewrites so the Argon2
//! derivation runs once per process.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::Argon2;
use log::debug;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use super::codec::{SettingsCodec, SettingsImage, StoreDocument};
use crate::error::{Error, Result};

const MAGIC: &[u8; 4] = b"SSET";
const FORMAT_VERSION: u8 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const HEADER_LEN: usize = MAGIC.len() + 1 + SALT_LEN + NONCE_LEN;
pub(crate) const KEY_LEN: usize = 32;

/// Where the file key comes from
#[derive(Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Argon2id-derived from a passphrase
    Passphrase(String),
    /// Random key held base64-encoded in the OS keychain, created on first use
    #[cfg(feature = "keychain")]
    Keychain { service: String, account: String },
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::Passphrase(_) => f.write_str("Passphrase(<redacted>)"),
            #[cfg(feature = "keychain")]
            KeySource::Keychain { service, account } => f
                .debug_struct("Keychain")
                .field("service", service)
                .field("account", account)
                .finish(),
        }
    }
}

struct CachedKey {
    salt: [u8; SALT_LEN],
    key: [u8; KEY_LEN],
}

/// Encrypting codec registered under the `sset` format name
pub struct EncryptedCodec {
    source: KeySource,
    cache: Mutex<Option<CachedKey>>,
}

impl EncryptedCodec {
    pub const FORMAT_NAME: &'static str = "sset";

    pub fn new(source: KeySource) -> Self {
        Self {
            source,
            cache: Mutex::new(None),
        }
    }

    pub fn with_passphrase(passphrase: impl Into<String>) -> Self {
        Self::new(KeySource::Passphrase(passphrase.into()))
    }

    fn key_for_salt(&self, salt: &[u8; SALT_LEN]) -> Result<[u8; KEY_LEN]> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache.as_ref() {
            if &cached.salt == salt {
                return Ok(cached.key);
            }
        }

        let key = self.derive_key(salt)?;
        *cache = Some(CachedKey { salt: *salt, key });
        Ok(key)
    }

    fn current_salt(&self) -> [u8; SALT_LEN] {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.as_ref().map_or_else(rand::random, |cached| cached.salt)
    }

    fn derive_key(&self, salt: &[u8; SALT_LEN]) -> Result<[u8; KEY_LEN]> {
        match &self.source {
            KeySource::Passphrase(passphrase) => {
                debug!("Deriving settings key from passphrase");
                let mut key = [0u8; KEY_LEN];
                Argon2::default()
                    .hash_password_into(passphrase.as_bytes(), salt, &mut key)
                    .map_err(|e| Error::Crypto(format!("Key derivation failed: {e}")))?;
                Ok(key)
            }
            #[cfg(feature = "keychain")]
            KeySource::Keychain { service, account } => {
                super::keychain::load_or_create_key(service, account)
            }
        }
    }

    fn cipher(key: &[u8; KEY_LEN]) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(key).map_err(|e| Error::Crypto(e.to_string()))
    }
}

impl fmt::Debug for EncryptedCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedCodec")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl SettingsCodec for EncryptedCodec {
    fn format_name(&self) -> &str {
        Self::FORMAT_NAME
    }

    fn encode(&self, image: &SettingsImage) -> Result<Vec<u8>> {
        let salt = self.current_salt();
        let key = self.key_for_salt(&salt)?;
        let nonce: [u8; NONCE_LEN] = rand::random();
        let plaintext = StoreDocument::to_vec(image, false)?;

        let ciphertext = Self::cipher(&key)?
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_ref())
            .map_err(|_| Error::Crypto("Encryption failed".to_string()))?;

        let mut out = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        out.extend_from_slice(MAGIC);
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&salt);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decode(&self, bytes: &[u8]) -> Result<SettingsImage> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::Decode("File is shorter than the header".to_string()));
        }
        let (magic, rest) = bytes.split_at(MAGIC.len());
        if magic != MAGIC {
            return Err(Error::Decode("Not an encrypted settings file".to_string()));
        }
        let (version, rest) = rest.split_at(1);
        if version[0] != FORMAT_VERSION {
            return Err(Error::Decode(format!(
                "Unsupported file version {}",
                version[0]
            )));
        }
        let (salt, rest) = rest.split_at(SALT_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

        let mut salt_arr = [0u8; SALT_LEN];
        salt_arr.copy_from_slice(salt);
        let key = self.key_for_salt(&salt_arr)?;

        let plaintext = Self::cipher(&key)?
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| {
                Error::Crypto("Authentication failed (wrong key or tampered file)".to_string())
            })?;

        StoreDocument::from_slice(&plaintext)
    }
}
