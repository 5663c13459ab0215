//! File key held in the OS keychain

use base64::{engine::general_purpose::STANDARD, Engine as _};
use keyring::{Entry, Error as KeyringError};
use log::{debug, info};

use super::crypto::KEY_LEN;
use crate::error::{Error, Result};

/// Load the settings key, generating and storing a new one if none exists
pub fn load_or_create_key(service: &str, account: &str) -> Result<[u8; KEY_LEN]> {
    let entry = Entry::new(service, account).map_err(|e| Error::Keychain(e.to_string()))?;

    match entry.get_password() {
        Ok(encoded) => {
            debug!("Settings key loaded from keychain");
            decode_key(&encoded)
        }
        Err(KeyringError::NoEntry) => {
            let key: [u8; KEY_LEN] = rand::random();
            entry
                .set_password(&STANDARD.encode(key))
                .map_err(|e| Error::Keychain(e.to_string()))?;
            info!("🔑 Generated new settings key in keychain ({service}/{account})");
            Ok(key)
        }
        Err(e) => Err(Error::Keychain(e.to_string())),
    }
}

fn decode_key(encoded: &str) -> Result<[u8; KEY_LEN]> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::Keychain(format!("Stored key is not base64: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| Error::Keychain("Stored key has the wrong length".to_string()))
}
