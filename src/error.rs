//! Error types for sealed-settings

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading, writing or resolving settings
#[derive(Debug, Error)]
pub enum Error {
    /// Filesystem failure while touching the settings file
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The codec could not produce a byte stream from the image
    #[error("Failed to encode settings: {0}")]
    Encode(String),

    /// The settings file exists but could not be turned back into an image
    #[error("Failed to decode settings file: {0}")]
    Decode(String),

    /// Key derivation, encryption or authentication failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// A setting or group key does not have the `segment/segment` shape
    #[error("Invalid setting key '{0}'")]
    InvalidKey(String),

    /// A group member was requested outside the group's whitelist
    #[error("Key '{key}' is not accepted by setting group '{group}'")]
    AccessDenied { group: String, key: String },

    /// The owning manager has been destroyed
    #[error("Settings manager has been shut down")]
    ManagerGone,

    /// `SettingsManager::initialize` was called while this thread already
    /// owns the singleton
    #[error("Settings manager is already initialized")]
    AlreadyInitialized,

    /// The process-wide singleton is owned by a different thread
    #[error("Settings manager is owned by another thread")]
    OwnedByAnotherThread,

    /// The settings file exists but could not be loaded, so it is not
    /// overwritten
    #[error("Settings file {} could not be loaded; refusing to overwrite it", path.display())]
    StoreUnreadable { path: PathBuf },

    /// No user-scoped configuration directory could be resolved
    #[error("Could not resolve a configuration directory")]
    ConfigDirUnavailable,

    /// OS keychain failure
    #[cfg(feature = "keychain")]
    #[error("Keychain error: {0}")]
    Keychain(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

// Convert to String for callers that surface errors as plain text
impl From<Error> for String {
    fn from(e: Error) -> Self {
        e.to_string()
    }
}
