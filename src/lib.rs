//! # sealed-settings
//!
//! Typed, persistent application settings backed by an encrypted file.
//!
//! ## Features
//!
//! - **Registered settings**: one [`Setting`] per key, created on first request
//!   and shared by every caller afterwards
//! - **Setting groups**: namespaced members (`group/sub_key`) limited to a whitelist
//! - **Reset policies**: soft reset honours each setting's `remove_when_reset`,
//!   hard reset wipes the whole store
//! - **Sensitive values**: never appear in log export
//! - **Encrypted store**: AES-256-GCM file, key from a passphrase (Argon2id) or
//!   the OS keychain (`keychain` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sealed_settings::{DefaultValue, SettingPolicy, SettingsConfig, SettingsManager};
//!
//! # fn example() -> sealed_settings::Result<()> {
//! let config = SettingsConfig::builder("my-app")
//!     .organization("acme")
//!     .passphrase("correct horse battery staple")
//!     .build();
//! let manager = SettingsManager::initialize(config)?;
//!
//! let telemetry = manager.create_or_get_setting(
//!     "telemetry.enabled",
//!     DefaultValue::fixed(false),
//!     SettingPolicy::new(),
//! )?;
//! telemetry.set(true)?;
//!
//! let token = manager.create_or_get_setting(
//!     "account.token",
//!     DefaultValue::fixed(""),
//!     SettingPolicy::new().sensitive(),
//! )?;
//! token.set("abc123")?;
//!
//! manager.serialize_logs(|name, text| println!("[{name}]\n{text}"));
//!
//! manager.reset()?;
//! SettingsManager::shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! ## Setting Groups
//!
//! ```rust,no_run
//! use sealed_settings::{SettingPolicy, SettingsManager};
//!
//! # fn example() -> sealed_settings::Result<()> {
//! let manager = SettingsManager::instance()?;
//! let devices = manager.create_setting_group(
//!     "devices",
//!     SettingPolicy::new(),
//!     ["primary", "secondary"],
//! )?;
//!
//! devices.set("primary", "laptop")?;
//! assert!(devices.set("rogue", "x").is_err()); // not whitelisted
//! # Ok(())
//! # }
//! ```
//!
//! ## Keys
//!
//! Setting keys are stricter than a generic key/value store. A key is one or
//! more segments made of ASCII letters, digits, `_`, `.` and `-`, joined by
//! `/` (for example `telemetry.enabled` or `devices/primary`). Spaces,
//! non-ASCII characters and empty segments are rejected with
//! [`Error::InvalidKey`]. `/` is reserved as the group separator.
//!
//! ## Process-wide Singleton
//!
//! [`SettingsManager::initialize`] and [`SettingsManager::instance`] hand out
//! one manager per process. It is owned by the thread that created it; other
//! threads get [`Error::OwnedByAnotherThread`] until the owner calls
//! [`SettingsManager::shutdown`] or exits. A settings file that exists but
//! cannot be loaded (wrong passphrase, corruption) is never overwritten by
//! ordinary writes; they fail with [`Error::StoreUnreadable`] until
//! [`SettingsManager::hard_reset`] replaces it.

// Core modules
mod error;
mod events;
mod group;
mod keys;
mod logs;
mod manager;
mod setting;
pub mod storage;

pub mod config;

pub use config::{SettingsConfig, SettingsConfigBuilder, StoreFormat};
pub use error::{Error, Result};
pub use events::{EventBus, SettingsEvent, SubscriptionId};
pub use group::SettingGroup;
pub use keys::validate_key;
pub use logs::{
    register_log_serializer, registered_log_serializers, serialize_all_logs, LogRegistration,
    LogSerializer, LOG_SOURCE_NAME,
};
pub use manager::SettingsManager;
pub use setting::{DefaultValue, Setting, SettingPolicy};
pub use storage::{EncryptedCodec, JsonCodec, KeySource, SettingsCodec, StoreStatus};
