//! Encrypted settings storage
//!
//! - `SettingsCodec` - named format turning a settings image into bytes
//! - `EncryptedCodec` - AES-256-GCM codec (`sset` files)
//! - `JsonCodec` - plain JSON codec
//! - `SettingsStore` - the file plus its in-memory image

mod codec;
pub(crate) mod connector;
mod crypto;
#[cfg(feature = "keychain")]
mod keychain;
mod store;

pub use codec::{JsonCodec, SettingsCodec, SettingsImage};
pub use crypto::{EncryptedCodec, KeySource};
pub use store::{read_image, SettingsStore, StoreStatus};
