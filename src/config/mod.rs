//! Settings manager configuration
//!
//! - `SettingsConfig` - where the settings file lives and how it is encoded
//! - `StoreFormat` - encrypted or plain JSON backing

mod types;

pub use types::*;
