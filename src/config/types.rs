use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::storage::{EncryptedCodec, JsonCodec, KeySource, SettingsCodec};

#[cfg(not(test))]
pub const DEFAULT_ORGANIZATION: &str = "sealed";
#[cfg(test)]
pub const DEFAULT_ORGANIZATION: &str = "sealed_testing";

pub const DEFAULT_APPLICATION: &str = "settings";

/// Backing format of the settings file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreFormat {
    Encrypted(KeySource),
    Json,
}

impl StoreFormat {
    pub fn format_name(&self) -> &'static str {
        match self {
            StoreFormat::Encrypted(_) => EncryptedCodec::FORMAT_NAME,
            StoreFormat::Json => "json",
        }
    }

    pub(crate) fn codec(&self) -> Box<dyn SettingsCodec> {
        match self {
            StoreFormat::Encrypted(source) => Box::new(EncryptedCodec::new(source.clone())),
            StoreFormat::Json => Box::new(JsonCodec),
        }
    }
}

/// Where and how the settings file is stored
///
/// The file lives at `<config_dir>/<organization>/<application>.<format>`.
#[derive(Debug, Clone)]
pub struct SettingsConfig {
    pub organization: String,
    pub application: String,
    /// Base directory; `None` means the user's configuration directory
    pub config_dir: Option<PathBuf>,
    pub format: StoreFormat,
}

impl SettingsConfig {
    pub fn builder(application: impl Into<String>) -> SettingsConfigBuilder {
        SettingsConfigBuilder::new(application)
    }

    /// Full path of the settings file
    pub fn settings_path(&self) -> Result<PathBuf> {
        let base = match &self.config_dir {
            Some(dir) => expand_home(dir),
            None => dirs::config_dir().ok_or(Error::ConfigDirUnavailable)?,
        };
        Ok(base.join(&self.organization).join(format!(
            "{}.{}",
            self.application,
            self.format.format_name()
        )))
    }
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self::builder(DEFAULT_APPLICATION).build()
    }
}

fn expand_home(dir: &std::path::Path) -> PathBuf {
    match dir.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| dir.to_path_buf()),
        Err(_) => dir.to_path_buf(),
    }
}

/// Builder for [`SettingsConfig`]
#[derive(Debug, Clone)]
pub struct SettingsConfigBuilder {
    organization: String,
    application: String,
    config_dir: Option<PathBuf>,
    format: Option<StoreFormat>,
}

impl SettingsConfigBuilder {
    pub fn new(application: impl Into<String>) -> Self {
        Self {
            organization: DEFAULT_ORGANIZATION.to_string(),
            application: application.into(),
            config_dir: None,
            format: None,
        }
    }

    pub fn organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = organization.into();
        self
    }

    /// Override the base directory (a leading `~` is expanded)
    pub fn config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    pub fn format(mut self, format: StoreFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Encrypt with a key derived from `passphrase`
    pub fn passphrase(self, passphrase: impl Into<String>) -> Self {
        self.format(StoreFormat::Encrypted(KeySource::Passphrase(
            passphrase.into(),
        )))
    }

    /// Encrypt with a random key kept in the OS keychain
    #[cfg(feature = "keychain")]
    pub fn keychain(self, service: impl Into<String>, account: impl Into<String>) -> Self {
        self.format(StoreFormat::Encrypted(KeySource::Keychain {
            service: service.into(),
            account: account.into(),
        }))
    }

    /// Store plain JSON (no encryption)
    pub fn json(self) -> Self {
        self.format(StoreFormat::Json)
    }

    pub fn build(self) -> SettingsConfig {
        // Without an explicit key the file is only obfuscated at rest.
        let format = self.format.unwrap_or_else(|| {
            StoreFormat::Encrypted(KeySource::Passphrase(format!(
                "{}/{}",
                self.organization, self.application
            )))
        });

        SettingsConfig {
            organization: self.organization,
            application: self.application,
            config_dir: self.config_dir,
            format,
        }
    }
}
