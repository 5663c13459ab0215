//! File-backed settings store
//!
//! Holds the decoded image in memory and writes every mutation straight
//! back to disk through the codec. Writes go to a temp file in the same
//! directory and are renamed over the settings file.
//!
//! A file that exists but cannot be loaded is never overwritten by a
//! regular write. Only [`SettingsStore::clear`] may replace it.

use log::{debug, info, warn};
use serde_json::Value;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::codec::{SettingsCodec, SettingsImage};
use crate::error::{Error, Result};

/// Health of the backing file, in the spirit of `QSettings::status`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    NoError,
    /// The file could not be read or the last write failed
    AccessError,
    /// The file exists but the codec rejected it
    FormatError,
}

/// Read and decode `path`
///
/// Returns `Ok(None)` when the file does not exist, so "absent" stays
/// distinguishable from "undecodable".
pub fn read_image(path: &Path, codec: &dyn SettingsCodec) -> Result<Option<SettingsImage>> {
    match fs::read(path) {
        Ok(bytes) => codec.decode(&bytes).map(Some),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(path, e)),
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| Error::io(parent, e))?;
    tmp.write_all(bytes).map_err(|e| Error::io(path, e))?;
    tmp.as_file().sync_all().map_err(|e| Error::io(path, e))?;
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}

pub struct SettingsStore {
    path: PathBuf,
    codec: Box<dyn SettingsCodec>,
    image: SettingsImage,
    status: StoreStatus,
    /// The file on disk was not loaded into `image`
    unreadable: bool,
}

impl SettingsStore {
    /// Open the store at `path`
    ///
    /// Never fails: unreadable or undecodable files start from an empty
    /// image and are reported through [`SettingsStore::status`]. Such a
    /// store refuses writes with [`Error::StoreUnreadable`] until
    /// [`SettingsStore::clear`] replaces the file.
    pub fn open(path: impl Into<PathBuf>, codec: Box<dyn SettingsCodec>) -> Self {
        let path = path.into();
        let (image, status) = match read_image(&path, codec.as_ref()) {
            Ok(Some(image)) => {
                info!(
                    "📂 Loaded {} settings from {}",
                    image.len(),
                    path.display()
                );
                (image, StoreStatus::NoError)
            }
            Ok(None) => {
                debug!("Settings file {} not found. Using defaults.", path.display());
                (SettingsImage::new(), StoreStatus::NoError)
            }
            Err(e @ Error::Io { .. }) => {
                warn!("⚠️ Cannot read settings file: {e}. Using defaults.");
                (SettingsImage::new(), StoreStatus::AccessError)
            }
            Err(e) => {
                warn!(
                    "⚠️ Settings file {} is unreadable ({e}). Using defaults.",
                    path.display()
                );
                (SettingsImage::new(), StoreStatus::FormatError)
            }
        };

        let unreadable = status != StoreStatus::NoError;
        Self {
            path,
            codec,
            image,
            status,
            unreadable,
        }
    }

    pub fn file_name(&self) -> &Path {
        &self.path
    }

    pub fn format_name(&self) -> &str {
        self.codec.format_name()
    }

    pub fn status(&self) -> StoreStatus {
        self.status
    }

    /// Whether the file on disk exists but could not be loaded
    pub fn is_unreadable(&self) -> bool {
        self.unreadable
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.image.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.image.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.image.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.image.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }

    /// Store `value` under `key` and write the file
    ///
    /// The in-memory image keeps the new value even if the write fails.
    /// An unreadable store rejects the call before touching the image.
    pub fn set_value(&mut self, key: &str, value: Value) -> Result<()> {
        self.ensure_writable()?;
        if self.image.get(key) == Some(&value) {
            return Ok(());
        }
        self.image.insert(key.to_string(), value);
        self.sync()
    }

    /// Returns whether the key was present
    pub fn remove(&mut self, key: &str) -> Result<bool> {
        if !self.image.contains_key(key) {
            return Ok(false);
        }
        self.ensure_writable()?;
        self.image.remove(key);
        self.sync()?;
        Ok(true)
    }

    /// Remove every key starting with `prefix`, returning how many went
    pub fn remove_group(&mut self, prefix: &str) -> Result<usize> {
        let matching = self.image.keys().filter(|key| key.starts_with(prefix)).count();
        if matching == 0 {
            return Ok(0);
        }
        self.ensure_writable()?;
        self.image.retain(|key, _| !key.starts_with(prefix));
        self.sync()?;
        Ok(matching)
    }

    /// Drop every value and write an empty file
    ///
    /// This is the only write allowed over an unreadable file.
    pub fn clear(&mut self) -> Result<()> {
        self.image.clear();
        self.write_out()?;
        if self.unreadable {
            info!("Replaced unreadable settings file {}", self.path.display());
            self.unreadable = false;
        }
        Ok(())
    }

    /// Encode the current image and write it out
    pub fn sync(&mut self) -> Result<()> {
        self.ensure_writable()?;
        self.write_out()
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.unreadable {
            warn!(
                "⚠️ Refusing to overwrite unreadable settings file {}",
                self.path.display()
            );
            return Err(Error::StoreUnreadable {
                path: self.path.clone(),
            });
        }
        Ok(())
    }

    fn write_out(&mut self) -> Result<()> {
        let result = self
            .codec
            .encode(&self.image)
            .and_then(|bytes| write_atomic(&self.path, &bytes));

        match &result {
            Ok(()) => self.status = StoreStatus::NoError,
            Err(e) => {
                warn!("❌ Failed to write settings file: {e}");
                self.status = StoreStatus::AccessError;
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::codec::JsonCodec;
    use crate::storage::crypto::EncryptedCodec;
    use serde_json::json;
    use tempfile::TempDir;

    fn encrypted() -> Box<dyn SettingsCodec> {
        Box::new(EncryptedCodec::with_passphrase("test-pass"))
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.sset");

        assert!(read_image(&path, &JsonCodec).unwrap().is_none());

        let store = SettingsStore::open(&path, encrypted());
        assert!(store.is_empty());
        assert_eq!(store.status(), StoreStatus::NoError);
        assert!(!path.exists());
    }

    #[test]
    fn test_write_then_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("app.sset");

        let mut store = SettingsStore::open(&path, encrypted());
        store.set_value("telemetry.enabled", json!(true)).unwrap();
        store.set_value("devices/main", json!("laptop")).unwrap();
        assert!(path.exists());

        let reopened = SettingsStore::open(&path, encrypted());
        assert_eq!(reopened.value("telemetry.enabled"), Some(&json!(true)));
        assert_eq!(reopened.value("devices/main"), Some(&json!("laptop")));
        assert_eq!(reopened.format_name(), "sset");
    }

    #[test]
    fn test_corrupt_file_is_format_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.sset");
        fs::write(&path, b"garbage that is not a settings file").unwrap();

        assert!(read_image(&path, &EncryptedCodec::with_passphrase("x")).is_err());

        let store = SettingsStore::open(&path, encrypted());
        assert!(store.is_empty());
        assert_eq!(store.status(), StoreStatus::FormatError);
        assert!(store.is_unreadable());
    }

    #[test]
    fn test_unreadable_file_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.sset");
        let mut original = SettingsStore::open(&path, encrypted());
        original.set_value("account.token", json!("abc123")).unwrap();
        let bytes_before = fs::read(&path).unwrap();

        let mut wrong_key = SettingsStore::open(&path, Box::new(EncryptedCodec::with_passphrase("wrong")));
        assert_eq!(wrong_key.status(), StoreStatus::FormatError);
        assert!(matches!(
            wrong_key.set_value("ui.theme", json!("light")),
            Err(Error::StoreUnreadable { .. })
        ));
        assert!(!wrong_key.remove("account.token").unwrap());
        assert_eq!(wrong_key.remove_group("account.").unwrap(), 0);
        assert!(matches!(wrong_key.sync(), Err(Error::StoreUnreadable { .. })));
        assert_eq!(wrong_key.value("ui.theme"), None);
        assert_eq!(fs::read(&path).unwrap(), bytes_before);

        let reopened = SettingsStore::open(&path, encrypted());
        assert_eq!(reopened.status(), StoreStatus::NoError);
        assert_eq!(reopened.value("account.token"), Some(&json!("abc123")));
    }

    #[test]
    fn test_clear_replaces_unreadable_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.sset");
        fs::write(&path, b"garbage that is not a settings file").unwrap();

        let mut store = SettingsStore::open(&path, encrypted());
        store.clear().unwrap();
        assert!(!store.is_unreadable());
        assert_eq!(store.status(), StoreStatus::NoError);

        store.set_value("a", json!(1)).unwrap();
        let reopened = SettingsStore::open(&path, encrypted());
        assert_eq!(reopened.value("a"), Some(&json!(1)));
    }

    #[test]
    fn test_remove_and_remove_group() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.json");
        let mut store = SettingsStore::open(&path, Box::new(JsonCodec));

        store.set_value("devices/a", json!(1)).unwrap();
        store.set_value("devices/b", json!(2)).unwrap();
        store.set_value("devicesX", json!(3)).unwrap();

        assert!(store.remove("devices/a").unwrap());
        assert!(!store.remove("devices/a").unwrap());
        assert_eq!(store.remove_group("devices/").unwrap(), 1);
        assert_eq!(store.keys().collect::<Vec<_>>(), vec!["devicesX"]);

        let reopened = SettingsStore::open(&path, Box::new(JsonCodec));
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn test_clear_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.sset");
        let mut store = SettingsStore::open(&path, encrypted());
        store.set_value("a", json!("x")).unwrap();
        store.clear().unwrap();

        assert!(SettingsStore::open(&path, encrypted()).is_empty());
    }

    #[test]
    fn test_write_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        let path = blocker.join("app.sset");

        let mut store = SettingsStore::open(&path, encrypted());
        assert!(!store.is_unreadable());
        fs::write(&blocker, b"").unwrap();
        let result = store.set_value("a", json!(1));

        assert!(matches!(result, Err(Error::Io { .. })));
        assert_eq!(store.status(), StoreStatus::AccessError);
        assert_eq!(store.value("a"), Some(&json!(1)));
    }
}
