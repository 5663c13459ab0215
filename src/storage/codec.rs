//! Codec contract between the settings image and the bytes on disk

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Plain key/value content of a settings file
pub type SettingsImage = BTreeMap<String, Value>;

pub(crate) const DOCUMENT_VERSION: u32 = 1;

/// JSON document wrapped by every codec
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StoreDocument {
    pub version: u32,
    pub written_at: DateTime<Utc>,
    #[serde(default)]
    pub values: SettingsImage,
}

impl StoreDocument {
    pub fn to_vec(image: &SettingsImage, pretty: bool) -> Result<Vec<u8>> {
        let doc = StoreDocumentRef {
            version: DOCUMENT_VERSION,
            written_at: Utc::now(),
            values: image,
        };
        let bytes = if pretty {
            serde_json::to_vec_pretty(&doc)
        } else {
            serde_json::to_vec(&doc)
        };
        bytes.map_err(|e| Error::Encode(e.to_string()))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<SettingsImage> {
        let doc: StoreDocument =
            serde_json::from_slice(bytes).map_err(|e| Error::Decode(e.to_string()))?;
        if doc.version > DOCUMENT_VERSION {
            return Err(Error::Decode(format!(
                "unsupported document version {}",
                doc.version
            )));
        }
        debug!(
            "Settings document has {} values, written at {}",
            doc.values.len(),
            doc.written_at
        );
        Ok(doc.values)
    }
}

#[derive(Serialize)]
struct StoreDocumentRef<'a> {
    version: u32,
    written_at: DateTime<Utc>,
    values: &'a SettingsImage,
}

/// A named format turning an image into bytes and back
///
/// `decode` is only called for files that exist; an absent file never
/// reaches the codec.
pub trait SettingsCodec: Send + Sync {
    /// Format identifier, also used as the settings file extension
    fn format_name(&self) -> &str;

    fn encode(&self, image: &SettingsImage) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<SettingsImage>;
}

/// Unencrypted pretty-printed JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl SettingsCodec for JsonCodec {
    fn format_name(&self) -> &str {
        "json"
    }

    fn encode(&self, image: &SettingsImage) -> Result<Vec<u8>> {
        StoreDocument::to_vec(image, true)
    }

    fn decode(&self, bytes: &[u8]) -> Result<SettingsImage> {
        StoreDocument::from_slice(bytes)
    }
}
