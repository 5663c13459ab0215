//! Setting key validation
//!
//! Keys are path-like: one or more segments of `[A-Za-z0-9_.-]` joined by `/`.
//! Group members live under `group_key/sub_key`. Spaces and non-ASCII
//! characters are rejected even though the file format could hold them.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

static KEY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_.\-]+(/[A-Za-z0-9_.\-]+)*$").expect("key pattern is a valid regex")
});

pub const GROUP_SEPARATOR: char = '/';

/// Check that `key` is a well-formed setting key
pub fn validate_key(key: &str) -> Result<()> {
    if KEY_PATTERN.is_match(key) {
        Ok(())
    } else {
        Err(Error::InvalidKey(key.to_string()))
    }
}

/// Build the full key of a group member
pub fn member_key(group_key: &str, sub_key: &str) -> String {
    format!("{group_key}{GROUP_SEPARATOR}{sub_key}")
}

/// Prefix (including the trailing separator) shared by all members of a group
pub fn group_prefix(group_key: &str) -> String {
    format!("{group_key}{GROUP_SEPARATOR}")
}
