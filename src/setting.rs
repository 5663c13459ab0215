//! A single named, persisted setting

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{Error, Result};
use crate::events::{SettingsEvent, SubscriptionId, Subscribers};
use crate::storage::connector::StoreConnector;

/// Fallback value of a setting
///
/// Two descriptors are equal when they resolve to the same value, so a
/// lazily computed default compares equal to the equivalent fixed one.
#[derive(Clone)]
pub enum DefaultValue {
    Fixed(Value),
    /// Computed on every read that finds no stored value
    Lazy(fn() -> Value),
}

impl DefaultValue {
    pub fn fixed(value: impl Into<Value>) -> Self {
        DefaultValue::Fixed(value.into())
    }

    pub fn lazy(getter: fn() -> Value) -> Self {
        DefaultValue::Lazy(getter)
    }

    pub fn null() -> Self {
        DefaultValue::Fixed(Value::Null)
    }

    pub fn resolve(&self) -> Value {
        match self {
            DefaultValue::Fixed(value) => value.clone(),
            DefaultValue::Lazy(getter) => getter(),
        }
    }
}

impl PartialEq for DefaultValue {
    fn eq(&self, other: &Self) -> bool {
        self.resolve() == other.resolve()
    }
}

impl From<Value> for DefaultValue {
    fn from(value: Value) -> Self {
        DefaultValue::Fixed(value)
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            DefaultValue::Lazy(_) => f.debug_tuple("Lazy").field(&self.resolve()).finish(),
        }
    }
}

/// Reset and diagnostics behaviour of a setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingPolicy {
    /// `reset()` erases the stored value
    pub remove_when_reset: bool,
    /// The value never shows up in log export
    pub sensitive: bool,
}

impl SettingPolicy {
    pub const fn new() -> Self {
        Self {
            remove_when_reset: true,
            sensitive: false,
        }
    }

    /// Survive soft resets
    pub const fn keep_on_reset(mut self) -> Self {
        self.remove_when_reset = false;
        self
    }

    /// Exclude the value from log export
    pub const fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub const fn with_remove_when_reset(mut self, remove_when_reset: bool) -> Self {
        self.remove_when_reset = remove_when_reset;
        self
    }

    pub const fn with_sensitive(mut self, sensitive: bool) -> Self {
        self.sensitive = sensitive;
        self
    }
}

impl Default for SettingPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to one key in the settings store
///
/// Values are not cached here; every `get` reads the store. Obtain
/// settings through [`crate::SettingsManager::create_or_get_setting`].
pub struct Setting {
    key: String,
    default: DefaultValue,
    policy: SettingPolicy,
    connector: Weak<StoreConnector>,
    subscribers: Subscribers<Setting>,
}

impl Setting {
    pub(crate) fn new(
        key: String,
        default: DefaultValue,
        policy: SettingPolicy,
        connector: Weak<StoreConnector>,
    ) -> Self {
        Self {
            key,
            default,
            policy,
            connector,
            subscribers: Subscribers::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn default_value(&self) -> &DefaultValue {
        &self.default
    }

    pub fn policy(&self) -> SettingPolicy {
        self.policy
    }

    pub fn remove_when_reset(&self) -> bool {
        self.policy.remove_when_reset
    }

    pub fn is_sensitive(&self) -> bool {
        self.policy.sensitive
    }

    /// Stored value, or the default when nothing is stored
    pub fn get(&self) -> Value {
        self.connector
            .upgrade()
            .and_then(|connector| connector.value(&self.key))
            .unwrap_or_else(|| self.default.resolve())
    }

    /// Current value deserialized into `T`
    pub fn get_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.get())?)
    }

    /// Whether a value is stored (as opposed to falling back to the default)
    pub fn is_set(&self) -> bool {
        self.connector
            .upgrade()
            .is_some_and(|connector| connector.contains(&self.key))
    }

    /// Store `value` and notify subscribers
    ///
    /// Nothing happens when `value` equals the current value. If the write
    /// fails the new value is still visible in memory, subscribers are
    /// still notified, and the error is returned. A store whose file could
    /// not be loaded rejects the value outright and nobody is notified.
    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let connector = self.connector()?;
        if self.get() == value {
            return Ok(());
        }

        let result = connector.set_value(&self.key, value);
        if !matches!(result, Err(Error::StoreUnreadable { .. })) {
            self.changed();
        }
        result
    }

    /// Erase the stored value so reads fall back to the default
    pub fn remove(&self) -> Result<()> {
        let connector = self.connector()?;
        let result = connector.remove(&self.key);
        if !matches!(result, Ok(false) | Err(Error::StoreUnreadable { .. })) {
            self.changed();
        }
        result.map(|_| ())
    }

    /// Erase the stored value if the policy allows it
    pub fn reset(&self) -> Result<()> {
        if !self.policy.remove_when_reset {
            return Ok(());
        }
        self.remove()
    }

    /// Tell subscribers the value may have changed
    pub fn changed(&self) {
        self.subscribers.notify(self);
        if let Some(connector) = self.connector.upgrade() {
            connector.publish(&SettingsEvent::Changed {
                key: self.key.clone(),
            });
        }
    }

    /// Diagnostic line `key=value`, empty for sensitive settings
    pub fn log(&self) -> String {
        if self.policy.sensitive {
            return String::new();
        }
        match self.get() {
            Value::String(text) => format!("{}={}", self.key, text),
            other => format!("{}={}", self.key, other),
        }
    }

    pub fn subscribe(&self, callback: impl Fn(&Setting) + 'static) -> SubscriptionId {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    fn connector(&self) -> Result<Rc<StoreConnector>> {
        self.connector.upgrade().ok_or(Error::ManagerGone)
    }
}

impl fmt::Debug for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setting")
            .field("key", &self.key)
            .field("default", &self.default)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
