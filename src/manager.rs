//! Process-wide settings registry and lifecycle owner
//!
//! The manager owns the settings store and hands out one [`Setting`] per
//! key. It can be used as an explicit context object (`SettingsManager::new`)
//! or through the process-wide singleton (`initialize` / `instance` /
//! `shutdown`). The singleton is `Rc`-based, so it lives on the thread that
//! created it; every other thread is refused until it is shut down.

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::rc::{Rc, Weak};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use crate::config::SettingsConfig;
use crate::error::{Error, Result};
use crate::events::{SettingsEvent, SubscriptionId};
use crate::group::SettingGroup;
use crate::keys::validate_key;
use crate::logs::{self, LogRegistration, LogSerializer, LOG_SOURCE_NAME};
use crate::setting::{DefaultValue, Setting, SettingPolicy};
use crate::storage::connector::StoreConnector;
use crate::storage::{SettingsStore, StoreStatus};

/// Thread holding the singleton, if any
static OWNER: Lazy<Mutex<Option<ThreadId>>> = Lazy::new(|| Mutex::new(None));

thread_local! {
    static INSTANCE: Slot = Slot(RefCell::new(None));
}

fn owner() -> MutexGuard<'static, Option<ThreadId>> {
    OWNER.lock().unwrap_or_else(PoisonError::into_inner)
}

/// This thread's handle on the singleton
struct Slot(RefCell<Option<Rc<SettingsManager>>>);

impl Slot {
    fn get(&self) -> Option<Rc<SettingsManager>> {
        self.0.borrow().clone()
    }

    /// Drop the manager and give up process-wide ownership
    fn release(&self) -> Option<Rc<SettingsManager>> {
        let manager = self.0.borrow_mut().take();
        if manager.is_some() {
            *owner() = None;
        }
        manager
    }
}

impl Drop for Slot {
    // Owning thread exited without calling `shutdown`
    fn drop(&mut self) {
        if self.0.get_mut().take().is_some() {
            *owner() = None;
        }
    }
}

/// Registered settings in registration order
#[derive(Default)]
struct Registry {
    order: Vec<Rc<Setting>>,
    index: HashMap<String, usize>,
}

impl Registry {
    fn get(&self, key: &str) -> Option<Rc<Setting>> {
        self.index.get(key).map(|&i| Rc::clone(&self.order[i]))
    }

    fn insert(&mut self, setting: Rc<Setting>) -> bool {
        if self.index.contains_key(setting.key()) {
            return false;
        }
        self.index.insert(setting.key().to_string(), self.order.len());
        self.order.push(setting);
        true
    }

    fn clear(&mut self) {
        self.index.clear();
        self.order.clear();
    }
}

pub struct SettingsManager {
    config: SettingsConfig,
    connector: Rc<StoreConnector>,
    registry: RefCell<Registry>,
    log_registration: RefCell<Option<LogRegistration>>,
}

impl SettingsManager {
    /// Open the settings file described by `config`
    pub fn new(config: SettingsConfig) -> Result<Rc<Self>> {
        debug!("Initializing SettingsManager");

        let path = config.settings_path()?;
        let store = SettingsStore::open(path, config.format.codec());

        Ok(Rc::new(Self {
            config,
            connector: Rc::new(StoreConnector::new(store)),
            registry: RefCell::new(Registry::default()),
            log_registration: RefCell::new(None),
        }))
    }

    // ========================================================================
    // Singleton lifecycle
    // ========================================================================

    /// Create the process-wide manager at application startup
    ///
    /// Fails with [`Error::AlreadyInitialized`] if this thread already owns
    /// it, and with [`Error::OwnedByAnotherThread`] if another thread does.
    pub fn initialize(config: SettingsConfig) -> Result<Rc<Self>> {
        if INSTANCE.with(Slot::get).is_some() {
            return Err(Error::AlreadyInitialized);
        }
        let manager = Self::install(config)?;
        info!(
            "✅ Settings manager initialized ({})",
            manager.settings_file_name().display()
        );
        Ok(manager)
    }

    /// The process-wide manager, created with the default config on first use
    ///
    /// Only the thread that created it gets it back; other threads receive
    /// [`Error::OwnedByAnotherThread`].
    pub fn instance() -> Result<Rc<Self>> {
        if let Some(manager) = INSTANCE.with(Slot::get) {
            return Ok(manager);
        }
        Self::install(SettingsConfig::default())
    }

    /// Claim ownership for this thread and build the singleton
    fn install(config: SettingsConfig) -> Result<Rc<Self>> {
        let mut owner = owner();
        if owner.is_some() {
            warn!("⚠️ Settings manager requested from a thread that does not own it");
            return Err(Error::OwnedByAnotherThread);
        }

        let manager = Self::new(config)?;
        manager.register_log_serializer();
        INSTANCE.with(|slot| *slot.0.borrow_mut() = Some(Rc::clone(&manager)));
        *owner = Some(thread::current().id());
        Ok(manager)
    }

    /// Whether some thread currently owns the singleton
    pub fn is_initialized() -> bool {
        owner().is_some()
    }

    /// Release the singleton at application teardown
    ///
    /// Returns `false` if this thread had nothing to release. Handles still
    /// held by callers keep the old manager alive, so drop them first.
    pub fn shutdown() -> bool {
        let released = INSTANCE.with(Slot::release).is_some();
        if released {
            info!("Settings manager shut down");
        }
        released
    }

    /// Wipe the store and drop the singleton so the next test starts clean
    #[cfg(any(test, feature = "test-util"))]
    pub fn test_cleanup() {
        if let Some(manager) = INSTANCE.with(Slot::get) {
            if let Err(e) = manager.hard_reset() {
                warn!("⚠️ Hard reset during test cleanup failed: {e}");
            }
        }
        INSTANCE.with(Slot::release);
    }

    /// Make this manager reachable through [`crate::serialize_all_logs`]
    ///
    /// The singleton does this on construction. Registration ends when the
    /// manager is dropped or [`SettingsManager::unregister_log_serializer`]
    /// is called.
    pub fn register_log_serializer(self: &Rc<Self>) {
        let mut registration = self.log_registration.borrow_mut();
        if registration.is_none() {
            let serializer: Weak<dyn LogSerializer> = Rc::<Self>::downgrade(self);
            *registration = Some(logs::register_log_serializer(serializer));
        }
    }

    /// Returns `false` if the manager was not registered
    pub fn unregister_log_serializer(&self) -> bool {
        self.log_registration.borrow_mut().take().is_some()
    }

    // ========================================================================
    // Registry
    // ========================================================================

    pub fn config(&self) -> &SettingsConfig {
        &self.config
    }

    pub fn settings_file_name(&self) -> PathBuf {
        self.connector.file_name()
    }

    pub fn store_status(&self) -> StoreStatus {
        self.connector.status()
    }

    pub fn sync(&self) -> Result<()> {
        self.connector.sync()
    }

    /// Add `setting` to the registry; ignored if its key is already taken
    pub fn register_setting(&self, setting: Rc<Setting>) {
        let key = setting.key().to_string();
        if !self.registry.borrow_mut().insert(setting) {
            debug!("Setting '{key}' already registered");
        }
    }

    pub fn get_setting(&self, key: &str) -> Option<Rc<Setting>> {
        self.registry.borrow().get(key)
    }

    /// Return the setting for `key`, creating it on first request
    ///
    /// # Panics
    ///
    /// If `key` is already registered with a different default value or
    /// policy. Every call site of a key has to agree on its definition.
    pub fn create_or_get_setting(
        &self,
        key: &str,
        default: DefaultValue,
        policy: SettingPolicy,
    ) -> Result<Rc<Setting>> {
        validate_key(key)?;

        if let Some(existing) = self.get_setting(key) {
            assert!(
                *existing.default_value() == default,
                "setting '{key}' re-registered with a different default value"
            );
            assert!(
                existing.remove_when_reset() == policy.remove_when_reset,
                "setting '{key}' re-registered with a different remove_when_reset"
            );
            assert!(
                existing.is_sensitive() == policy.sensitive,
                "setting '{key}' re-registered with a different sensitivity"
            );
            return Ok(existing);
        }

        let setting = Rc::new(Setting::new(
            key.to_string(),
            default,
            policy,
            Rc::downgrade(&self.connector),
        ));
        self.register_setting(Rc::clone(&setting));
        Ok(setting)
    }

    /// Build a new group; callers own group identity
    pub fn create_setting_group<I, K>(
        self: &Rc<Self>,
        group_key: &str,
        policy: SettingPolicy,
        accepted_keys: I,
    ) -> Result<SettingGroup>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        validate_key(group_key)?;
        let accepted_keys = accepted_keys
            .into_iter()
            .map(Into::into)
            .map(|key: String| validate_key(&key).map(|()| key))
            .collect::<Result<BTreeSet<_>>>()?;

        Ok(SettingGroup::new(
            Rc::downgrade(self),
            Rc::downgrade(&self.connector),
            group_key.to_string(),
            policy,
            accepted_keys,
        ))
    }

    pub fn registered_keys(&self) -> Vec<String> {
        self.snapshot()
            .iter()
            .map(|setting| setting.key().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.registry.borrow().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Rc<Setting>> {
        self.registry.borrow().order.clone()
    }

    // ========================================================================
    // Reset
    // ========================================================================

    /// Reset every registered setting according to its own policy
    ///
    /// Keeps going after a failure and returns the first one. Keys stored
    /// on disk but never registered in this session are left alone; use
    /// [`SettingsManager::hard_reset`] to drop everything.
    pub fn reset(&self) -> Result<()> {
        debug!("Clean up the settings");

        let mut first_error = None;
        for setting in self.snapshot() {
            if let Err(e) = setting.reset() {
                warn!("⚠️ Failed to reset '{}': {e}", setting.key());
                first_error.get_or_insert(e);
            }
        }

        self.connector.publish(&SettingsEvent::Reset);
        first_error.map_or(Ok(()), Err)
    }

    /// Clear the whole store and notify every registered setting
    ///
    /// Also replaces a settings file that could not be loaded.
    pub fn hard_reset(&self) -> Result<()> {
        debug!("Hard reset");

        let result = self.connector.clear();
        for setting in self.snapshot() {
            setting.changed();
        }

        self.connector.publish(&SettingsEvent::HardReset);
        result
    }

    // ========================================================================
    // Events and diagnostics
    // ========================================================================

    /// Receive every change, reset and hard reset
    pub fn subscribe(&self, callback: impl Fn(&SettingsEvent) + 'static) -> SubscriptionId {
        self.connector.events().subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.connector.events().unsubscribe(id)
    }

    /// Non-empty diagnostic lines in registration order
    pub fn log_lines(&self) -> Vec<String> {
        self.snapshot()
            .iter()
            .map(|setting| setting.log())
            .filter(|line| !line.is_empty())
            .collect()
    }

    /// Push all diagnostic lines to `callback` as `("Settings", text)`
    pub fn serialize_logs<F>(&self, callback: F)
    where
        F: FnOnce(&str, &str),
    {
        let mut buffer = String::new();
        for line in self.log_lines() {
            buffer.push_str(&line);
            buffer.push('\n');
        }
        callback(LOG_SOURCE_NAME, &buffer);
    }
}

impl LogSerializer for SettingsManager {
    fn serialize_logs(&self, callback: &mut dyn FnMut(&str, &str)) {
        SettingsManager::serialize_logs(self, |name, text| callback(name, text));
    }
}

impl fmt::Debug for SettingsManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsManager")
            .field("file", &self.settings_file_name())
            .field("registered", &self.len())
            .finish()
    }
}

impl Drop for SettingsManager {
    fn drop(&mut self) {
        debug!("Destroying SettingsManager");
        self.registry.get_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> SettingsConfig {
        SettingsConfig::builder("manager")
            .config_dir(dir.path())
            .passphrase("test-pass")
            .build()
    }

    #[test]
    fn test_create_or_get_returns_same_object() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(config(&dir)).unwrap();

        let a = manager
            .create_or_get_setting("telemetry.enabled", DefaultValue::fixed(false), SettingPolicy::new())
            .unwrap();
        let b = manager
            .create_or_get_setting("telemetry.enabled", DefaultValue::fixed(false), SettingPolicy::new())
            .unwrap();

        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(manager.registered_keys(), vec!["telemetry.enabled"]);
    }

    #[test]
    fn test_lazy_and_fixed_defaults_are_compatible() {
        fn off() -> serde_json::Value {
            json!(false)
        }
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(config(&dir)).unwrap();

        let a = manager
            .create_or_get_setting("a", DefaultValue::lazy(off), SettingPolicy::new())
            .unwrap();
        let b = manager
            .create_or_get_setting("a", DefaultValue::fixed(false), SettingPolicy::new())
            .unwrap();
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    #[should_panic(expected = "remove_when_reset")]
    fn test_mismatched_reset_policy_panics() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(config(&dir)).unwrap();
        manager
            .create_or_get_setting("a", DefaultValue::null(), SettingPolicy::new())
            .unwrap();
        let _ = manager.create_or_get_setting(
            "a",
            DefaultValue::null(),
            SettingPolicy::new().keep_on_reset(),
        );
    }

    #[test]
    #[should_panic(expected = "sensitivity")]
    fn test_mismatched_sensitivity_panics() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(config(&dir)).unwrap();
        manager
            .create_or_get_setting("a", DefaultValue::null(), SettingPolicy::new())
            .unwrap();
        let _ = manager.create_or_get_setting("a", DefaultValue::null(), SettingPolicy::new().sensitive());
    }

    #[test]
    #[should_panic(expected = "default value")]
    fn test_mismatched_default_panics() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(config(&dir)).unwrap();
        manager
            .create_or_get_setting("a", DefaultValue::fixed(1), SettingPolicy::new())
            .unwrap();
        let _ = manager.create_or_get_setting("a", DefaultValue::fixed(2), SettingPolicy::new());
    }

    #[test]
    fn test_invalid_key_rejected() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(config(&dir)).unwrap();
        let result = manager.create_or_get_setting("bad key", DefaultValue::null(), SettingPolicy::new());
        assert!(matches!(result, Err(Error::InvalidKey(_))));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_register_setting_ignores_duplicates() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(config(&dir)).unwrap();
        let original = manager
            .create_or_get_setting("a", DefaultValue::fixed(1), SettingPolicy::new())
            .unwrap();

        let impostor = Rc::new(Setting::new(
            "a".to_string(),
            DefaultValue::fixed(2),
            SettingPolicy::new(),
            Rc::downgrade(&manager.connector),
        ));
        manager.register_setting(impostor);

        let current = manager.get_setting("a").unwrap();
        assert!(Rc::ptr_eq(&current, &original));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_reset_is_selective() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(config(&dir)).unwrap();
        let telemetry = manager
            .create_or_get_setting("telemetry.enabled", DefaultValue::fixed(false), SettingPolicy::new())
            .unwrap();
        let onboarding = manager
            .create_or_get_setting(
                "core.completed_onboarding",
                DefaultValue::fixed(false),
                SettingPolicy::new().keep_on_reset(),
            )
            .unwrap();

        telemetry.set(true).unwrap();
        onboarding.set(true).unwrap();
        manager.reset().unwrap();

        assert_eq!(telemetry.get(), json!(false));
        assert_eq!(onboarding.get(), json!(true));
    }

    #[test]
    fn test_hard_reset_clears_everything_and_notifies() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(config(&dir)).unwrap();
        let kept = manager
            .create_or_get_setting("kept", DefaultValue::fixed(0), SettingPolicy::new().keep_on_reset())
            .unwrap();
        kept.set(5).unwrap();

        let notified = Rc::new(Cell::new(0));
        let n = Rc::clone(&notified);
        kept.subscribe(move |_| n.set(n.get() + 1));

        let hard_resets = Rc::new(Cell::new(0));
        let h = Rc::clone(&hard_resets);
        manager.subscribe(move |event| {
            if *event == SettingsEvent::HardReset {
                h.set(h.get() + 1);
            }
        });

        manager.hard_reset().unwrap();

        assert_eq!(kept.get(), json!(0));
        assert!(!kept.is_set());
        assert_eq!(notified.get(), 1);
        assert_eq!(hard_resets.get(), 1);
    }

    #[test]
    fn test_serialize_logs_redacts_sensitive() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(config(&dir)).unwrap();
        manager
            .create_or_get_setting("telemetry.enabled", DefaultValue::fixed(false), SettingPolicy::new())
            .unwrap();
        manager
            .create_or_get_setting("account.token", DefaultValue::fixed(""), SettingPolicy::new().sensitive())
            .unwrap()
            .set("abc123")
            .unwrap();
        manager
            .create_or_get_setting("ui.theme", DefaultValue::fixed("dark"), SettingPolicy::new())
            .unwrap();

        let mut captured = None;
        manager.serialize_logs(|name, text| captured = Some((name.to_string(), text.to_string())));

        let (name, text) = captured.unwrap();
        assert_eq!(name, "Settings");
        assert_eq!(text, "telemetry.enabled=false\nui.theme=dark\n");
        assert!(!text.contains("abc123"));
    }

    #[test]
    fn test_log_serializer_trait_object() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(config(&dir)).unwrap();
        manager
            .create_or_get_setting("a", DefaultValue::fixed(1), SettingPolicy::new())
            .unwrap();

        let serializer: &dyn LogSerializer = &*manager;
        let mut out = Vec::new();
        serializer.serialize_logs(&mut |name, text| out.push(format!("{name}:{text}")));
        assert_eq!(out, vec!["Settings:a=1\n".to_string()]);
    }

    #[test]
    fn test_settings_outlive_manager_detached() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(config(&dir)).unwrap();
        let setting = manager
            .create_or_get_setting("a", DefaultValue::fixed(1), SettingPolicy::new())
            .unwrap();
        setting.set(2).unwrap();
        drop(manager);

        assert_eq!(setting.get(), json!(1));
        assert!(matches!(setting.set(3), Err(Error::ManagerGone)));
    }

    #[test]
    fn test_log_registration_follows_manager() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(config(&dir)).unwrap();
        manager
            .create_or_get_setting("a", DefaultValue::fixed(1), SettingPolicy::new())
            .unwrap();
        assert_eq!(logs::registered_log_serializers(), 0);

        manager.register_log_serializer();
        manager.register_log_serializer();
        assert_eq!(logs::registered_log_serializers(), 1);

        let mut out = Vec::new();
        logs::serialize_all_logs(&mut |name, text| out.push(format!("{name}:{text}")));
        assert_eq!(out, vec!["Settings:a=1\n".to_string()]);

        assert!(manager.unregister_log_serializer());
        assert!(!manager.unregister_log_serializer());
        assert_eq!(logs::registered_log_serializers(), 0);

        manager.register_log_serializer();
        drop(manager);
        assert_eq!(logs::registered_log_serializers(), 0);
    }

    // Single test: the singleton is process-wide and tests run in parallel.
    #[test]
    fn test_singleton_lifecycle() {
        let dir = TempDir::new().unwrap();
        assert!(!SettingsManager::is_initialized());

        let first = SettingsManager::initialize(config(&dir)).unwrap();
        assert!(matches!(
            SettingsManager::initialize(config(&dir)),
            Err(Error::AlreadyInitialized)
        ));
        let again = SettingsManager::instance().unwrap();
        assert!(Rc::ptr_eq(&first, &again));
        assert_eq!(logs::registered_log_serializers(), 1);

        let other_config = config(&dir);
        let (initialize_refused, instance_refused, shutdown_released) = thread::spawn(move || {
            (
                matches!(
                    SettingsManager::initialize(other_config),
                    Err(Error::OwnedByAnotherThread)
                ),
                matches!(SettingsManager::instance(), Err(Error::OwnedByAnotherThread)),
                SettingsManager::shutdown(),
            )
        })
        .join()
        .unwrap();
        assert!(initialize_refused);
        assert!(instance_refused);
        assert!(!shutdown_released);
        assert!(SettingsManager::is_initialized());

        first
            .create_or_get_setting("a", DefaultValue::null(), SettingPolicy::new())
            .unwrap()
            .set("x")
            .unwrap();
        drop(first);
        drop(again);

        SettingsManager::test_cleanup();
        assert!(!SettingsManager::is_initialized());
        assert!(!SettingsManager::shutdown());
        assert_eq!(logs::registered_log_serializers(), 0);

        // A thread that exits while owning the singleton gives it up
        let other_config = config(&dir);
        let claimed = thread::spawn(move || SettingsManager::initialize(other_config).is_ok())
            .join()
            .unwrap();
        assert!(claimed);

        let fresh = SettingsManager::initialize(config(&dir)).unwrap();
        assert!(fresh.is_empty());
        assert_eq!(fresh.store_status(), StoreStatus::NoError);
        let a = fresh
            .create_or_get_setting("a", DefaultValue::null(), SettingPolicy::new())
            .unwrap();
        assert!(!a.is_set());

        assert!(SettingsManager::shutdown());
        assert!(!SettingsManager::is_initialized());
    }
}
