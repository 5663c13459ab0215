//! Bridge between settings and the store they live in
//!
//! The manager holds the only strong reference; settings and groups keep a
//! `Weak` so they stop touching the file once the manager is gone.

use serde_json::Value;
use std::cell::RefCell;
use std::path::PathBuf;

use super::store::{SettingsStore, StoreStatus};
use crate::error::Result;
use crate::events::{EventBus, SettingsEvent};

pub struct StoreConnector {
    store: RefCell<SettingsStore>,
    events: EventBus,
}

impl StoreConnector {
    pub fn new(store: SettingsStore) -> Self {
        Self {
            store: RefCell::new(store),
            events: EventBus::new(),
        }
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        self.store.borrow().value(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.store.borrow().contains(key)
    }

    pub fn set_value(&self, key: &str, value: Value) -> Result<()> {
        self.store.borrow_mut().set_value(key, value)
    }

    pub fn remove(&self, key: &str) -> Result<bool> {
        self.store.borrow_mut().remove(key)
    }

    pub fn remove_group(&self, prefix: &str) -> Result<usize> {
        self.store.borrow_mut().remove_group(prefix)
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.store
            .borrow()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .map(str::to_string)
            .collect()
    }

    pub fn clear(&self) -> Result<()> {
        self.store.borrow_mut().clear()
    }

    pub fn sync(&self) -> Result<()> {
        self.store.borrow_mut().sync()
    }

    pub fn file_name(&self) -> PathBuf {
        self.store.borrow().file_name().to_path_buf()
    }

    pub fn status(&self) -> StoreStatus {
        self.store.borrow().status()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn publish(&self, event: &SettingsEvent) {
        self.events.notify(event);
    }
}
