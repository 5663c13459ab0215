//! Namespaced settings sharing a key prefix
//!
//! A group only materializes members whose sub-key is on its whitelist.
//! Members are ordinary registered settings keyed `group_key/sub_key`.

use log::warn;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{Error, Result};
use crate::events::{SettingsEvent, SubscriptionId};
use crate::keys::{group_prefix, member_key};
use crate::manager::SettingsManager;
use crate::setting::{DefaultValue, Setting, SettingPolicy};
use crate::storage::connector::StoreConnector;

pub struct SettingGroup {
    manager: Weak<SettingsManager>,
    connector: Weak<StoreConnector>,
    group_key: String,
    policy: SettingPolicy,
    accepted_keys: BTreeSet<String>,
    overrides: HashMap<String, SettingPolicy>,
    members: RefCell<BTreeMap<String, Rc<Setting>>>,
}

impl SettingGroup {
    pub(crate) fn new(
        manager: Weak<SettingsManager>,
        connector: Weak<StoreConnector>,
        group_key: String,
        policy: SettingPolicy,
        accepted_keys: BTreeSet<String>,
    ) -> Self {
        Self {
            manager,
            connector,
            group_key,
            policy,
            accepted_keys,
            overrides: HashMap::new(),
            members: RefCell::new(BTreeMap::new()),
        }
    }

    /// Use `policy` instead of the group policy for one member
    pub fn with_policy_override(mut self, sub_key: impl Into<String>, policy: SettingPolicy) -> Self {
        self.overrides.insert(sub_key.into(), policy);
        self
    }

    pub fn group_key(&self) -> &str {
        &self.group_key
    }

    pub fn policy(&self) -> SettingPolicy {
        self.policy
    }

    pub fn policy_for(&self, sub_key: &str) -> SettingPolicy {
        self.overrides.get(sub_key).copied().unwrap_or(self.policy)
    }

    pub fn accepted_keys(&self) -> impl Iterator<Item = &str> {
        self.accepted_keys.iter().map(String::as_str)
    }

    pub fn accepts(&self, sub_key: &str) -> bool {
        self.accepted_keys.contains(sub_key)
    }

    /// Member setting for `sub_key`, created on first request
    pub fn get_setting(&self, sub_key: &str) -> Result<Rc<Setting>> {
        if !self.accepts(sub_key) {
            warn!(
                "⚠️ Rejected key '{sub_key}' for setting group '{}'",
                self.group_key
            );
            return Err(Error::AccessDenied {
                group: self.group_key.clone(),
                key: sub_key.to_string(),
            });
        }

        if let Some(existing) = self.members.borrow().get(sub_key) {
            return Ok(Rc::clone(existing));
        }

        let manager = self.manager.upgrade().ok_or(Error::ManagerGone)?;
        let setting = manager.create_or_get_setting(
            &member_key(&self.group_key, sub_key),
            DefaultValue::null(),
            self.policy_for(sub_key),
        )?;
        self.members
            .borrow_mut()
            .insert(sub_key.to_string(), Rc::clone(&setting));
        Ok(setting)
    }

    pub fn get(&self, sub_key: &str) -> Result<Value> {
        Ok(self.get_setting(sub_key)?.get())
    }

    pub fn set(&self, sub_key: &str, value: impl Into<Value>) -> Result<()> {
        self.get_setting(sub_key)?.set(value)
    }

    pub fn remove(&self, sub_key: &str) -> Result<()> {
        self.get_setting(sub_key)?.remove()
    }

    /// Drop every stored key under the group prefix
    ///
    /// Also removes keys that are no longer on the whitelist.
    pub fn remove_all(&self) -> Result<()> {
        let connector = self.connector.upgrade().ok_or(Error::ManagerGone)?;
        let result = connector.remove_group(&group_prefix(&self.group_key));

        let members: Vec<Rc<Setting>> = self.members.borrow().values().cloned().collect();
        for member in members {
            member.changed();
        }
        result.map(|_| ())
    }

    /// Reset every materialized member, returning the first failure
    ///
    /// Only members obtained through [`SettingGroup::get_setting`] (or
    /// `get`/`set`/`remove`) in this session are reset. Values stored
    /// under the prefix by an earlier run stay on disk until their member
    /// is materialized; use [`SettingGroup::remove_all`] to drop them
    /// regardless.
    pub fn reset(&self) -> Result<()> {
        let members: Vec<Rc<Setting>> = self.members.borrow().values().cloned().collect();
        let mut first_error = None;
        for member in members {
            if let Err(e) = member.reset() {
                warn!("⚠️ Failed to reset '{}': {e}", member.key());
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Sub-keys that currently have a stored value
    pub fn stored_keys(&self) -> Vec<String> {
        let prefix = group_prefix(&self.group_key);
        self.connector
            .upgrade()
            .map(|connector| {
                connector
                    .keys_with_prefix(&prefix)
                    .into_iter()
                    .map(|key| key[prefix.len()..].to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Call `callback` with the sub-key whenever a member changes
    ///
    /// Hard and soft resets are forwarded with an empty sub-key.
    pub fn subscribe(&self, callback: impl Fn(&str) + 'static) -> Result<SubscriptionId> {
        let connector = self.connector.upgrade().ok_or(Error::ManagerGone)?;
        let prefix = group_prefix(&self.group_key);
        Ok(connector.events().subscribe(move |event| match event {
            SettingsEvent::Changed { key } => {
                if let Some(sub_key) = key.strip_prefix(&prefix) {
                    callback(sub_key);
                }
            }
            SettingsEvent::Reset | SettingsEvent::HardReset => callback(""),
        }))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.connector
            .upgrade()
            .is_some_and(|connector| connector.events().unsubscribe(id))
    }
}

impl fmt::Debug for SettingGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingGroup")
            .field("group_key", &self.group_key)
            .field("policy", &self.policy)
            .field("accepted_keys", &self.accepted_keys)
            .finish_non_exhaustive()
    }
}
