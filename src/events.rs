//! Change notification for settings
//!
//! Every setting keeps its own subscriber list, and the manager owns one
//! `EventBus` that sees every change. Callbacks are invoked after the
//! subscriber list has been snapshotted, so a callback may subscribe,
//! unsubscribe or touch settings without tripping a `RefCell` borrow.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Identifies a subscription so it can be removed later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Events published on the manager-wide bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsEvent {
    /// The value behind `key` may have changed
    Changed { key: String },
    /// A soft reset ran over every registered setting
    Reset,
    /// The whole store was cleared
    HardReset,
}

impl SettingsEvent {
    pub fn key(&self) -> Option<&str> {
        match self {
            SettingsEvent::Changed { key } => Some(key),
            SettingsEvent::Reset | SettingsEvent::HardReset => None,
        }
    }
}

type Callback<T> = Rc<dyn Fn(&T)>;

/// Ordered list of callbacks for a payload type `T`
pub struct Subscribers<T> {
    next_id: Cell<u64>,
    callbacks: RefCell<Vec<(SubscriptionId, Callback<T>)>>,
}

impl<T> Subscribers<T> {
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(0),
            callbacks: RefCell::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);
        let callback: Callback<T> = Rc::new(callback);
        self.callbacks.borrow_mut().push((id, callback));
        id
    }

    /// Returns `false` if the id was not subscribed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.callbacks.borrow_mut();
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    pub fn notify(&self, payload: &T) {
        let snapshot: Vec<Callback<T>> = self
            .callbacks
            .borrow()
            .iter()
            .map(|(_, cb)| Rc::clone(cb))
            .collect();
        for callback in snapshot {
            callback(payload);
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Subscribers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("count", &self.len())
            .finish()
    }
}

/// Manager-wide event channel
pub type EventBus = Subscribers<SettingsEvent>;
