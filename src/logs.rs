//! Diagnostic export contract
//!
//! Subsystems push `(source_name, text)` pairs to whatever collects logs;
//! the collector may batch several sources together. Serializers that want
//! to be found by the collector register here and stay registered until
//! their [`LogRegistration`] is dropped. Serializers are `Rc`-based, so the
//! registry is kept per thread.

use log::debug;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Source name the settings manager reports under
pub const LOG_SOURCE_NAME: &str = "Settings";

/// Something that can dump its state into a log aggregator
pub trait LogSerializer {
    fn serialize_logs(&self, callback: &mut dyn FnMut(&str, &str));
}

thread_local! {
    static SERIALIZERS: RefCell<Vec<(u64, Weak<dyn LogSerializer>)>> = RefCell::new(Vec::new());
    static NEXT_ID: Cell<u64> = const { Cell::new(0) };
}

/// Keeps a serializer registered; unregisters it when dropped
#[derive(Debug)]
pub struct LogRegistration {
    id: u64,
}

impl Drop for LogRegistration {
    fn drop(&mut self) {
        // The registry may already be gone during thread teardown.
        let _ = SERIALIZERS.try_with(|list| {
            list.borrow_mut().retain(|(id, _)| *id != self.id);
        });
        debug!("Unregistered log serializer {}", self.id);
    }
}

/// Make `serializer` visible to [`serialize_all_logs`] on this thread
pub fn register_log_serializer(serializer: Weak<dyn LogSerializer>) -> LogRegistration {
    let id = NEXT_ID.with(|next| {
        let id = next.get();
        next.set(id + 1);
        id
    });
    SERIALIZERS.with(|list| list.borrow_mut().push((id, serializer)));
    debug!("Registered log serializer {id}");
    LogRegistration { id }
}

/// Number of live serializers registered on this thread
pub fn registered_log_serializers() -> usize {
    SERIALIZERS.with(|list| {
        list.borrow()
            .iter()
            .filter(|(_, serializer)| serializer.strong_count() > 0)
            .count()
    })
}

/// Ask every live serializer on this thread for its logs, in registration order
pub fn serialize_all_logs(callback: &mut dyn FnMut(&str, &str)) {
    let live: Vec<Rc<dyn LogSerializer>> = SERIALIZERS.with(|list| {
        list.borrow()
            .iter()
            .filter_map(|(_, serializer)| serializer.upgrade())
            .collect()
    });
    for serializer in live {
        serializer.serialize_logs(callback);
    }
}
