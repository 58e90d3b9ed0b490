//! Local, in-memory collections the monitor UI reads from.
//!
//! [`LocalCollection`] is a keyed store with change notification.
//! [`TodoCollection`] and [`MonitorCollections`] are the two concrete stores;
//! the latter also knows how to fold gateway `chat` / `agent` events into
//! session and action records.

pub mod collection;
pub mod error;
pub mod monitor;
pub mod todos;

use std::time::{SystemTime, UNIX_EPOCH};

pub use {
    collection::{CollectionChange, KeyFn, LocalCollection, Upserted},
    error::{CollectionError, Result},
    monitor::MonitorCollections,
    todos::TodoCollection,
};

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
