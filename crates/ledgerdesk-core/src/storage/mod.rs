//! Persistent key-value storage shared by every open console.
//!
//! This module provides:
//! - `SessionStorage`: the storage seam the session store and guard depend on
//! - `FileStorage`: a JSON file under the local data directory, shared across processes
//! - `MemoryStorage`: an in-process store with any number of `TabStorage` handles
//!
//! Writers never see their own change notifications; every other handle on the
//! same backing store does.

pub mod file;
pub mod memory;

use anyhow::Result;
use tokio::sync::broadcast;

pub use file::FileStorage;
pub use memory::{MemoryStorage, TabStorage};

/// Capacity of each change notification channel
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A change made to the shared store by some other handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// Changed key. `None` means the whole store was cleared.
    pub key: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl StorageEvent {
    pub fn changed(key: &str, old_value: Option<String>, new_value: Option<String>) -> Self {
        Self {
            key: Some(key.to_string()),
            old_value,
            new_value,
        }
    }

    pub fn cleared() -> Self {
        Self {
            key: None,
            old_value: None,
            new_value: None,
        }
    }

    /// True when this event removed the given key
    pub fn removes(&self, key: &str) -> bool {
        self.key.as_deref() == Some(key) && self.new_value.is_none()
    }
}

pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key. Removing an absent key is a no-op and notifies nobody.
    fn remove(&self, key: &str) -> Result<()>;

    /// Subscribe to changes made through other handles.
    fn subscribe(&self) -> broadcast::Receiver<StorageEvent>;
}
