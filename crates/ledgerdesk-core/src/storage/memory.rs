use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{SessionStorage, StorageEvent, EVENT_CHANNEL_CAPACITY};

/// Identifies which tab made a write
type TabId = u64;

struct Subscriber {
    tab: TabId,
    tx: broadcast::Sender<StorageEvent>,
}

struct Shared {
    entries: Mutex<HashMap<String, String>>,
    /// One channel per subscription, so a slow tab lags on its own
    subscribers: Mutex<Vec<Subscriber>>,
    next_tab: AtomicU64,
}

/// In-process storage shared by several tabs.
/// Clone is cheap and every clone refers to the same entries.
#[derive(Clone)]
pub struct MemoryStorage {
    shared: Arc<Shared>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                entries: Mutex::new(HashMap::new()),
                subscribers: Mutex::new(Vec::new()),
                next_tab: AtomicU64::new(1),
            }),
        }
    }

    /// Open a new tab onto this storage
    pub fn tab(&self) -> TabStorage {
        let id = self.shared.next_tab.fetch_add(1, Ordering::Relaxed);
        debug!(tab = id, "Opened storage tab");
        TabStorage {
            id,
            shared: Arc::clone(&self.shared),
        }
    }
}

/// One tab's view of a `MemoryStorage`.
pub struct TabStorage {
    id: TabId,
    shared: Arc<Shared>,
}

impl TabStorage {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove every key, as a storage `clear()` would
    pub fn clear(&self) -> Result<()> {
        let had_entries = {
            let mut entries = self.lock()?;
            let had_entries = !entries.is_empty();
            entries.clear();
            had_entries
        };
        if had_entries {
            self.publish(StorageEvent::cleared());
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.shared
            .entries
            .lock()
            .map_err(|_| anyhow!("Memory storage lock poisoned"))
    }

    fn publish(&self, event: StorageEvent) {
        let Ok(mut subscribers) = self.shared.subscribers.lock() else {
            warn!(tab = self.id, "Memory storage subscriber lock poisoned");
            return;
        };
        subscribers.retain(|s| s.tx.receiver_count() > 0);
        for subscriber in subscribers.iter().filter(|s| s.tab != self.id) {
            // Receiver may have gone since the retain; that is fine
            let _ = subscriber.tx.send(event.clone());
        }
    }
}

impl SessionStorage for TabStorage {
    fn get(&self, key: &str) -> Option<String> {
        match self.shared.entries.lock() {
            Ok(entries) => entries.get(key).cloned(),
            Err(_) => {
                warn!(key, "Memory storage lock poisoned on read");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let old_value = self.lock()?.insert(key.to_string(), value.to_string());
        if old_value.as_deref() != Some(value) {
            self.publish(StorageEvent::changed(key, old_value, Some(value.to_string())));
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let old_value = self.lock()?.remove(key);
        if old_value.is_some() {
            self.publish(StorageEvent::changed(key, old_value, None));
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        let (tx, rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        match self.shared.subscribers.lock() {
            Ok(mut subscribers) => subscribers.push(Subscriber { tab: self.id, tx }),
            Err(_) => warn!(tab = self.id, "Memory storage subscriber lock poisoned"),
        }
        rx
    }
}
