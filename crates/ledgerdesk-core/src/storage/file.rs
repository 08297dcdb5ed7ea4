use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{SessionStorage, StorageEvent, EVENT_CHANNEL_CAPACITY};

/// Storage file name in the data directory
const STORAGE_FILE: &str = "storage.json";

type Entries = BTreeMap<String, String>;

struct Inner {
    path: PathBuf,
    /// Entries as of the last write or poll by this process
    snapshot: Mutex<Entries>,
    notify: broadcast::Sender<StorageEvent>,
}

/// Storage persisted as a JSON object on disk.
///
/// Every console process of the same user shares the file. Changes made by
/// other processes are picked up by `watch()` and published to subscribers.
#[derive(Clone)]
pub struct FileStorage {
    inner: Arc<Inner>,
}

impl FileStorage {
    /// Open the storage file inside `data_dir`, creating the directory if needed
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
        let path = data_dir.join(STORAGE_FILE);
        let snapshot = read_entries(&path);
        debug!(path = %path.display(), keys = snapshot.len(), "Opened file storage");

        let (notify, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            inner: Arc::new(Inner {
                path,
                snapshot: Mutex::new(snapshot),
                notify,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Poll the file for changes made by other processes.
    /// The task ends on its own once every handle to this storage is dropped.
    pub fn watch(&self, poll_interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = inner.poll() {
                    warn!(error = %e, "Failed to poll storage file");
                }
            }
        })
    }

    /// Check the file once and publish whatever changed since the last look
    pub fn poll(&self) -> Result<usize> {
        self.inner.poll()
    }
}

impl Inner {
    fn lock(&self) -> Result<MutexGuard<'_, Entries>> {
        self.snapshot
            .lock()
            .map_err(|_| anyhow!("File storage lock poisoned"))
    }

    fn poll(&self) -> Result<usize> {
        let mut snapshot = self.lock()?;
        let current = read_entries(&self.path);
        let events = diff(&snapshot, &current);
        *snapshot = current;
        drop(snapshot);

        for event in &events {
            debug!(key = ?event.key, "External storage change");
            let _ = self.notify.send(event.clone());
        }
        Ok(events.len())
    }

    fn update(&self, key: &str, value: Option<&str>) -> Result<()> {
        let mut snapshot = self.lock()?;
        let mut current = read_entries(&self.path);
        let changed = match value {
            Some(value) => current.insert(key.to_string(), value.to_string()).as_deref() != Some(value),
            None => current.remove(key).is_some(),
        };
        if changed {
            write_entries(&self.path, &current)?;
        }
        // Only this key is known to be ours; other keys still get diffed by the next poll
        match value {
            Some(value) => snapshot.insert(key.to_string(), value.to_string()),
            None => snapshot.remove(key),
        };
        Ok(())
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        read_entries(&self.inner.path).remove(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.inner.update(key, Some(value))
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.update(key, None)
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.inner.notify.subscribe()
    }
}

/// Read the storage file. A missing or unreadable file counts as empty.
fn read_entries(path: &Path) -> Entries {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(_) => return Entries::new(),
    };
    serde_json::from_str(&contents).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "Ignoring unparseable storage file");
        Entries::new()
    })
}

fn write_entries(path: &Path, entries: &Entries) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let contents = serde_json::to_string_pretty(entries)?;
    std::fs::write(&tmp, contents).context("Failed to write storage file")?;
    std::fs::rename(&tmp, path).context("Failed to replace storage file")?;
    Ok(())
}

/// Per-key changes between two snapshots. An emptied file also yields a
/// trailing `cleared` event after the individual removals.
fn diff(before: &Entries, after: &Entries) -> Vec<StorageEvent> {
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    let mut events: Vec<StorageEvent> = keys
        .into_iter()
        .filter_map(|key| {
            let old = before.get(key);
            let new = after.get(key);
            (old != new).then(|| StorageEvent::changed(key, old.cloned(), new.cloned()))
        })
        .collect();
    if !before.is_empty() && after.is_empty() {
        events.push(StorageEvent::cleared());
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_get_remove_persist() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();

        storage.set("token", "abc").unwrap();
        assert_eq!(storage.get("token").as_deref(), Some("abc"));

        let reopened = FileStorage::open(dir.path()).unwrap();
        assert_eq!(reopened.get("token").as_deref(), Some("abc"));

        reopened.remove("token").unwrap();
        assert_eq!(storage.get("token"), None);
    }

    #[test]
    fn test_corrupt_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(STORAGE_FILE), "not json").unwrap();

        let storage = FileStorage::open(dir.path()).unwrap();
        assert_eq!(storage.get("token"), None);

        storage.set("token", "abc").unwrap();
        assert_eq!(storage.get("token").as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_poll_reports_other_process_changes() {
        let dir = TempDir::new().unwrap();
        let this_process = FileStorage::open(dir.path()).unwrap();
        let other_process = FileStorage::open(dir.path()).unwrap();
        let mut events = this_process.subscribe();

        this_process.set("user", "{}").unwrap();
        other_process.set("token", "fresh").unwrap();

        assert_eq!(this_process.poll().unwrap(), 1);
        let event = events.recv().await.unwrap();
        assert_eq!(event, StorageEvent::changed("token", None, Some("fresh".into())));

        other_process.remove("user").unwrap();
        assert_eq!(this_process.poll().unwrap(), 1);
        assert!(events.recv().await.unwrap().removes("user"));
    }

    #[test]
    fn test_own_writes_are_not_echoed() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();

        storage.set("token", "abc").unwrap();
        storage.set("language", "tr").unwrap();
        storage.remove("token").unwrap();

        assert_eq!(storage.poll().unwrap(), 0);
    }

    #[test]
    fn test_diff_emptied_file_reports_each_removal() {
        let mut before = Entries::new();
        before.insert("token".into(), "abc".into());
        before.insert("user".into(), "{}".into());

        assert_eq!(
            diff(&before, &Entries::new()),
            vec![
                StorageEvent::changed("token", Some("abc".into()), None),
                StorageEvent::changed("user", Some("{}".into()), None),
                StorageEvent::cleared(),
            ]
        );
        assert!(diff(&before, &before).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_publishes_changes_each_interval() {
        let dir = TempDir::new().unwrap();
        let this_process = FileStorage::open(dir.path()).unwrap();
        let other_process = FileStorage::open(dir.path()).unwrap();
        other_process.set("user", "{}").unwrap();

        let mut events = this_process.subscribe();
        let watcher = this_process.watch(Duration::from_secs(1));

        let first = tokio::time::timeout(Duration::from_millis(100), events.recv())
            .await
            .expect("first tick polls immediately")
            .unwrap();
        assert_eq!(first.key.as_deref(), Some("user"));

        other_process.remove("user").unwrap();
        let removed = tokio::time::timeout(Duration::from_millis(1500), events.recv())
            .await
            .expect("next tick picks up the removal")
            .unwrap();
        assert!(removed.removes("user"));
        watcher.abort();
    }
}
