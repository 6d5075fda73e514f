//! Process-wide status registry shared by every lifecycle controller.
//!
//! Any number of observers may read or subscribe; each asset key has at most one
//! writer at a time, obtained through [`StatusRegistry::claim`].

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use chrono::{DateTime, Utc};
use futures::{future, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use shared::domain::{AssetId, LifecycleStatus};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub status: LifecycleStatus,
    /// Fraction complete in `[0, 1]` while the status polls progress.
    pub progress: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub asset_id: AssetId,
    pub status: LifecycleStatus,
    pub progress: Option<f64>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("asset {0} already has an active status writer")]
    AlreadyClaimed(AssetId),
}

#[derive(Clone)]
pub struct StatusRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    entries: RwLock<HashMap<AssetId, StatusEntry>>,
    writers: RwLock<HashSet<AssetId>>,
    events: broadcast::Sender<StatusEvent>,
}

impl Default for StatusRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(RegistryInner {
                entries: RwLock::new(HashMap::new()),
                writers: RwLock::new(HashSet::new()),
                events,
            }),
        }
    }

    /// Takes the single write handle for `asset_id`. Released when the writer is dropped.
    pub fn claim(&self, asset_id: AssetId) -> Result<StatusWriter, RegistryError> {
        let mut writers = write_lock(&self.inner.writers);
        if !writers.insert(asset_id.clone()) {
            return Err(RegistryError::AlreadyClaimed(asset_id));
        }
        debug!(asset = %asset_id, "registry: writer claimed");
        Ok(StatusWriter {
            registry: self.clone(),
            asset_id,
        })
    }

    pub fn is_claimed(&self, asset_id: &AssetId) -> bool {
        read_lock(&self.inner.writers).contains(asset_id)
    }

    pub fn get_status(&self, asset_id: &AssetId) -> Option<LifecycleStatus> {
        self.entry(asset_id).map(|entry| entry.status)
    }

    pub fn entry(&self, asset_id: &AssetId) -> Option<StatusEntry> {
        read_lock(&self.inner.entries).get(asset_id).cloned()
    }

    /// All known entries, ordered by asset id.
    pub fn snapshot(&self) -> Vec<(AssetId, StatusEntry)> {
        let mut entries: Vec<_> = read_lock(&self.inner.entries)
            .iter()
            .map(|(asset_id, entry)| (asset_id.clone(), entry.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.inner.events.subscribe()
    }

    /// Events for one asset only. Lagged events are skipped.
    pub fn watch(&self, asset_id: AssetId) -> impl Stream<Item = StatusEvent> + Send + 'static {
        BroadcastStream::new(self.subscribe()).filter_map(move |event| {
            future::ready(match event {
                Ok(event) if event.asset_id == asset_id => Some(event),
                Ok(_) => None,
                Err(err) => {
                    warn!(asset = %asset_id, %err, "registry: watcher lagged");
                    None
                }
            })
        })
    }

    fn write(&self, asset_id: &AssetId, status: LifecycleStatus, progress: Option<f64>) {
        let entry = StatusEntry {
            status,
            progress,
            updated_at: Utc::now(),
        };
        write_lock(&self.inner.entries).insert(asset_id.clone(), entry.clone());
        self.publish(asset_id, entry);
    }

    fn write_progress(&self, asset_id: &AssetId, progress: Option<f64>) -> bool {
        let entry = {
            let mut entries = write_lock(&self.inner.entries);
            let Some(entry) = entries.get_mut(asset_id) else {
                return false;
            };
            if !entry.status.polls_progress() {
                return false;
            }
            entry.progress = progress;
            entry.updated_at = Utc::now();
            entry.clone()
        };
        self.publish(asset_id, entry);
        true
    }

    fn publish(&self, asset_id: &AssetId, entry: StatusEntry) {
        // No subscribers is fine.
        let _ = self.inner.events.send(StatusEvent {
            asset_id: asset_id.clone(),
            status: entry.status,
            progress: entry.progress,
            at: entry.updated_at,
        });
    }

    fn release(&self, asset_id: &AssetId) {
        write_lock(&self.inner.writers).remove(asset_id);
        debug!(asset = %asset_id, "registry: writer released");
    }
}

/// Exclusive write access to one asset's registry entry.
pub struct StatusWriter {
    registry: StatusRegistry,
    asset_id: AssetId,
}

impl StatusWriter {
    pub fn asset_id(&self) -> &AssetId {
        &self.asset_id
    }

    pub fn registry(&self) -> &StatusRegistry {
        &self.registry
    }

    /// Current status, `Idle` when nothing has been written yet.
    pub fn current(&self) -> LifecycleStatus {
        self.registry.get_status(&self.asset_id).unwrap_or_default()
    }

    pub fn set_status(&self, status: LifecycleStatus, progress: Option<f64>) {
        debug!(asset = %self.asset_id, %status, ?progress, "registry: status");
        self.registry.write(&self.asset_id, status, progress);
    }

    /// Updates progress under the current status. Ignored unless that status polls progress.
    pub fn set_progress(&self, progress: Option<f64>) -> bool {
        self.registry.write_progress(&self.asset_id, progress)
    }
}

impl Drop for StatusWriter {
    fn drop(&mut self) {
        self.registry.release(&self.asset_id);
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
