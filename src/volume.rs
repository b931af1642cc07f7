//! Shared volume values and their persistence.
//!
//! A [`Volume`] is a named 0-100 level that may be shared by several
//! scenarios (e.g. every media-class scenario referencing one "media"
//! volume). "Same volume" means *same object*, not same value - two
//! distinct volumes that both happen to read 80 are different volumes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Highest programmable level.
pub const MAX_LEVEL: u8 = 100;

/// A named, shared volume level in 0-100.
///
/// Cloning a `Volume` clones a handle to the same underlying level;
/// use [`same_object`](Volume::same_object) to test sharing.
#[derive(Debug, Clone)]
pub struct Volume {
    inner: Arc<VolumeInner>,
}

#[derive(Debug)]
struct VolumeInner {
    name: String,
    level: AtomicU8,
}

impl Volume {
    /// Creates a volume with the given name and initial level (clamped to 100).
    pub fn new(name: impl Into<String>, level: u8) -> Self {
        Self {
            inner: Arc::new(VolumeInner {
                name: name.into(),
                level: AtomicU8::new(level.min(MAX_LEVEL)),
            }),
        }
    }

    /// The volume's name, used as its persistence key.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current level.
    pub fn level(&self) -> u8 {
        self.inner.level.load(Ordering::SeqCst)
    }

    /// Sets the level (clamped to 100).
    ///
    /// Returns `true` if the stored level actually changed.
    pub fn set_level(&self, level: u8) -> bool {
        let level = level.min(MAX_LEVEL);
        self.inner.level.swap(level, Ordering::SeqCst) != level
    }

    /// Returns `true` if `other` is a handle to the same underlying volume.
    pub fn same_object(&self, other: &Volume) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// On-disk shape of the preference file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredLevels {
    levels: HashMap<String, u8>,
}

/// Debounced persistence for volume preferences.
///
/// Changes are recorded immediately in memory but written to disk only
/// after [`EngineConfig::store_debounce`](crate::EngineConfig::store_debounce)
/// of quiet, so a held volume key coalesces into a single write.
pub struct VolumeStore {
    path: Option<PathBuf>,
    debounce: Duration,
    levels: Arc<Mutex<HashMap<String, u8>>>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl VolumeStore {
    /// Opens the store, reading any existing preference file.
    ///
    /// A missing or unreadable file is not an error: the store starts
    /// empty and will overwrite it on the next flush.
    pub fn open(path: Option<PathBuf>, debounce: Duration) -> Self {
        let levels = match &path {
            Some(p) => match std::fs::read(p) {
                Ok(raw) => match serde_json::from_slice::<StoredLevels>(&raw) {
                    Ok(stored) => stored.levels,
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "corrupt volume store, starting empty");
                        HashMap::new()
                    }
                },
                Err(_) => HashMap::new(),
            },
            None => HashMap::new(),
        };

        Self {
            path,
            debounce,
            levels: Arc::new(Mutex::new(levels)),
            pending: Mutex::new(None),
        }
    }

    /// Returns the persisted level for `name`, if any.
    pub fn restore(&self, name: &str) -> Option<u8> {
        self.levels.lock().get(name).copied()
    }

    /// Records a level change and (re)schedules the debounced write.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule_store(&self, name: &str, level: u8) {
        self.levels.lock().insert(name.to_string(), level);

        let Some(path) = self.path.clone() else {
            return;
        };

        let mut pending = self.pending.lock();
        if let Some(task) = pending.take() {
            task.abort();
        }

        let levels = self.levels.clone();
        let debounce = self.debounce;
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            write_levels(&path, &levels.lock());
        }));
    }

    /// Writes any recorded changes out immediately.
    ///
    /// Called on shutdown so a pending debounce is not lost.
    pub fn flush(&self) {
        if let Some(task) = self.pending.lock().take() {
            task.abort();
        }
        if let Some(path) = &self.path {
            write_levels(path, &self.levels.lock());
        }
    }
}

fn write_levels(path: &PathBuf, levels: &HashMap<String, u8>) {
    let stored = StoredLevels {
        levels: levels.clone(),
    };
    match serde_json::to_vec_pretty(&stored) {
        Ok(raw) => {
            if let Err(e) = std::fs::write(path, raw) {
                warn!(path = %path.display(), error = %e, "failed to persist volumes");
            } else {
                debug!(path = %path.display(), count = levels.len(), "volumes persisted");
            }
        }
        Err(e) => warn!(error = %e, "failed to serialize volume store"),
    }
}
