//! Primary pointer
//!
//! The pointer is the only state shared between the health monitor (sole
//! writer) and the routing layer (readers). Every publication carries an
//! epoch that grows by one per publish, so a reader can tell a fresh value
//! from a stale or regressed one. There is no lock across the read/write
//! boundary: readers may observe a stale primary until the next read.

pub mod file;
pub mod memory;

pub use file::FilePointerStore;
pub use memory::MemoryPointerStore;

use crate::common::{timestamp_now, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One published primary designation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimarySnapshot {
    /// Name of the primary node
    pub node: String,
    /// Publication version; 0 for values written without one
    pub epoch: u64,
    /// RFC 3339 publication time
    #[serde(default)]
    pub updated_at: String,
}

/// Backing storage for the pointer.
///
/// `load` returns `Ok(None)` while nothing has been published yet.
#[async_trait]
pub trait PointerStore: Send + Sync {
    async fn load(&self) -> Result<Option<PrimarySnapshot>>;
    async fn store(&self, snapshot: &PrimarySnapshot) -> Result<()>;
}

/// Handle to the primary pointer, cloned into the monitor and the router.
#[derive(Clone)]
pub struct PrimaryPointer {
    store: Arc<dyn PointerStore>,
    last_epoch: Arc<AtomicU64>,
}

impl PrimaryPointer {
    pub fn new(store: Arc<dyn PointerStore>) -> Self {
        Self {
            store,
            last_epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// In-process pointer, mostly for tests and single-binary setups.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryPointerStore::new()))
    }

    /// Pointer persisted at `path`, visible across processes and restarts.
    pub fn file(path: impl Into<std::path::PathBuf>) -> Self {
        Self::new(Arc::new(FilePointerStore::new(path)))
    }

    /// Read the current publication.
    pub async fn read(&self) -> Result<Option<PrimarySnapshot>> {
        self.store.load().await
    }

    /// Publish `node` as primary under the next epoch.
    ///
    /// The epoch continues from whatever is already stored, so restarting the
    /// monitor never reuses an epoch. If the stored value cannot be read, the
    /// handle's own last epoch is used instead.
    pub async fn publish(&self, node: &str) -> Result<PrimarySnapshot> {
        let stored = match self.store.load().await {
            Ok(snapshot) => snapshot.map(|s| s.epoch).unwrap_or(0),
            Err(e) => {
                tracing::warn!("Could not read primary pointer before publish: {}", e);
                0
            }
        };
        let epoch = stored.max(self.last_epoch.load(Ordering::SeqCst)) + 1;

        let snapshot = PrimarySnapshot {
            node: node.to_string(),
            epoch,
            updated_at: timestamp_now(),
        };
        self.store.store(&snapshot).await?;
        self.last_epoch.fetch_max(epoch, Ordering::SeqCst);

        tracing::info!(node = %node, epoch, "Active primary updated");
        Ok(snapshot)
    }
}
