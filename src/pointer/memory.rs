use super::{PointerStore, PrimarySnapshot};
use crate::common::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Pointer held in process memory.
#[derive(Default)]
pub struct MemoryPointerStore {
    current: RwLock<Option<PrimarySnapshot>>,
}

impl MemoryPointerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PointerStore for MemoryPointerStore {
    async fn load(&self) -> Result<Option<PrimarySnapshot>> {
        Ok(self.current.read().await.clone())
    }

    async fn store(&self, snapshot: &PrimarySnapshot) -> Result<()> {
        *self.current.write().await = Some(snapshot.clone());
        Ok(())
    }
}
