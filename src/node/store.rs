//! Ledger storage backends for a node
//!
//! Supports in-memory and (with the `sled-backend` feature) sled storage.
//! Records are appended unconditionally: no validation, no deduplication.

use crate::common::{Error, Result, TransactionRecord};
use std::sync::{Arc, Mutex};

/// Trait for ledger storage backends
pub trait LedgerStore: Send + Sync {
    fn append(&self, record: &TransactionRecord) -> Result<()>;
    /// All records, in storage order
    fn list(&self) -> Result<Vec<TransactionRecord>>;
    fn len(&self) -> Result<usize>;
}

/// In-memory ledger (default)
#[derive(Default)]
pub struct MemLedger {
    records: Mutex<Vec<TransactionRecord>>,
}

impl MemLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<TransactionRecord>>> {
        self.records
            .lock()
            .map_err(|_| Error::Storage("ledger lock poisoned".into()))
    }
}

impl LedgerStore for MemLedger {
    fn append(&self, record: &TransactionRecord) -> Result<()> {
        self.lock()?.push(record.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<TransactionRecord>> {
        Ok(self.lock()?.clone())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }
}

/// sled ledger; keys are sled-generated ids so iteration follows insertion
#[cfg(feature = "sled-backend")]
pub struct SledLedger {
    db: sled::Db,
}

#[cfg(feature = "sled-backend")]
impl SledLedger {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }
}

#[cfg(feature = "sled-backend")]
impl LedgerStore for SledLedger {
    fn append(&self, record: &TransactionRecord) -> Result<()> {
        let id = self.db.generate_id()?;
        let value = serde_json::to_vec(record)?;
        self.db.insert(id.to_be_bytes(), value)?;
        self.db.flush()?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<TransactionRecord>> {
        self.db
            .iter()
            .values()
            .map(|v| -> Result<TransactionRecord> {
                let bytes = v?;
                Ok(serde_json::from_slice(&bytes)?)
            })
            .collect()
    }

    fn len(&self) -> Result<usize> {
        Ok(self.db.len())
    }
}

/// Ledger handle shared by a node's request handlers
#[derive(Clone)]
pub struct Ledger {
    backend: Arc<dyn LedgerStore>,
}

impl Ledger {
    pub fn new_memory() -> Self {
        Self {
            backend: Arc::new(MemLedger::new()),
        }
    }

    #[cfg(feature = "sled-backend")]
    pub fn new_sled(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Ok(Self {
            backend: Arc::new(SledLedger::open(path)?),
        })
    }

    /// Open the configured backend: sled when a data path is given and the
    /// feature is enabled, memory otherwise.
    pub fn open(data_path: Option<&std::path::Path>) -> Result<Self> {
        match data_path {
            #[cfg(feature = "sled-backend")]
            Some(path) => Self::new_sled(path),
            #[cfg(not(feature = "sled-backend"))]
            Some(path) => Err(Error::InvalidConfig(format!(
                "data path {} requires the sled-backend feature",
                path.display()
            ))),
            None => Ok(Self::new_memory()),
        }
    }

    pub fn append(&self, record: &TransactionRecord) -> Result<()> {
        self.backend.append(record)
    }

    pub fn list(&self) -> Result<Vec<TransactionRecord>> {
        self.backend.list()
    }

    pub fn len(&self) -> Result<usize> {
        self.backend.len()
    }
}
