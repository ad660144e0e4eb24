//! File-backed pointer store
//!
//! The pointer is a small JSON document. Writes go to a sibling temp file that
//! is then renamed over the target, so readers never see a torn value. A file
//! holding only a bare node name is accepted and read as epoch 0.

use super::{PointerStore, PrimarySnapshot};
use crate::common::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub struct FilePointerStore {
    path: PathBuf,
}

impl FilePointerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "active_primary".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn parse_snapshot(content: &str) -> Option<PrimarySnapshot> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<PrimarySnapshot>(trimmed) {
        Ok(snapshot) => Some(snapshot),
        Err(_) => Some(PrimarySnapshot {
            node: trimmed.to_string(),
            epoch: 0,
            updated_at: String::new(),
        }),
    }
}

#[async_trait]
impl PointerStore for FilePointerStore {
    async fn load(&self) -> Result<Option<PrimarySnapshot>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(parse_snapshot(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Pointer(format!(
                "failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn store(&self, snapshot: &PrimarySnapshot) -> Result<()> {
        let body = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.temp_path();

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            Error::Pointer(format!("failed to publish {}: {}", self.path.display(), e))
        })?;
        Ok(())
    }
}
