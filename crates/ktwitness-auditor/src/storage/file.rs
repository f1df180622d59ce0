//! File-backed state repository

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{error, info};

use crate::error::Result;
use crate::storage::StateRepository;

/// A state repository backed by a single file at a configured path.
#[derive(Debug, Clone)]
pub struct FileStateRepository {
    path: PathBuf,
}

impl FileStateRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl StateRepository for FileStateRepository {
    async fn get(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "auditor state not found");
                Ok(None)
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "failed to read auditor state");
                Err(e.into())
            }
        }
    }

    async fn put(&self, blob: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, blob).await.map_err(|e| {
            error!(path = %self.path.display(), error = %e, "failed to write auditor state");
            e.into()
        })
    }
}
