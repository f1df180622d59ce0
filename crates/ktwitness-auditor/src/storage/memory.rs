//! In-memory state repository

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::storage::StateRepository;

/// A single-slot repository for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct InMemoryStateRepository {
    blob: Mutex<Option<Vec<u8>>>,
}

impl InMemoryStateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateRepository for InMemoryStateRepository {
    async fn get(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.blob.lock().await.clone())
    }

    async fn put(&self, blob: &[u8]) -> Result<()> {
        *self.blob.lock().await = Some(blob.to_vec());
        Ok(())
    }
}
