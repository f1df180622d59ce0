//! State repository
//!
//! The auditor persists a single self-signed blob per deployment. `put` is
//! last-writer-wins; `get` returns the last successful `put`, or `None`
//! before the first one. A single active auditor instance is assumed, so
//! concurrent writers are not supported.

use async_trait::async_trait;

use crate::error::Result;

mod file;
mod memory;

pub use file::FileStateRepository;
pub use memory::InMemoryStateRepository;

/// Durable storage for the auditor's state-and-signature blob.
#[async_trait]
pub trait StateRepository: Send + Sync {
    /// Fetch the last stored blob, or `None` if nothing has been stored.
    async fn get(&self) -> Result<Option<Vec<u8>>>;

    /// Store a blob, replacing any previous one.
    async fn put(&self, blob: &[u8]) -> Result<()>;
}

#[async_trait]
impl<T: StateRepository + ?Sized> StateRepository for std::sync::Arc<T> {
    async fn get(&self) -> Result<Option<Vec<u8>>> {
        (**self).get().await
    }

    async fn put(&self, blob: &[u8]) -> Result<()> {
        (**self).put(blob).await
    }
}
