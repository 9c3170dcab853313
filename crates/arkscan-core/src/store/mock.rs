use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::StorageError;

use super::{MemoryStore, Storage, StoredState, WriteBatch};

/// A [`MemoryStore`] that can be switched into an unavailable state, for
/// exercising the all-or-nothing path of the ingestion processor.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    unavailable: AtomicBool,
    commits: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of batches that actually reached the inner store.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Storage for FlakyStore {
    async fn commit(&self, batch: WriteBatch) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("flaky store is down".into()));
        }
        self.inner.commit(batch).await?;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self) -> Result<StoredState, StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("flaky store is down".into()));
        }
        self.inner.load().await
    }
}
