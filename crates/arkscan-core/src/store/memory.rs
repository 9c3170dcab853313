use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StorageError;

use super::{Storage, StoredState, WriteBatch};

/// In-process store. Contents are lost when the process exits.
///
/// A batch is applied under a single write guard, so it is trivially
/// all-or-nothing.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<StoredState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn commit(&self, batch: WriteBatch) -> Result<(), StorageError> {
        self.state.write().await.apply(batch);
        Ok(())
    }

    async fn load(&self) -> Result<StoredState, StorageError> {
        Ok(self.state.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Round, RoundId, VtxoId};

    #[tokio::test]
    async fn committed_batches_are_visible_on_load() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::default();
        batch.put_round(Round::pending(RoundId::from("r1")));
        store.commit(batch).await.unwrap();

        let state = store.load().await.unwrap();
        assert_eq!(state.rounds.len(), 1);
        assert!(state.rounds.contains_key(&RoundId::from("r1")));
    }

    #[tokio::test]
    async fn discard_removes_draft_vtxo() {
        let store = MemoryStore::new();
        let vtxo = crate::test_util::make_vtxo("r1", 0, "A", 100);

        let mut batch = WriteBatch::default();
        batch.put_vtxo(vtxo);
        store.commit(batch).await.unwrap();

        let mut batch = WriteBatch::default();
        batch.discard_vtxo(VtxoId::new("r1", 0));
        store.commit(batch).await.unwrap();

        assert!(store.load().await.unwrap().vtxos.is_empty());
    }
}
