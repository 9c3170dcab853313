//! Record storage abstraction.
//!
//! Defines the [`Storage`] trait the ingestion processor commits through,
//! the [`WriteBatch`] unit of atomic writes, and two implementations: an
//! in-process [`MemoryStore`] and an append-only [`JsonlStore`] log.

mod jsonl;
mod memory;
#[cfg(test)]
pub mod mock;

pub use jsonl::JsonlStore;
pub use memory::MemoryStore;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::types::{Round, RoundId, Vtxo, VtxoId};

// ==============================================================================
// Write Batches
// ==============================================================================

/// A single record mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteOp {
    PutRound(Round),
    PutVtxo(Vtxo),
    /// Drop a draft VTXO of a failed round. Published VTXOs are never
    /// discarded.
    DiscardVtxo { id: VtxoId },
}

/// Every record touched by one lifecycle event. Implementations must apply
/// a batch all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteBatch {
    pub ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn put_round(&mut self, round: Round) {
        self.ops.push(WriteOp::PutRound(round));
    }

    pub fn put_vtxo(&mut self, vtxo: Vtxo) {
        self.ops.push(WriteOp::PutVtxo(vtxo));
    }

    pub fn discard_vtxo(&mut self, id: VtxoId) {
        self.ops.push(WriteOp::DiscardVtxo { id });
    }
}

// ==============================================================================
// Stored State
// ==============================================================================

/// Full content of a store, as returned by [`Storage::load`].
///
/// VTXOs of pending rounds are drafts; the processor decides visibility from
/// the creating round's state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredState {
    pub rounds: HashMap<RoundId, Round>,
    pub vtxos: HashMap<VtxoId, Vtxo>,
}

impl StoredState {
    pub fn apply(&mut self, batch: WriteBatch) {
        for op in batch.ops {
            match op {
                WriteOp::PutRound(round) => {
                    self.rounds.insert(round.id.clone(), round);
                }
                WriteOp::PutVtxo(vtxo) => {
                    self.vtxos.insert(vtxo.id.clone(), vtxo);
                }
                WriteOp::DiscardVtxo { id } => {
                    self.vtxos.remove(&id);
                }
            }
        }
    }
}

// ==============================================================================
// Storage Trait
// ==============================================================================

/// Key-indexed store for round and VTXO records.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Durably apply every op in `batch`, or none of them.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StorageError>;

    /// Load every persisted record, for rebuilding the indices at startup.
    async fn load(&self) -> Result<StoredState, StorageError>;
}
