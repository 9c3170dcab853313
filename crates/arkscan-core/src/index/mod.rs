//! Read-optimized views over round and VTXO records.
//!
//! Both indices live inside one [`Index`] behind a single `RwLock`. The
//! ingestion processor is the only writer; it precomputes an
//! [`IndexUpdate`] per event and applies it under one write guard, so a
//! reader holding the read guard sees either all of an event or none of it.

mod rounds;
mod vtxos;

pub use rounds::RoundIndex;
pub use vtxos::VtxoIndex;

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::types::{Round, Vtxo};

pub type SharedIndex = Arc<RwLock<Index>>;

#[derive(Default)]
pub struct Index {
    pub rounds: RoundIndex,
    pub vtxos: VtxoIndex,
    events_applied: u64,
}

impl Index {
    pub fn shared() -> SharedIndex {
        Arc::new(RwLock::new(Self::default()))
    }

    pub fn events_applied(&self) -> u64 {
        self.events_applied
    }

    pub(crate) fn apply(&mut self, update: IndexUpdate) {
        for round in update.rounds {
            self.rounds.upsert(round);
        }
        for vtxo in update.vtxos {
            self.vtxos.upsert(vtxo);
        }
        self.events_applied += 1;
    }
}

/// Fully precomputed index effect of one event.
#[derive(Debug, Default)]
pub(crate) struct IndexUpdate {
    pub rounds: Vec<Round>,
    /// Published VTXOs only. Drafts never reach the index.
    pub vtxos: Vec<Vtxo>,
}
