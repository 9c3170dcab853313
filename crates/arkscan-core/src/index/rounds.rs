use std::collections::HashMap;
use std::sync::Arc;

use bitcoin::Txid;

use crate::types::{Round, RoundId, RoundState};

/// Dual-key lookup over round records.
///
/// Both maps point at the same `Arc<Round>`; [`RoundIndex::upsert`] replaces
/// the pointer in both at once so the two paths never disagree.
#[derive(Default)]
pub struct RoundIndex {
    by_id: HashMap<RoundId, Arc<Round>>,
    /// Populated for finalized rounds only.
    by_txid: HashMap<Txid, Arc<Round>>,
}

impl RoundIndex {
    pub fn lookup_by_id(&self, id: &str) -> Option<Arc<Round>> {
        self.by_id.get(id).cloned()
    }

    pub fn lookup_by_txid(&self, txid: &Txid) -> Option<Arc<Round>> {
        self.by_txid.get(txid).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Number of rounds currently in `state`.
    pub fn count_in_state(&self, state: RoundState) -> usize {
        self.by_id.values().filter(|r| r.state == state).count()
    }

    pub(crate) fn upsert(&mut self, round: Round) {
        let round = Arc::new(round);
        if let (RoundState::Finalized, Some(txid)) = (round.state, round.txid) {
            self.by_txid.insert(txid, Arc::clone(&round));
        }
        self.by_id.insert(round.id.clone(), round);
    }
}
