//! Read-only query facade over the shared index.
//!
//! Every call takes the index read guard once, copies what it needs, and
//! releases it. Responses therefore reflect a single point in the event
//! order and never a round caught mid-finalization.

use std::sync::Arc;

use bitcoin::Txid;

use crate::error::QueryError;
use crate::index::{Index, SharedIndex};
use crate::types::{
    AddressBalance, IndexStats, Round, RoundState, RoundView, SpendStatus, VtxoList,
};

#[derive(Clone)]
pub struct QueryService {
    index: SharedIndex,
}

impl QueryService {
    pub fn new(index: SharedIndex) -> Self {
        Self { index }
    }

    /// Round committed on-chain as `txid`. Only finalized rounds have one.
    pub async fn get_round(&self, txid: &Txid) -> Result<RoundView, QueryError> {
        let index = self.index.read().await;
        let round = index
            .rounds
            .lookup_by_txid(txid)
            .ok_or_else(|| QueryError::RoundNotFound(txid.to_string()))?;
        Ok(round_view(&index, &round))
    }

    pub async fn get_round_by_id(&self, id: &str) -> Result<RoundView, QueryError> {
        let index = self.index.read().await;
        let round = index
            .rounds
            .lookup_by_id(id)
            .ok_or_else(|| QueryError::RoundNotFound(id.to_string()))?;
        Ok(round_view(&index, &round))
    }

    /// Never fails: an address without activity has two empty lists.
    pub async fn list_vtxos(&self, address: &str) -> VtxoList {
        self.index.read().await.vtxos.list_by_address(address)
    }

    /// Concatenated listing over several addresses, in the given order,
    /// from one snapshot.
    pub async fn list_vtxos_for(&self, addresses: &[String]) -> VtxoList {
        let index = self.index.read().await;
        addresses
            .iter()
            .fold(VtxoList::default(), |mut acc, address| {
                acc.append(index.vtxos.list_by_address(address));
                acc
            })
    }

    pub async fn balance(&self, address: &str) -> AddressBalance {
        self.index.read().await.vtxos.balance(address)
    }

    pub async fn stats(&self) -> IndexStats {
        let index = self.index.read().await;
        IndexStats {
            pending_rounds: index.rounds.count_in_state(RoundState::Pending),
            finalized_rounds: index.rounds.count_in_state(RoundState::Finalized),
            failed_rounds: index.rounds.count_in_state(RoundState::Failed),
            spendable_vtxos: index.vtxos.count_with_status(SpendStatus::Spendable),
            spent_vtxos: index.vtxos.count_with_status(SpendStatus::Spent),
            forfeited_vtxos: index.vtxos.count_with_status(SpendStatus::Forfeited),
            addresses: index.vtxos.address_count(),
            events_applied: index.events_applied(),
        }
    }
}

/// Resolve a round's published VTXOs. Pending and failed rounds expose none.
fn round_view(index: &Index, round: &Arc<Round>) -> RoundView {
    let vtxos = match round.state {
        RoundState::Finalized => round
            .vtxo_ids
            .iter()
            .filter_map(|id| index.vtxos.get(id))
            .map(|vtxo| vtxo.as_ref().clone())
            .collect(),
        RoundState::Pending | RoundState::Failed => Vec::new(),
    };
    RoundView {
        id: round.id.clone(),
        txid: round.txid,
        state: round.state,
        vtxos,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{Processor, ReplayPolicy};
    use crate::store::MemoryStore;
    use crate::test_util::*;

    async fn setup() -> (Processor, QueryService) {
        let index = Index::shared();
        let processor =
            Processor::new(Arc::new(MemoryStore::new()), index.clone(), ReplayPolicy::Ignore);
        (processor, QueryService::new(index))
    }

    #[tokio::test]
    async fn unknown_keys_are_not_found() {
        let (_, query) = setup().await;
        assert!(matches!(
            query.get_round(&txid_from_byte(9)).await,
            Err(QueryError::RoundNotFound(_))
        ));
        assert!(matches!(
            query.get_round_by_id("nope").await,
            Err(QueryError::RoundNotFound(_))
        ));
    }

    #[tokio::test]
    async fn pending_round_is_found_by_id_but_not_txid_and_hides_drafts() {
        let (p, query) = setup().await;
        p.process(opened("r1")).await.unwrap();
        p.process(created("r1", 0, "A", 100)).await.unwrap();

        let view = query.get_round_by_id("r1").await.expect("by id");
        assert_eq!(view.state, RoundState::Pending);
        assert!(view.txid.is_none());
        assert!(view.vtxos.is_empty());
    }

    #[tokio::test]
    async fn multi_address_listing_preserves_address_order() {
        let (p, query) = setup().await;
        for event in [
            opened("r1"),
            created("r1", 0, "A", 1),
            created("r1", 1, "B", 2),
            created("r1", 2, "A", 3),
            finalized("r1", 1),
            forfeited("r1", 0),
        ] {
            p.process(event).await.unwrap();
        }

        let list = query
            .list_vtxos_for(&["B".to_string(), "A".to_string(), "C".to_string()])
            .await;
        let vouts = |v: &[crate::types::Vtxo]| v.iter().map(|x| x.id.vout).collect::<Vec<_>>();
        assert_eq!(vouts(&list.spendable), vec![1, 2]);
        assert_eq!(vouts(&list.spent), vec![0]);
    }

    #[tokio::test]
    async fn stats_count_rounds_and_vtxos() {
        let (p, query) = setup().await;
        for event in [
            opened("r1"),
            created("r1", 0, "A", 1),
            created("r1", 1, "B", 2),
            finalized("r1", 1),
            spent("r1", 1, "r2"),
            opened("r2"),
            opened("r3"),
            failed("r3"),
        ] {
            p.process(event).await.unwrap();
        }

        let stats = query.stats().await;
        assert_eq!(stats.finalized_rounds, 1);
        assert_eq!(stats.pending_rounds, 1);
        assert_eq!(stats.failed_rounds, 1);
        assert_eq!(stats.spendable_vtxos, 1);
        assert_eq!(stats.spent_vtxos, 1);
        assert_eq!(stats.forfeited_vtxos, 0);
        assert_eq!(stats.addresses, 2);
        assert_eq!(stats.events_applied, 8);
    }
}
