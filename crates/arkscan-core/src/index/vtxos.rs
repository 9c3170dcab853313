use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bitcoin::Amount;

use crate::types::{AddressBalance, SpendStatus, Vtxo, VtxoId, VtxoList};

/// The two partitions of one address, keyed by ingestion sequence so that
/// iteration yields creation order.
#[derive(Default)]
struct AddressVtxos {
    spendable: BTreeMap<u64, VtxoId>,
    spent: BTreeMap<u64, VtxoId>,
}

/// Published VTXOs, by id and by owning address.
///
/// Only VTXOs of finalized rounds are ever inserted here; drafts stay with
/// the ingestion processor until their round finalizes.
#[derive(Default)]
pub struct VtxoIndex {
    vtxos: HashMap<VtxoId, Arc<Vtxo>>,
    by_address: HashMap<String, AddressVtxos>,
}

impl VtxoIndex {
    pub fn get(&self, id: &VtxoId) -> Option<Arc<Vtxo>> {
        self.vtxos.get(id).cloned()
    }

    /// Spendable and spent/forfeited VTXOs of `address`, each in creation
    /// order. An unknown address yields two empty lists.
    pub fn list_by_address(&self, address: &str) -> VtxoList {
        let Some(entry) = self.by_address.get(address) else {
            return VtxoList::default();
        };
        VtxoList {
            spendable: self.resolve(entry.spendable.values()),
            spent: self.resolve(entry.spent.values()),
        }
    }

    pub fn balance(&self, address: &str) -> AddressBalance {
        let list = self.list_by_address(address);
        let mut balance = AddressBalance {
            spendable_count: list.spendable.len(),
            spent_count: list.spent.len(),
            ..Default::default()
        };
        for vtxo in &list.spendable {
            balance.spendable = saturating_add(balance.spendable, vtxo.amount);
        }
        for vtxo in &list.spent {
            let total = match vtxo.status {
                SpendStatus::Forfeited => &mut balance.forfeited,
                _ => &mut balance.spent,
            };
            *total = saturating_add(*total, vtxo.amount);
        }
        balance
    }

    pub fn len(&self) -> usize {
        self.vtxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vtxos.is_empty()
    }

    pub fn address_count(&self) -> usize {
        self.by_address.len()
    }

    pub fn count_with_status(&self, status: SpendStatus) -> usize {
        self.vtxos.values().filter(|v| v.status == status).count()
    }

    /// Insert or replace a VTXO, moving it to the partition matching its
    /// current status.
    pub(crate) fn upsert(&mut self, vtxo: Vtxo) {
        let entry = self.by_address.entry(vtxo.address.clone()).or_default();
        if vtxo.status.is_spendable() {
            entry.spent.remove(&vtxo.sequence);
            entry.spendable.insert(vtxo.sequence, vtxo.id.clone());
        } else {
            entry.spendable.remove(&vtxo.sequence);
            entry.spent.insert(vtxo.sequence, vtxo.id.clone());
        }
        self.vtxos.insert(vtxo.id.clone(), Arc::new(vtxo));
    }

    fn resolve<'a>(&self, ids: impl Iterator<Item = &'a VtxoId>) -> Vec<Vtxo> {
        ids.filter_map(|id| self.vtxos.get(id))
            .map(|vtxo| vtxo.as_ref().clone())
            .collect()
    }
}

/// Totals clamp at [`Amount::MAX`] instead of wrapping.
fn saturating_add(a: Amount, b: Amount) -> Amount {
    a.checked_add(b).unwrap_or(Amount::MAX)
}
