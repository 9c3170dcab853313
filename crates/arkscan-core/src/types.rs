//! Domain types for the round/VTXO model.
//!
//! Contains the persisted records (`Round`, `Vtxo`), their identifiers, the
//! closed state enums with their transition tables, and the read-side views
//! handed out by the query service.

use std::str::FromStr;

use bitcoin::{Amount, Txid};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ==============================================================================
// Identifiers
// ==============================================================================

/// Process-unique round identifier assigned by the upstream engine.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundId(pub String);

impl From<&str> for RoundId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RoundId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::borrow::Borrow<str> for RoundId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoundId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A VTXO is identified by its creating round and output index, rendered
/// as `<round_id>:<vout>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VtxoId {
    pub round_id: RoundId,
    pub vout: u32,
}

impl VtxoId {
    pub fn new(round_id: impl Into<RoundId>, vout: u32) -> Self {
        Self {
            round_id: round_id.into(),
            vout,
        }
    }
}

impl std::fmt::Display for VtxoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.round_id, self.vout)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid vtxo id `{0}`, expected <round_id>:<vout>")]
pub struct ParseVtxoIdError(String);

impl FromStr for VtxoId {
    type Err = ParseVtxoIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Round ids are opaque and may themselves contain ':'.
        let (round_id, vout) = s
            .rsplit_once(':')
            .ok_or_else(|| ParseVtxoIdError(s.to_string()))?;
        if round_id.is_empty() {
            return Err(ParseVtxoIdError(s.to_string()));
        }
        let vout = vout
            .parse::<u32>()
            .map_err(|_| ParseVtxoIdError(s.to_string()))?;
        Ok(Self::new(round_id, vout))
    }
}

impl Serialize for VtxoId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VtxoId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ==============================================================================
// Round Lifecycle
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundState {
    Pending,
    Finalized,
    Failed,
}

/// Inputs of the round state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundTransition {
    Finalize,
    Fail,
}

impl RoundState {
    /// Transition table. Terminal states accept nothing.
    pub fn next(self, transition: RoundTransition) -> Option<RoundState> {
        match (self, transition) {
            (Self::Pending, RoundTransition::Finalize) => Some(Self::Finalized),
            (Self::Pending, RoundTransition::Fail) => Some(Self::Failed),
            (Self::Finalized | Self::Failed, _) => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for RoundState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Finalized => write!(f, "finalized"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A batched settlement cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    /// On-chain transaction id; `None` until the round is finalized.
    pub txid: Option<Txid>,
    pub state: RoundState,
    /// VTXOs created by this round, in creation order.
    pub vtxo_ids: Vec<VtxoId>,
}

impl Round {
    pub fn pending(id: RoundId) -> Self {
        Self {
            id,
            txid: None,
            state: RoundState::Pending,
            vtxo_ids: Vec::new(),
        }
    }
}

// ==============================================================================
// VTXO Lifecycle
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendStatus {
    Spendable,
    Spent,
    Forfeited,
}

/// Inputs of the VTXO spend-status state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendTransition {
    Spend,
    Forfeit,
}

impl SpendStatus {
    pub fn next(self, transition: SpendTransition) -> Option<SpendStatus> {
        match (self, transition) {
            (Self::Spendable, SpendTransition::Spend) => Some(Self::Spent),
            (Self::Spendable, SpendTransition::Forfeit) => Some(Self::Forfeited),
            (Self::Spent | Self::Forfeited, _) => None,
        }
    }

    pub fn is_spendable(self) -> bool {
        matches!(self, Self::Spendable)
    }
}

impl std::fmt::Display for SpendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spendable => write!(f, "spendable"),
            Self::Spent => write!(f, "spent"),
            Self::Forfeited => write!(f, "forfeited"),
        }
    }
}

/// A claimable off-chain output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vtxo {
    pub id: VtxoId,
    pub address: String,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub amount: Amount,
    pub round_id: RoundId,
    pub status: SpendStatus,
    /// Round that consumed this VTXO. Only set for `Spent`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spending_round_id: Option<RoundId>,
    /// Ingestion ordinal; listings are ordered by it.
    pub sequence: u64,
}

impl Vtxo {
    /// Same output as `other`, ignoring lifecycle fields.
    pub fn same_payload(&self, other: &Vtxo) -> bool {
        self.id == other.id && self.address == other.address && self.amount == other.amount
    }
}

// ==============================================================================
// Read-side Views
// ==============================================================================

/// A round as returned by the query service.
///
/// `vtxos` holds the published records of a finalized round and is empty
/// for pending and failed rounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundView {
    pub id: RoundId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txid: Option<Txid>,
    pub state: RoundState,
    pub vtxos: Vec<Vtxo>,
}

/// Per-address partition of visible VTXOs. `spent` also holds forfeited ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VtxoList {
    pub spendable: Vec<Vtxo>,
    pub spent: Vec<Vtxo>,
}

impl VtxoList {
    pub fn append(&mut self, mut other: VtxoList) {
        self.spendable.append(&mut other.spendable);
        self.spent.append(&mut other.spent);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBalance {
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub spendable: Amount,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub spent: Amount,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub forfeited: Amount,
    pub spendable_count: usize,
    pub spent_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub pending_rounds: usize,
    pub finalized_rounds: usize,
    pub failed_rounds: usize,
    pub spendable_vtxos: usize,
    pub spent_vtxos: usize,
    pub forfeited_vtxos: usize,
    pub addresses: usize,
    pub events_applied: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_state_transition_table() {
        use RoundState::*;
        use RoundTransition::*;
        assert_eq!(Pending.next(Finalize), Some(Finalized));
        assert_eq!(Pending.next(Fail), Some(Failed));
        for terminal in [Finalized, Failed] {
            assert!(terminal.is_terminal());
            assert_eq!(terminal.next(Finalize), None);
            assert_eq!(terminal.next(Fail), None);
        }
    }

    #[test]
    fn spend_status_transition_table() {
        use SpendStatus::*;
        use SpendTransition::*;
        assert_eq!(Spendable.next(Spend), Some(Spent));
        assert_eq!(Spendable.next(Forfeit), Some(Forfeited));
        assert_eq!(Spent.next(Spend), None);
        assert_eq!(Spent.next(Forfeit), None);
        assert_eq!(Forfeited.next(Spend), None);
    }

    #[test]
    fn vtxo_id_parses_round_ids_containing_colons() {
        let id: VtxoId = "round:7:3".parse().expect("valid vtxo id");
        assert_eq!(id.round_id, RoundId::from("round:7"));
        assert_eq!(id.vout, 3);
        assert_eq!(id.to_string(), "round:7:3");
    }

    #[test]
    fn vtxo_id_rejects_missing_vout() {
        assert!("r1".parse::<VtxoId>().is_err());
        assert!("r1:x".parse::<VtxoId>().is_err());
        assert!(":0".parse::<VtxoId>().is_err());
    }

    #[test]
    fn vtxo_id_serializes_as_string() {
        let json = serde_json::to_string(&VtxoId::new("r1", 0)).expect("serialize");
        assert_eq!(json, "\"r1:0\"");
        let back: VtxoId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, VtxoId::new("r1", 0));
    }
}
