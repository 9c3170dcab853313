use bitcoin::{Amount, Txid};

use crate::types::{RoundId, RoundState, SpendStatus, VtxoId};

/// Failures of the underlying record store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt storage log at line {line}: {message}")]
    Corrupt { line: usize, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Rejections raised while applying a single lifecycle event.
///
/// None of these leave a partial update behind: the event is either fully
/// reflected in storage and the indices, or not at all.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("round already exists: {0}")]
    DuplicateRound(RoundId),

    #[error("txid {txid} already assigned to finalized round {holder}")]
    DuplicateTxid { txid: Txid, holder: RoundId },

    #[error("round {round_id} is {state}, expected {expected}")]
    InvalidRoundState {
        round_id: RoundId,
        state: RoundState,
        expected: RoundState,
    },

    #[error("vtxo {vtxo_id} is {status}, expected spendable")]
    InvalidVtxoState { vtxo_id: VtxoId, status: SpendStatus },

    #[error("vtxo already exists: {0}")]
    DuplicateVtxo(VtxoId),

    #[error("vtxo {0} already exists with a different payload")]
    ConflictingVtxo(VtxoId),

    #[error("vtxo {vtxo_id} amount {amount} exceeds the bitcoin money supply")]
    AmountOutOfRange { vtxo_id: VtxoId, amount: Amount },

    #[error("unknown round: {0}")]
    UnknownRound(RoundId),

    #[error("unknown vtxo: {0}")]
    UnknownVtxo(VtxoId),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl IngestError {
    /// Uniqueness violations. These are what a replayed event produces when
    /// replays are configured to be rejected instead of ignored.
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            Self::DuplicateRound(_) | Self::DuplicateTxid { .. } | Self::DuplicateVtxo(_)
        )
    }
}

/// Query-side failures.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("round not found: {0}")]
    RoundNotFound(String),
}

/// Failures reading the upstream JSONL event feed.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("event parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
