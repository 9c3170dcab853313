//! Shared test helpers for `arkscan-core` unit tests.
//!
//! Builders for lifecycle events and records so tests across modules share
//! one source of truth for dummy data.

use std::path::PathBuf;

use bitcoin::hashes::Hash;
use bitcoin::{Amount, Txid};

use crate::ingest::Event;
use crate::types::{RoundId, SpendStatus, Vtxo, VtxoId};

// ==============================================================================
// Txid / Path Helpers
// ==============================================================================

/// Create a deterministic `Txid` from a single distinguishing byte.
pub fn txid_from_byte(b: u8) -> Txid {
    let mut bytes = [0u8; 32];
    bytes[0] = b;
    Txid::from_byte_array(bytes)
}

/// A fresh path under the system temp dir, unique per process and call.
pub fn unique_temp_path(prefix: &str) -> PathBuf {
    let unique = format!(
        "arkscan-{prefix}-{}-{}.jsonl",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos()
    );
    std::env::temp_dir().join(unique)
}

// ==============================================================================
// Record Builders
// ==============================================================================

/// A spendable VTXO with sequence 0. Override fields after construction.
pub fn make_vtxo(round_id: &str, vout: u32, address: &str, sats: u64) -> Vtxo {
    Vtxo {
        id: VtxoId::new(round_id, vout),
        address: address.to_string(),
        amount: Amount::from_sat(sats),
        round_id: RoundId::from(round_id),
        status: SpendStatus::Spendable,
        spending_round_id: None,
        sequence: 0,
    }
}

// ==============================================================================
// Event Builders
// ==============================================================================

pub fn opened(round_id: &str) -> Event {
    Event::RoundOpened {
        round_id: round_id.into(),
    }
}

pub fn created(round_id: &str, vout: u32, address: &str, sats: u64) -> Event {
    Event::VtxoCreated {
        round_id: round_id.into(),
        vout,
        address: address.to_string(),
        amount: Amount::from_sat(sats),
    }
}

/// Finalize `round_id` with the txid built from `txid_byte`.
pub fn finalized(round_id: &str, txid_byte: u8) -> Event {
    Event::RoundFinalized {
        round_id: round_id.into(),
        txid: txid_from_byte(txid_byte),
    }
}

pub fn failed(round_id: &str) -> Event {
    Event::RoundFailed {
        round_id: round_id.into(),
    }
}

pub fn spent(round_id: &str, vout: u32, spending_round_id: &str) -> Event {
    Event::VtxoSpent {
        vtxo_id: VtxoId::new(round_id, vout),
        spending_round_id: spending_round_id.into(),
    }
}

pub fn forfeited(round_id: &str, vout: u32) -> Event {
    Event::VtxoForfeited {
        vtxo_id: VtxoId::new(round_id, vout),
    }
}
