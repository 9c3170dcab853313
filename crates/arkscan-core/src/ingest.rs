use std::collections::HashMap;
use std::sync::Arc;

use bitcoin::{Amount, Txid};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{IngestError, StorageError};
use crate::index::{Index, IndexUpdate, SharedIndex};
use crate::store::{Storage, WriteBatch};
use crate::types::{
    Round, RoundId, RoundState, RoundTransition, SpendStatus, SpendTransition, Vtxo, VtxoId,
};

// ==============================================================================
// Lifecycle Events
// ==============================================================================

/// A lifecycle event emitted by the upstream settlement engine.
///
/// Events carry no sequence number; a replay is recognised by comparing its
/// content with the state it would produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    RoundOpened {
        round_id: RoundId,
    },
    VtxoCreated {
        round_id: RoundId,
        vout: u32,
        address: String,
        #[serde(with = "bitcoin::amount::serde::as_sat")]
        amount: Amount,
    },
    RoundFinalized {
        round_id: RoundId,
        txid: Txid,
    },
    RoundFailed {
        round_id: RoundId,
    },
    VtxoSpent {
        vtxo_id: VtxoId,
        spending_round_id: RoundId,
    },
    VtxoForfeited {
        vtxo_id: VtxoId,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RoundOpened { .. } => "round_opened",
            Self::VtxoCreated { .. } => "vtxo_created",
            Self::RoundFinalized { .. } => "round_finalized",
            Self::RoundFailed { .. } => "round_failed",
            Self::VtxoSpent { .. } => "vtxo_spent",
            Self::VtxoForfeited { .. } => "vtxo_forfeited",
        }
    }
}

/// Result of processing one event that was not rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// The event's effect was already in place; nothing changed.
    Replayed,
}

/// What to do with an event whose effect is already fully applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReplayPolicy {
    /// Log a duplicate notice and report [`Outcome::Replayed`].
    #[default]
    Ignore,
    /// Surface the uniqueness/state error the replay would trigger.
    Reject,
}

// ==============================================================================
// Planning
// ==============================================================================

enum DraftChange {
    None,
    Add(Vtxo),
    /// Remove every draft of the round (published or discarded).
    Take(RoundId),
}

/// Everything one event will change, computed before anything is touched.
struct Plan {
    batch: WriteBatch,
    update: IndexUpdate,
    drafts: DraftChange,
    consumes_sequence: bool,
}

impl Plan {
    fn new() -> Self {
        Self {
            batch: WriteBatch::default(),
            update: IndexUpdate::default(),
            drafts: DraftChange::None,
            consumes_sequence: false,
        }
    }

    fn put_round(&mut self, round: Round) {
        self.batch.put_round(round.clone());
        self.update.rounds.push(round);
    }

    fn put_vtxo(&mut self, vtxo: Vtxo) {
        self.batch.put_vtxo(vtxo.clone());
        self.update.vtxos.push(vtxo);
    }
}

enum Planned {
    Apply(Plan),
    /// Already applied. Carries the error a strict replay policy reports.
    Replay(IngestError),
}

/// State only the writer touches: unpublished drafts per pending round and
/// the next ingestion ordinal.
#[derive(Default)]
struct WriterState {
    drafts: HashMap<RoundId, Vec<Vtxo>>,
    next_sequence: u64,
}

// ==============================================================================
// Processor
// ==============================================================================

/// Sole writer of round and VTXO state.
///
/// Each event is validated against the current index, committed to storage
/// as one [`WriteBatch`], and only then applied to the shared index in a
/// single write region. A storage failure leaves both the store and the
/// index untouched.
pub struct Processor {
    storage: Arc<dyn Storage>,
    index: SharedIndex,
    policy: ReplayPolicy,
    writer: Mutex<WriterState>,
}

impl Processor {
    /// A processor over an empty store.
    pub fn new(storage: Arc<dyn Storage>, index: SharedIndex, policy: ReplayPolicy) -> Self {
        Self {
            storage,
            index,
            policy,
            writer: Mutex::new(WriterState::default()),
        }
    }

    /// Rebuild the index and pending drafts from whatever `storage` holds.
    pub async fn recover(
        storage: Arc<dyn Storage>,
        index: SharedIndex,
        policy: ReplayPolicy,
    ) -> Result<Self, StorageError> {
        let stored = storage.load().await?;

        let mut vtxos: Vec<Vtxo> = stored.vtxos.into_values().collect();
        vtxos.sort_by_key(|v| v.sequence);

        let mut writer = WriterState {
            next_sequence: vtxos.last().map_or(0, |v| v.sequence + 1),
            ..Default::default()
        };

        {
            let mut guard = index.write().await;
            for vtxo in vtxos {
                let state = stored.rounds.get(&vtxo.round_id).map(|r| r.state);
                match state {
                    Some(RoundState::Finalized) => guard.vtxos.upsert(vtxo),
                    Some(RoundState::Pending) => {
                        writer
                            .drafts
                            .entry(vtxo.round_id.clone())
                            .or_default()
                            .push(vtxo);
                    }
                    Some(RoundState::Failed) | None => {
                        tracing::warn!(vtxo_id = %vtxo.id, "skipping stored vtxo without a live round");
                    }
                }
            }
            for round in stored.rounds.into_values() {
                guard.rounds.upsert(round);
            }
            if guard.rounds.is_empty() && guard.vtxos.is_empty() {
                tracing::info!("storage is empty; starting with a fresh index");
            } else {
                tracing::info!(
                    rounds = guard.rounds.len(),
                    vtxos = guard.vtxos.len(),
                    pending_rounds = writer.drafts.len(),
                    "recovered index from storage"
                );
            }
        }

        Ok(Self {
            storage,
            index,
            policy,
            writer: Mutex::new(writer),
        })
    }

    pub fn index(&self) -> &SharedIndex {
        &self.index
    }

    /// Apply one event. Failures reject only this event.
    pub async fn process(&self, event: Event) -> Result<Outcome, IngestError> {
        let mut writer = self.writer.lock().await;

        let planned = {
            let index = self.index.read().await;
            plan(&index, &writer, &event)
        };

        let plan = match planned {
            Ok(Planned::Apply(plan)) => plan,
            Ok(Planned::Replay(duplicate)) => {
                return match self.policy {
                    ReplayPolicy::Ignore => {
                        tracing::debug!(
                            event = event.kind(),
                            reason = %duplicate,
                            "ignoring replayed event"
                        );
                        Ok(Outcome::Replayed)
                    }
                    ReplayPolicy::Reject => {
                        tracing::warn!(event = event.kind(), error = %duplicate, "rejected replayed event");
                        Err(duplicate)
                    }
                };
            }
            Err(err) => {
                tracing::warn!(event = event.kind(), error = %err, "rejected event");
                return Err(err);
            }
        };

        if let Err(err) = self.storage.commit(plan.batch).await {
            tracing::error!(event = event.kind(), error = %err, "storage commit failed; event not applied");
            return Err(err.into());
        }

        if plan.consumes_sequence {
            writer.next_sequence += 1;
        }
        match plan.drafts {
            DraftChange::None => {}
            DraftChange::Add(vtxo) => {
                writer
                    .drafts
                    .entry(vtxo.round_id.clone())
                    .or_default()
                    .push(vtxo);
            }
            DraftChange::Take(round_id) => {
                writer.drafts.remove(&round_id);
            }
        }

        self.index.write().await.apply(plan.update);
        log_applied(&event);
        Ok(Outcome::Applied)
    }
}

fn log_applied(event: &Event) {
    match event {
        Event::RoundFinalized { round_id, txid } => {
            tracing::info!(round_id = %round_id, txid = %txid, "round finalized");
        }
        Event::RoundFailed { round_id } => {
            tracing::info!(round_id = %round_id, "round failed");
        }
        other => tracing::debug!(event = other.kind(), "event applied"),
    }
}

fn plan(index: &Index, writer: &WriterState, event: &Event) -> Result<Planned, IngestError> {
    match event {
        Event::RoundOpened { round_id } => plan_open(index, round_id),
        Event::VtxoCreated {
            round_id,
            vout,
            address,
            amount,
        } => {
            let draft = Vtxo {
                id: VtxoId::new(round_id.clone(), *vout),
                address: address.clone(),
                amount: *amount,
                round_id: round_id.clone(),
                status: SpendStatus::Spendable,
                spending_round_id: None,
                sequence: writer.next_sequence,
            };
            plan_create(index, writer, draft)
        }
        Event::RoundFinalized { round_id, txid } => plan_finalize(index, writer, round_id, *txid),
        Event::RoundFailed { round_id } => plan_fail(index, writer, round_id),
        Event::VtxoSpent {
            vtxo_id,
            spending_round_id,
        } => plan_spend(
            index,
            vtxo_id,
            SpendTransition::Spend,
            Some(spending_round_id),
        ),
        Event::VtxoForfeited { vtxo_id } => {
            plan_spend(index, vtxo_id, SpendTransition::Forfeit, None)
        }
    }
}

fn plan_open(index: &Index, round_id: &RoundId) -> Result<Planned, IngestError> {
    if index.rounds.lookup_by_id(&round_id.0).is_some() {
        return Ok(Planned::Replay(IngestError::DuplicateRound(round_id.clone())));
    }
    let mut plan = Plan::new();
    plan.put_round(Round::pending(round_id.clone()));
    Ok(Planned::Apply(plan))
}

fn plan_create(index: &Index, writer: &WriterState, draft: Vtxo) -> Result<Planned, IngestError> {
    if draft.amount > Amount::MAX_MONEY {
        return Err(IngestError::AmountOutOfRange {
            vtxo_id: draft.id,
            amount: draft.amount,
        });
    }

    let round = index
        .rounds
        .lookup_by_id(&draft.round_id.0)
        .ok_or_else(|| IngestError::UnknownRound(draft.round_id.clone()))?;

    let invalid_state = || IngestError::InvalidRoundState {
        round_id: round.id.clone(),
        state: round.state,
        expected: RoundState::Pending,
    };

    match round.state {
        RoundState::Pending => {}
        RoundState::Finalized => {
            // A replay of a creation that has since been published.
            return match index.vtxos.get(&draft.id) {
                Some(existing) if existing.same_payload(&draft) => {
                    Ok(Planned::Replay(invalid_state()))
                }
                _ => Err(invalid_state()),
            };
        }
        RoundState::Failed => return Err(invalid_state()),
    }

    let existing = writer
        .drafts
        .get(&draft.round_id)
        .and_then(|drafts| drafts.iter().find(|v| v.id == draft.id));
    if let Some(existing) = existing {
        if existing.same_payload(&draft) {
            return Ok(Planned::Replay(IngestError::DuplicateVtxo(draft.id)));
        }
        return Err(IngestError::ConflictingVtxo(draft.id));
    }

    let mut updated = round.as_ref().clone();
    updated.vtxo_ids.push(draft.id.clone());

    let mut plan = Plan::new();
    plan.put_round(updated);
    // Drafts are persisted for recovery but kept out of the index.
    plan.batch.put_vtxo(draft.clone());
    plan.drafts = DraftChange::Add(draft);
    plan.consumes_sequence = true;
    Ok(Planned::Apply(plan))
}

fn plan_finalize(
    index: &Index,
    writer: &WriterState,
    round_id: &RoundId,
    txid: Txid,
) -> Result<Planned, IngestError> {
    let round = index
        .rounds
        .lookup_by_id(&round_id.0)
        .ok_or_else(|| IngestError::UnknownRound(round_id.clone()))?;

    if round.state == RoundState::Finalized && round.txid == Some(txid) {
        return Ok(Planned::Replay(IngestError::DuplicateTxid {
            txid,
            holder: round.id.clone(),
        }));
    }

    let next = round
        .state
        .next(RoundTransition::Finalize)
        .ok_or_else(|| IngestError::InvalidRoundState {
            round_id: round.id.clone(),
            state: round.state,
            expected: RoundState::Pending,
        })?;

    if let Some(holder) = index.rounds.lookup_by_txid(&txid) {
        return Err(IngestError::DuplicateTxid {
            txid,
            holder: holder.id.clone(),
        });
    }

    let mut plan = Plan::new();
    plan.put_round(Round {
        txid: Some(txid),
        state: next,
        ..round.as_ref().clone()
    });
    for draft in writer.drafts.get(round_id).into_iter().flatten() {
        plan.put_vtxo(draft.clone());
    }
    plan.drafts = DraftChange::Take(round_id.clone());
    Ok(Planned::Apply(plan))
}

fn plan_fail(
    index: &Index,
    writer: &WriterState,
    round_id: &RoundId,
) -> Result<Planned, IngestError> {
    let round = index
        .rounds
        .lookup_by_id(&round_id.0)
        .ok_or_else(|| IngestError::UnknownRound(round_id.clone()))?;

    let invalid_state = IngestError::InvalidRoundState {
        round_id: round.id.clone(),
        state: round.state,
        expected: RoundState::Pending,
    };
    if round.state == RoundState::Failed {
        return Ok(Planned::Replay(invalid_state));
    }
    let next = round
        .state
        .next(RoundTransition::Fail)
        .ok_or(invalid_state)?;

    let mut plan = Plan::new();
    plan.put_round(Round {
        state: next,
        vtxo_ids: Vec::new(),
        ..round.as_ref().clone()
    });
    for draft in writer.drafts.get(round_id).into_iter().flatten() {
        plan.batch.discard_vtxo(draft.id.clone());
    }
    plan.drafts = DraftChange::Take(round_id.clone());
    Ok(Planned::Apply(plan))
}

fn plan_spend(
    index: &Index,
    vtxo_id: &VtxoId,
    transition: SpendTransition,
    spending_round_id: Option<&RoundId>,
) -> Result<Planned, IngestError> {
    let vtxo = index
        .vtxos
        .get(vtxo_id)
        .ok_or_else(|| IngestError::UnknownVtxo(vtxo_id.clone()))?;

    let invalid_state = IngestError::InvalidVtxoState {
        vtxo_id: vtxo_id.clone(),
        status: vtxo.status,
    };

    let already_applied = match transition {
        SpendTransition::Spend => {
            vtxo.status == SpendStatus::Spent
                && vtxo.spending_round_id.as_ref() == spending_round_id
        }
        SpendTransition::Forfeit => vtxo.status == SpendStatus::Forfeited,
    };
    if already_applied {
        return Ok(Planned::Replay(invalid_state));
    }

    let next = vtxo.status.next(transition).ok_or(invalid_state)?;

    let mut plan = Plan::new();
    plan.put_vtxo(Vtxo {
        status: next,
        spending_round_id: spending_round_id.cloned(),
        ..vtxo.as_ref().clone()
    });
    Ok(Planned::Apply(plan))
}
