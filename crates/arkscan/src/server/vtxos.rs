use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use arkscan_core::types::{AddressBalance, Vtxo, VtxoList};

use super::error::AppError;
use super::SharedState;

/// Upper bound on addresses per aggregate listing request.
pub(crate) const MAX_ADDRESSES_PER_QUERY: usize = 100;

// ==============================================================================
// DTOs
// ==============================================================================

#[derive(Serialize)]
pub(super) struct ListVtxosResponse {
    spendable_vtxos: Vec<Vtxo>,
    spent_vtxos: Vec<Vtxo>,
}

impl From<VtxoList> for ListVtxosResponse {
    fn from(list: VtxoList) -> Self {
        Self {
            spendable_vtxos: list.spendable,
            spent_vtxos: list.spent,
        }
    }
}

#[derive(Deserialize)]
pub(super) struct MultiAddressQuery {
    /// Comma-separated list of addresses.
    addresses: String,
}

// ==============================================================================
// Handlers
// ==============================================================================

pub(super) async fn list_vtxos(
    State(state): State<SharedState>,
    Path(address): Path<String>,
) -> Json<ListVtxosResponse> {
    Json(state.query.list_vtxos(&address).await.into())
}

pub(super) async fn list_vtxos_for_addresses(
    State(state): State<SharedState>,
    Query(query): Query<MultiAddressQuery>,
) -> Result<Json<ListVtxosResponse>, AppError> {
    let addresses = parse_address_list(&query.addresses)?;
    Ok(Json(state.query.list_vtxos_for(&addresses).await.into()))
}

pub(super) async fn get_balance(
    State(state): State<SharedState>,
    Path(address): Path<String>,
) -> Json<AddressBalance> {
    Json(state.query.balance(&address).await)
}

fn parse_address_list(raw: &str) -> Result<Vec<String>, AppError> {
    let addresses: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if addresses.is_empty() {
        return Err(AppError::BadRequest(
            "addresses must contain at least one address".to_string(),
        ));
    }
    if addresses.len() > MAX_ADDRESSES_PER_QUERY {
        return Err(AppError::BadRequest(format!(
            "addresses must contain at most {MAX_ADDRESSES_PER_QUERY} entries"
        )));
    }
    Ok(addresses)
}
