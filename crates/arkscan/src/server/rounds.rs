use axum::extract::{Path, State};
use axum::Json;

use arkscan_core::types::RoundView;

use super::error::AppError;
use super::SharedState;

// ==============================================================================
// Handlers
// ==============================================================================

pub(super) async fn get_round(
    State(state): State<SharedState>,
    Path(txid_str): Path<String>,
) -> Result<Json<RoundView>, AppError> {
    let txid: bitcoin::Txid = txid_str
        .parse()
        .map_err(|e| AppError::BadRequest(format!("invalid txid: {e}")))?;

    Ok(Json(state.query.get_round(&txid).await?))
}

pub(super) async fn get_round_by_id(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<RoundView>, AppError> {
    if id.is_empty() {
        return Err(AppError::BadRequest("round id cannot be empty".to_string()));
    }

    Ok(Json(state.query.get_round_by_id(&id).await?))
}
