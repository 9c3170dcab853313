mod error;
mod rounds;
mod vtxos;

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::{AllowOrigin, CorsLayer};

use arkscan_core::types::IndexStats;
use arkscan_core::QueryService;

// ==============================================================================
// Application State
// ==============================================================================

pub struct AppState {
    pub query: QueryService,
}

type SharedState = Arc<AppState>;

// ==============================================================================
// Router
// ==============================================================================

pub fn build_router(state: AppState, origin: &str) -> eyre::Result<Router> {
    // Only reflect the allowed origin when the request's Origin header
    // actually matches; otherwise browsers get a clean CORS rejection.
    let allowed: axum::http::HeaderValue = origin
        .parse()
        .map_err(|e| eyre::eyre!("invalid origin `{origin}`: {e}"))?;
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |request_origin: &axum::http::HeaderValue, _| *request_origin == allowed,
        ))
        .allow_methods([axum::http::Method::GET, axum::http::Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    let shared = Arc::new(state);

    let api = Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/stats", get(stats))
        .route("/api/v1/round/{txid}", get(rounds::get_round))
        .route("/api/v1/round/id/{id}", get(rounds::get_round_by_id))
        .route("/api/v1/vtxos", get(vtxos::list_vtxos_for_addresses))
        .route("/api/v1/vtxos/{address}", get(vtxos::list_vtxos))
        .route("/api/v1/vtxos/{address}/balance", get(vtxos::get_balance));

    Ok(Router::new()
        .merge(api)
        .fallback(api_not_found)
        .layer(cors)
        .with_state(shared))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn stats(
    axum::extract::State(state): axum::extract::State<SharedState>,
) -> Json<IndexStats> {
    Json(state.query.stats().await)
}

async fn api_not_found() -> error::AppError {
    error::AppError::NotFound("API route not found".to_string())
}
