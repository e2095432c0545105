use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;

use crate::api::health::{HealthCounters, HealthState};
use crate::api::latency::{LatencyStats, LatencySummary};
use crate::orchestrator::{HandlerHealth, SettlementOrchestrator};

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<SettlementOrchestrator>,
    pub latency: Arc<LatencyStats>,
    pub health: Arc<HealthState>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// True only when every registered handler reached its data source.
    pub healthy: bool,
    pub handlers: Vec<HandlerHealth>,
    #[serde(flatten)]
    pub counters: HealthCounters,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let handlers = state.orchestrator.health_check_detailed().await;
    Json(HealthResponse {
        healthy: handlers.iter().all(|h| h.healthy),
        handlers,
        counters: state.health.counters(),
    })
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencySummary> {
    Json(state.latency.summary())
}
