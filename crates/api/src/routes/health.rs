//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use common::ChannelName;
use serde::Serialize;

use crate::outcomes::OutcomeSnapshot;
use crate::routes::trips::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `"ok"`, or `"degraded"` once a saga needs manual attention.
    pub status: &'static str,
    /// Step channels served by the processor, in step order.
    pub steps: Vec<ChannelName>,
    /// Rollbacks that stopped before reaching the first step.
    pub halted: u64,
    /// Sagas whose next envelope could not be published.
    pub stalled: u64,
}

impl HealthResponse {
    fn new(steps: Vec<ChannelName>, outcomes: OutcomeSnapshot) -> Self {
        let status = if outcomes.halted > 0 || outcomes.stalled > 0 {
            "degraded"
        } else {
            "ok"
        };
        Self {
            status,
            steps,
            halted: outcomes.halted,
            stalled: outcomes.stalled,
        }
    }
}

/// GET /health: reports the saga steps being served and whether any saga
/// was left half-done.
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let steps = state
        .processor
        .definition()
        .steps()
        .map(|step| step.channel().clone())
        .collect();
    Json(HealthResponse::new(steps, state.outcomes.snapshot()))
}
