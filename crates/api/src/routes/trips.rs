//! Trip booking endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use saga::SagaProcessor;
use serde::{Deserialize, Serialize};
use transport::InMemoryTransport;

use crate::error::ApiError;
use crate::outcomes::{OutcomeSnapshot, SagaOutcomes};
use crate::travel::{TravelServices, Trip};

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub processor: SagaProcessor<Trip, InMemoryTransport>,
    pub transport: Arc<InMemoryTransport>,
    pub services: TravelServices,
    pub outcomes: Arc<SagaOutcomes>,
}

#[derive(Deserialize)]
pub struct StartTripRequest {
    pub id: u64,
}

#[derive(Serialize)]
pub struct TripStartedResponse {
    pub id: u64,
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct TripSummaryResponse {
    /// Active bookings per service channel.
    pub bookings: BTreeMap<&'static str, usize>,
    #[serde(flatten)]
    pub outcomes: OutcomeSnapshot,
}

/// POST /trips: start a travel saga for the trip.
///
/// Answers once the first envelope is published; the saga itself runs in the
/// background.
#[tracing::instrument(skip_all)]
pub async fn start(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<StartTripRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TripStartedResponse>), ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    state.processor.start(Trip { id: req.id }).await?;
    tracing::info!(trip_id = req.id, "trip saga started");

    Ok((
        StatusCode::ACCEPTED,
        Json(TripStartedResponse {
            id: req.id,
            status: "started",
        }),
    ))
}

/// GET /trips/summary: active bookings and finished saga counts.
pub async fn summary(State(state): State<Arc<AppState>>) -> Json<TripSummaryResponse> {
    let bookings = state
        .services
        .all()
        .into_iter()
        .map(|service| (service.name(), service.booking_count()))
        .collect();

    Json(TripSummaryResponse {
        bookings,
        outcomes: state.outcomes.snapshot(),
    })
}
