//! HTTP entry point for the travel-booking saga.
//!
//! Starts saga instances on request and exposes their outcomes, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod outcomes;
pub mod routes;
pub mod travel;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::SagaError;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use transport::InMemoryTransport;

use config::Config;
use outcomes::SagaOutcomes;
use routes::trips::AppState;
use travel::TravelServices;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/trips", post(routes::trips::start))
        .route("/trips/summary", get(routes::trips::summary))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the default application state: in-memory booking services and
/// transport, and a running travel saga processor.
pub async fn create_default_state(config: &Config) -> Result<Arc<AppState>, SagaError> {
    let services = TravelServices::new();
    if let Some(step) = config.fail_step.as_deref() {
        match services.find(step) {
            Some(service) => {
                service.set_fail_on_book(true);
                tracing::warn!(service = service.name(), "bookings will be declined");
            }
            None => tracing::warn!(step, "TRAVEL_FAIL_STEP names no booking service"),
        }
    }

    // Nothing reads the published log here, so keep none.
    let transport = Arc::new(InMemoryTransport::with_log_capacity(0));
    let processor = services
        .saga()
        .build_with_config(Arc::clone(&transport), config.processor_config())
        .await?;

    let outcomes = Arc::new(SagaOutcomes::new());
    outcomes::track(Arc::clone(&outcomes), processor.events());

    Ok(Arc::new(AppState {
        processor,
        transport,
        services,
        outcomes,
    }))
}
