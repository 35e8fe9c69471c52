//! Axum app: shared state and router.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use gauntlet::{Engine, EventBus, Store};

use super::providers::test_provider;
use super::review::review_result;
use super::runs::{cancel_model, cancel_run, create_run, execute_run, list_runs, run_results};
use super::subscribe::subscribe_events;

pub struct AppState {
    pub store: Arc<Store>,
    pub engine: Arc<Engine>,
    pub bus: Arc<EventBus>,
    /// Plain client for connectivity probes; model traffic has its own.
    pub probe_client: reqwest::Client,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/runs", post(create_run).get(list_runs))
        .route("/api/runs/:id/execute", post(execute_run))
        .route("/api/runs/:id/cancel", post(cancel_run))
        .route("/api/runs/:id/models/:model_id/cancel", post(cancel_model))
        .route("/api/runs/:id/results", get(run_results))
        .route("/api/runs/:id/events", get(subscribe_events))
        .route("/api/results/:id/review", post(review_result))
        .route("/api/providers/:id/test", post(test_provider))
        .with_state(state)
}
