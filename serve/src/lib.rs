//! HTTP API for the Gauntlet benchmark harness (axum).
//!
//! Run lifecycle (create, execute, cancel, list, results), a long-lived SSE
//! subscription per run, manual review of html results and the provider
//! connectivity probe.
//!
//! **Public API**: [`run_serve`], [`run_serve_on_listener`], [`build_state`],
//! [`build_state_with`].

mod app;
mod error;
mod providers;
mod review;
mod runs;
mod subscribe;

use std::path::Path;
use std::sync::Arc;

use gauntlet::{
    CancelRegistry, Engine, EventBus, HttpModelClient, ModelClient, Store, StoreError,
};
use tokio::net::TcpListener;
use tracing::info;

pub use app::{router, AppState};

/// Builds the shared application state with an injectable model client
/// (tests pass a [`gauntlet::MockModelClient`]).
pub fn build_state_with(
    db_path: impl AsRef<Path>,
    client: Arc<dyn ModelClient>,
) -> Result<Arc<AppState>, StoreError> {
    let store = Arc::new(Store::open(db_path)?);
    let bus = Arc::new(EventBus::new());
    let registry = Arc::new(CancelRegistry::new());
    let engine = Arc::new(Engine::new(store.clone(), bus.clone(), registry, client));
    Ok(Arc::new(AppState {
        store,
        engine,
        bus,
        probe_client: reqwest::Client::new(),
    }))
}

pub fn build_state(db_path: impl AsRef<Path>) -> Result<Arc<AppState>, StoreError> {
    build_state_with(db_path, Arc::new(HttpModelClient::new()))
}

/// Serves the API on an existing listener. Tests bind `127.0.0.1:0` and pass
/// the listener in.
pub async fn run_serve_on_listener(
    listener: TcpListener,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!("API listening on http://{}", addr);
    axum::serve(listener, app::router(state)).await?;
    Ok(())
}

/// Opens the store at the configured path (creating parent directories) and
/// serves the API on the configured address.
pub async fn run_serve(
    settings: &config::Settings,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Some(parent) = settings.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let state = build_state(&settings.db_path)?;
    let listener = TcpListener::bind(&settings.bind_addr).await?;
    run_serve_on_listener(listener, state).await
}
