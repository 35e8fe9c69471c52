//! Provider connectivity probe endpoint.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use gauntlet::ProbeReport;

use super::app::AppState;
use super::error::ApiError;

pub(crate) async fn test_provider(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ProbeReport>, ApiError> {
    let report = gauntlet::test_provider(&state.probe_client, &state.store, &id).await?;
    Ok(Json(report))
}
