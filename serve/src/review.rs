//! Manual review of html results: a human verdict settles what the judge
//! model cannot grade.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use gauntlet::ReviewDecision;
use serde::Deserialize;
use serde_json::{json, Value};

use super::app::AppState;
use super::error::ApiError;

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewBody {
    decision: String,
    notes: Option<String>,
}

pub(crate) async fn review_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ReviewBody>,
) -> Result<Json<Value>, ApiError> {
    let decision = ReviewDecision::parse(&body.decision)
        .ok_or_else(|| ApiError::bad_request(format!("unknown decision: {}", body.decision)))?;
    let result = state.engine.review_result(&id, decision, body.notes)?;
    Ok(Json(json!({ "result": result })))
}
