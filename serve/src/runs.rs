//! Run lifecycle handlers: create, execute, cancel, list, results.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use gauntlet::{CreateRun, RunStatus};
use serde::Deserialize;
use serde_json::{json, Value};

use super::app::AppState;
use super::error::ApiError;

#[derive(Debug, Deserialize)]
pub(crate) struct CreateRunBody {
    name: Option<String>,
    problem_set_id: String,
    #[serde(default)]
    model_ids: Vec<String>,
    judge_model_id: String,
    #[serde(default)]
    stream: bool,
}

pub(crate) async fn create_run(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateRunBody>,
) -> Result<Json<Value>, ApiError> {
    let run = state.engine.create_run(CreateRun {
        name: body.name,
        problem_set_id: body.problem_set_id,
        model_ids: body.model_ids,
        judge_model_id: body.judge_model_id,
        stream: body.stream,
    })?;
    Ok(Json(json!({ "id": run.id })))
}

pub(crate) async fn execute_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let run = state.engine.execute(&id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "id": run.id, "status": run.status })),
    ))
}

pub(crate) async fn cancel_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let cancelled = state.engine.cancel_run(&id, "user")?;
    Ok(Json(json!({
        "id": id,
        "status": "cancelled",
        "cancelled": cancelled,
    })))
}

pub(crate) async fn cancel_model(
    State(state): State<Arc<AppState>>,
    Path((id, model_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let cancelled = state.engine.cancel_model(&id, &model_id)?;
    Ok(Json(json!({
        "id": id,
        "model_id": model_id,
        "cancelled": cancelled,
    })))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListRunsQuery {
    status: Option<String>,
    problem_set_id: Option<String>,
    limit: Option<u32>,
}

pub(crate) async fn list_runs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<Value>, ApiError> {
    let status = match query.status.as_deref() {
        None => None,
        Some(s) => Some(
            RunStatus::parse(s)
                .ok_or_else(|| ApiError::bad_request(format!("unknown status: {s}")))?,
        ),
    };
    let runs = state
        .store
        .list_runs(status, query.problem_set_id.as_deref(), query.limit)?;
    Ok(Json(json!({ "runs": runs })))
}

pub(crate) async fn run_results(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let run = state.store.get_run(&id)?;
    let results = state.store.results_for_run(&run.id)?;
    Ok(Json(json!({ "run_id": run.id, "results": results })))
}
