//! Long-lived SSE subscription to a run's progress events.
//!
//! The response starts with a synthetic `run_status` echo of the current
//! status, then forwards live events until the run ends or the client
//! disconnects. Buffering proxies are told to stay out of the way.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use run_event::RunEvent;
use tokio_stream::wrappers::ReceiverStream;

use super::app::AppState;
use super::error::ApiError;

pub(crate) async fn subscribe_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let run = state.store.get_run(&id)?;
    if !run.stream {
        return Err(ApiError::bad_request(
            "streaming is not enabled for this run",
        ));
    }
    let rx = state.bus.subscribe(&run.id, run.status.as_str());
    let stream =
        ReceiverStream::new(rx).map(|event: RunEvent| Event::default().json_data(&event));
    let sse = Sse::new(stream).keep_alive(KeepAlive::default());
    Ok((
        [
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (header::HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        sse,
    )
        .into_response())
}
