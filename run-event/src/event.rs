//! Event types published per run: type + payload, serialized as flat JSON.
//! Every variant carries `run_id`; subscribers key their streams on it.

use serde::Serialize;
use serde_json::Value;

/// What kind of content a streamed delta belongs to. Mirrors the problem kind
/// so UIs can render html deltas into a preview pane instead of a transcript.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Text,
    Html,
}

/// Judge verdict for one candidate answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
}

/// One progress event for a run. Wire shape is `{"type": "...", ...payload}`.
///
/// Ordering: per (run, model) pair, `model_started` precedes any
/// `candidate_token`, which precede the `candidate_done`/`html_candidate_done`
/// and the optional `judge_done` for the same problem. Events for different
/// models interleave freely. `run_status` brackets the whole run.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    RunStatus {
        run_id: String,
        status: String,
    },
    ModelStarted {
        run_id: String,
        problem_id: String,
        model_id: String,
        model_name: String,
        attempt: u32,
        streaming: bool,
    },
    ModelStreamingStarted {
        run_id: String,
        problem_id: String,
        model_id: String,
        model_name: String,
    },
    CandidateToken {
        run_id: String,
        problem_id: String,
        model_id: String,
        model_name: String,
        delta: String,
        kind: TokenKind,
    },
    CandidateDone {
        run_id: String,
        problem_id: String,
        model_id: String,
        model_name: String,
        text: String,
    },
    HtmlCandidateDone {
        run_id: String,
        problem_id: String,
        model_id: String,
        model_name: String,
        html: String,
    },
    JudgeDone {
        run_id: String,
        problem_id: String,
        model_id: String,
        verdict: Verdict,
        reasoning: String,
        score: i64,
    },
    ModelError {
        run_id: String,
        problem_id: String,
        model_id: String,
        model_name: String,
        error: String,
        streaming: bool,
    },
    ModelCancelled {
        run_id: String,
        problem_id: String,
        model_id: String,
        model_name: String,
    },
    RunCancelled {
        run_id: String,
        cancelled_by: String,
    },
}

impl RunEvent {
    /// The run this event belongs to.
    pub fn run_id(&self) -> &str {
        match self {
            RunEvent::RunStatus { run_id, .. }
            | RunEvent::ModelStarted { run_id, .. }
            | RunEvent::ModelStreamingStarted { run_id, .. }
            | RunEvent::CandidateToken { run_id, .. }
            | RunEvent::CandidateDone { run_id, .. }
            | RunEvent::HtmlCandidateDone { run_id, .. }
            | RunEvent::JudgeDone { run_id, .. }
            | RunEvent::ModelError { run_id, .. }
            | RunEvent::ModelCancelled { run_id, .. }
            | RunEvent::RunCancelled { run_id, .. } => run_id,
        }
    }
}

/// Serializes one event to its wire JSON object.
pub fn to_json(event: &RunEvent) -> Result<Value, serde_json::Error> {
    serde_json::to_value(event)
}
