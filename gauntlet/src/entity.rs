//! Entities persisted by the store: providers, models, problem sets, problems,
//! runs, and per-(run, problem, model) results.
//!
//! Status enums serialize as lowercase strings, both on the wire and in the
//! database. Timestamps are UTC epoch milliseconds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapter::AdapterKind;

/// A result passes when its score reaches this value (0–100 scale).
pub const PASS_THRESHOLD: i64 = 50;

/// Current UTC time as epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Fresh globally unique id (UUID v4 string).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Lifecycle of a run: `queued → running → {completed | cancelled | error}`.
/// No state ever reverts; an errored run may be re-executed (back through
/// `running`) but its status never returns to `queued`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Cancelled,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(RunStatus::Queued),
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "cancelled" => Some(RunStatus::Cancelled),
            "error" => Some(RunStatus::Error),
            _ => None,
        }
    }
}

/// Lifecycle of one result: `(pending | manual) → {completed | cancelled | error}`.
/// `manual` marks html problems awaiting human review.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Pending,
    Manual,
    Completed,
    Cancelled,
    Error,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Pending => "pending",
            ResultStatus::Manual => "manual",
            ResultStatus::Completed => "completed",
            ResultStatus::Cancelled => "cancelled",
            ResultStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ResultStatus::Pending),
            "manual" => Some(ResultStatus::Manual),
            "completed" => Some(ResultStatus::Completed),
            "cancelled" => Some(ResultStatus::Cancelled),
            "error" => Some(ResultStatus::Error),
            _ => None,
        }
    }

    /// Terminal statuses never change again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ResultStatus::Pending)
    }
}

/// What a problem asks for: a text answer (judged by the judge model) or an
/// html artifact (reviewed by a human).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProblemKind {
    Text,
    Html,
}

impl ProblemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProblemKind::Text => "text",
            ProblemKind::Html => "html",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(ProblemKind::Text),
            "html" => Some(ProblemKind::Html),
            _ => None,
        }
    }
}

/// One generation parameter as configured on a model: sent to the provider
/// only when `enabled`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamSetting {
    pub enabled: bool,
    pub value: Value,
}

/// An upstream model API endpoint plus credentials.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub name: String,
    pub kind: AdapterKind,
    pub base_url: String,
    pub api_key: Option<String>,
    pub default_model: Option<String>,
    pub created_at: i64,
    /// Last successful connectivity probe, if any.
    pub last_checked: Option<i64>,
}

/// A concrete model behind a provider, with its display label, the vendor
/// model id sent on the wire, and the per-parameter configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub provider_id: String,
    pub label: String,
    pub model_id: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamSetting>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProblemSet {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: i64,
}

/// One benchmark problem. Problems within a set are ordered by `created_at`
/// ascending; that order is observable to clients and drives scheduling.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Problem {
    pub id: String,
    pub problem_set_id: String,
    pub kind: ProblemKind,
    pub prompt: String,
    /// Expected answer; text problems only.
    pub expected: Option<String>,
    /// Asset bundle for html problems.
    pub html_assets: Option<String>,
    pub hints: Option<String>,
    pub created_at: i64,
}

/// One execution of a problem set against a set of candidate models under a
/// designated judge.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub name: Option<String>,
    pub problem_set_id: String,
    pub model_ids: Vec<String>,
    pub judge_model_id: String,
    pub status: RunStatus,
    pub stream: bool,
    pub created_at: i64,
    pub cancelled_at: Option<i64>,
    pub cancelled_by: Option<String>,
}

/// Outcome of one (run, problem, candidate model) triple. `score` is non-null
/// iff `status == completed`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunResult {
    pub id: String,
    pub run_id: String,
    pub problem_id: String,
    pub model_id: String,
    pub output: Option<String>,
    pub score: Option<i64>,
    pub status: ResultStatus,
    /// Judge model id, or the literal `human` after manual review.
    pub judged_by: Option<String>,
    pub judge_reasoning: Option<String>,
    pub created_at: i64,
    pub cancelled_at: Option<i64>,
}

impl RunResult {
    /// Pass/fail as downstream consumers read it: score ≥ 50 is authoritative,
    /// regardless of any stored verdict text.
    pub fn passed(&self) -> Option<bool> {
        self.score.map(|s| s >= PASS_THRESHOLD)
    }
}
