//! Run orchestration: one worker per candidate model, problems in order.
//!
//! `execute` validates, flips the run to `running`, spawns the run body as a
//! detached task and acks the caller immediately. Each worker walks the
//! problem list FIFO, produces an answer through the adapter (with retry),
//! streams tokens onto the bus, and hands text answers to the judge. Workers
//! never block on each other; one failed problem never kills a worker, and a
//! cancelled worker stops taking new work but still settles its current row.

use std::sync::Arc;

use futures::future::join_all;
use run_event::{RunEvent, TokenKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::adapter::{AdapterError, ChatMessage, CompletionRequest, ModelClient};
use crate::bus::EventBus;
use crate::cancel::CancelRegistry;
use crate::entity::{
    new_id, now_ms, Model, Problem, ProblemKind, Provider, ResultStatus, Run, RunResult, RunStatus,
};
use crate::judge::judge_answer;
use crate::retry::RetryPolicy;
use crate::store::{ResultPatch, Store, StoreError};

/// Bounded queue between an in-flight stream and the bus pump.
const TOKEN_QUEUE_CAPACITY: usize = 256;

pub const TEXT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";
pub const HTML_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that returns HTML/CSS/JS when asked. Keep responses concise.";

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("run not found: {0}")]
    RunNotFound(String),
    #[error("run {0} is already running")]
    AlreadyRunning(String),
    #[error("problem set not found: {0}")]
    ProblemSetMissing(String),
    #[error("judge model not found: {0}")]
    JudgeModelMissing(String),
    #[error("a run needs at least one candidate model")]
    NoCandidates,
    #[error("run {run_id} cannot be cancelled from status {status}")]
    CancelNotAllowed { run_id: String, status: String },
    #[error("model {model_id} is not part of run {run_id}")]
    ModelNotInRun { run_id: String, model_id: String },
    #[error("result {result_id} is not awaiting manual review (status {status})")]
    ReviewNotAllowed { result_id: String, status: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Inputs for creating a run.
#[derive(Clone, Debug)]
pub struct CreateRun {
    pub name: Option<String>,
    pub problem_set_id: String,
    pub model_ids: Vec<String>,
    pub judge_model_id: String,
    pub stream: bool,
}

/// Manual review outcome for an html result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReviewDecision {
    Pass,
    Fail,
}

impl ReviewDecision {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pass" => Some(ReviewDecision::Pass),
            "fail" => Some(ReviewDecision::Fail),
            _ => None,
        }
    }
}

/// The run execution engine: ties the store, bus, cancellation registry and
/// model client together.
pub struct Engine {
    store: Arc<Store>,
    bus: Arc<EventBus>,
    registry: Arc<CancelRegistry>,
    client: Arc<dyn ModelClient>,
    retry: RetryPolicy,
}

/// Everything a spawned run task needs, cloned out of the engine.
struct RunContext {
    store: Arc<Store>,
    bus: Arc<EventBus>,
    registry: Arc<CancelRegistry>,
    client: Arc<dyn ModelClient>,
    retry: RetryPolicy,
    run: Run,
    judge_model: Model,
    judge_provider: Provider,
    problems: Vec<Problem>,
}

impl Engine {
    pub fn new(
        store: Arc<Store>,
        bus: Arc<EventBus>,
        registry: Arc<CancelRegistry>,
        client: Arc<dyn ModelClient>,
    ) -> Self {
        Self {
            store,
            bus,
            registry,
            client,
            retry: RetryPolicy::default(),
        }
    }

    /// Overrides the retry policy (tests use millisecond delays).
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn get_run(&self, run_id: &str) -> Result<Run, EngineError> {
        self.store.get_run(run_id).map_err(|e| match e {
            StoreError::NotFound(_) => EngineError::RunNotFound(run_id.to_string()),
            e => EngineError::Store(e),
        })
    }

    /// Creates a run in `queued` status after validating its references.
    pub fn create_run(&self, req: CreateRun) -> Result<Run, EngineError> {
        self.store
            .get_problem_set(&req.problem_set_id)
            .map_err(|e| match e {
                StoreError::NotFound(_) => {
                    EngineError::ProblemSetMissing(req.problem_set_id.clone())
                }
                e => EngineError::Store(e),
            })?;
        if req.model_ids.is_empty() {
            return Err(EngineError::NoCandidates);
        }
        self.store
            .get_model(&req.judge_model_id)
            .map_err(|e| match e {
                StoreError::NotFound(_) => {
                    EngineError::JudgeModelMissing(req.judge_model_id.clone())
                }
                e => EngineError::Store(e),
            })?;
        let run = Run {
            id: new_id(),
            name: req.name,
            problem_set_id: req.problem_set_id,
            model_ids: req.model_ids,
            judge_model_id: req.judge_model_id,
            status: RunStatus::Queued,
            stream: req.stream,
            created_at: now_ms(),
            cancelled_at: None,
            cancelled_by: None,
        };
        self.store.insert_run(&run)?;
        Ok(run)
    }

    /// Starts executing a run and returns as soon as it is `running`; the
    /// actual work proceeds in a detached task. Permitted from `queued` and
    /// `error` (re-execution reuses the run id with a clean result set).
    pub async fn execute(&self, run_id: &str) -> Result<Run, EngineError> {
        let run = self.get_run(run_id)?;
        if run.status == RunStatus::Running {
            return Err(EngineError::AlreadyRunning(run_id.to_string()));
        }
        let judge_model = self.store.get_model(&run.judge_model_id).map_err(|e| match e {
            StoreError::NotFound(_) => EngineError::JudgeModelMissing(run.judge_model_id.clone()),
            e => EngineError::Store(e),
        })?;
        let judge_provider = self.store.provider_for_model(&judge_model.id)?;

        let mut candidates: Vec<(Model, Provider)> = Vec::new();
        for id in &run.model_ids {
            match self.store.get_model(id) {
                Ok(model) => {
                    let provider = self.store.provider_for_model(&model.id)?;
                    candidates.push((model, provider));
                }
                Err(StoreError::NotFound(_)) => {
                    tracing::warn!(run_id, model_id = %id, "candidate model no longer exists, skipping");
                }
                Err(e) => return Err(e.into()),
            }
        }
        let problems = self.store.problems_for_set(&run.problem_set_id)?;

        // the transition is the gate: a concurrent execute loses here, before
        // anything destructive happens
        match self.store.transition_run_status(
            run_id,
            &[RunStatus::Queued, RunStatus::Error],
            RunStatus::Running,
        ) {
            Ok(()) => {}
            Err(StoreError::InvalidTransition { from, .. }) if from == "running" => {
                return Err(EngineError::AlreadyRunning(run_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        self.store.delete_results_for_run(run_id)?;
        self.store.clear_run_cancellation(run_id)?;
        tracing::info!(run_id, models = candidates.len(), problems = problems.len(), "run started");
        self.bus.publish(RunEvent::RunStatus {
            run_id: run_id.to_string(),
            status: RunStatus::Running.as_str().to_string(),
        });

        // A stale token from a previous execution must not poison this one.
        self.registry.remove_run(run_id);
        let run_token = self.registry.register_run(run_id);

        let mut running = run.clone();
        running.status = RunStatus::Running;
        let ctx = Arc::new(RunContext {
            store: self.store.clone(),
            bus: self.bus.clone(),
            registry: self.registry.clone(),
            client: self.client.clone(),
            retry: self.retry,
            run: running.clone(),
            judge_model,
            judge_provider,
            problems,
        });
        tokio::spawn(drive_run(ctx, run_token, candidates));
        Ok(running)
    }

    /// Cancels a whole run. Running: triggers the registry and lets the
    /// scheduler settle the terminal status. Queued: settles directly.
    pub fn cancel_run(&self, run_id: &str, by: &str) -> Result<bool, EngineError> {
        let run = self.get_run(run_id)?;
        match run.status {
            RunStatus::Running => {
                self.store.stamp_run_cancelled(run_id, by, now_ms())?;
                self.bus.publish(RunEvent::RunCancelled {
                    run_id: run_id.to_string(),
                    cancelled_by: by.to_string(),
                });
                let triggered = self.registry.cancel_run(run_id);
                if !triggered {
                    // No live workers own this run (e.g. the process was
                    // restarted while it was running); settle it here.
                    self.store.transition_run_status(
                        run_id,
                        &[RunStatus::Running],
                        RunStatus::Cancelled,
                    )?;
                    self.bus.publish(RunEvent::RunStatus {
                        run_id: run_id.to_string(),
                        status: RunStatus::Cancelled.as_str().to_string(),
                    });
                    self.bus.remove_run(run_id);
                }
                tracing::info!(run_id, by, "run cancelled");
                Ok(true)
            }
            RunStatus::Queued => {
                self.store.stamp_run_cancelled(run_id, by, now_ms())?;
                self.store
                    .transition_run_status(run_id, &[RunStatus::Queued], RunStatus::Cancelled)?;
                self.bus.publish(RunEvent::RunCancelled {
                    run_id: run_id.to_string(),
                    cancelled_by: by.to_string(),
                });
                self.bus.publish(RunEvent::RunStatus {
                    run_id: run_id.to_string(),
                    status: RunStatus::Cancelled.as_str().to_string(),
                });
                self.bus.remove_run(run_id);
                Ok(true)
            }
            other => Err(EngineError::CancelNotAllowed {
                run_id: run_id.to_string(),
                status: other.as_str().to_string(),
            }),
        }
    }

    /// Cancels a single model worker; the rest of the run keeps going.
    pub fn cancel_model(&self, run_id: &str, model_id: &str) -> Result<bool, EngineError> {
        let run = self.get_run(run_id)?;
        if run.status != RunStatus::Running {
            return Err(EngineError::CancelNotAllowed {
                run_id: run_id.to_string(),
                status: run.status.as_str().to_string(),
            });
        }
        if !run.model_ids.iter().any(|m| m == model_id) {
            return Err(EngineError::ModelNotInRun {
                run_id: run_id.to_string(),
                model_id: model_id.to_string(),
            });
        }
        Ok(self.registry.cancel_model(run_id, model_id))
    }

    /// Applies a human verdict to an html result awaiting review.
    pub fn review_result(
        &self,
        result_id: &str,
        decision: ReviewDecision,
        notes: Option<String>,
    ) -> Result<RunResult, EngineError> {
        let (result, kind) = self.store.get_result_with_kind(result_id)?;
        if result.status != ResultStatus::Manual || kind != ProblemKind::Html {
            return Err(EngineError::ReviewNotAllowed {
                result_id: result_id.to_string(),
                status: result.status.as_str().to_string(),
            });
        }
        let score = match decision {
            ReviewDecision::Pass => 100,
            ReviewDecision::Fail => 0,
        };
        self.store.mark_result(
            result_id,
            &ResultPatch {
                score: Some(score),
                status: Some(ResultStatus::Completed),
                judged_by: Some("human".to_string()),
                judge_reasoning: notes,
                ..Default::default()
            },
        )?;
        self.store.get_result(result_id).map_err(Into::into)
    }
}

async fn drive_run(
    ctx: Arc<RunContext>,
    run_token: CancellationToken,
    candidates: Vec<(Model, Provider)>,
) {
    let run_id = ctx.run.id.clone();
    let mut handles = Vec::new();
    for (model, provider) in candidates {
        let model_token = ctx.registry.register_model(&run_id, &model.id);
        handles.push(tokio::spawn(model_worker(
            ctx.clone(),
            model,
            provider,
            run_token.clone(),
            model_token,
        )));
    }
    for result in join_all(handles).await {
        if let Err(err) = result {
            tracing::error!(%run_id, %err, "model worker panicked");
        }
    }

    let outcome = if run_token.is_cancelled() {
        ctx.store
            .transition_run_status(&run_id, &[RunStatus::Running], RunStatus::Cancelled)
            .map(|_| RunStatus::Cancelled)
    } else {
        match ctx.store.complete_run_unless_cancelled(&run_id) {
            Ok(true) => Ok(RunStatus::Completed),
            // a cancel stamp raced in after the last token check
            Ok(false) => ctx
                .store
                .transition_run_status(&run_id, &[RunStatus::Running], RunStatus::Cancelled)
                .map(|_| RunStatus::Cancelled),
            Err(e) => Err(e),
        }
    };
    match outcome {
        Ok(terminal) => {
            tracing::info!(%run_id, status = terminal.as_str(), "run finished");
            ctx.bus.publish(RunEvent::RunStatus {
                run_id: run_id.clone(),
                status: terminal.as_str().to_string(),
            });
        }
        Err(err) => {
            tracing::error!(%run_id, %err, "terminal transition failed");
            let _ = ctx
                .store
                .transition_run_status(&run_id, &[RunStatus::Running], RunStatus::Error);
            ctx.bus.publish(RunEvent::RunStatus {
                run_id: run_id.clone(),
                status: RunStatus::Error.as_str().to_string(),
            });
        }
    }
    ctx.registry.remove_run(&run_id);
    ctx.bus.remove_run(&run_id);
}

async fn model_worker(
    ctx: Arc<RunContext>,
    model: Model,
    provider: Provider,
    run_token: CancellationToken,
    model_token: CancellationToken,
) {
    let run_id = ctx.run.id.clone();
    for problem in &ctx.problems {
        if run_token.is_cancelled() || model_token.is_cancelled() {
            break;
        }
        let is_html = problem.kind == ProblemKind::Html;
        let result = RunResult {
            id: new_id(),
            run_id: run_id.clone(),
            problem_id: problem.id.clone(),
            model_id: model.id.clone(),
            output: None,
            score: None,
            status: if is_html {
                ResultStatus::Manual
            } else {
                ResultStatus::Pending
            },
            judged_by: None,
            judge_reasoning: None,
            created_at: now_ms(),
            cancelled_at: None,
        };
        if let Err(err) = ctx.store.insert_result(&result) {
            tracing::error!(%run_id, problem_id = %problem.id, %err, "insert result failed");
            continue;
        }
        ctx.bus.publish(RunEvent::ModelStarted {
            run_id: run_id.clone(),
            problem_id: problem.id.clone(),
            model_id: model.id.clone(),
            model_name: model.label.clone(),
            attempt: 1,
            streaming: ctx.run.stream,
        });
        if ctx.run.stream {
            ctx.bus.publish(RunEvent::ModelStreamingStarted {
                run_id: run_id.clone(),
                problem_id: problem.id.clone(),
                model_id: model.id.clone(),
                model_name: model.label.clone(),
            });
        }

        let system = match problem.kind {
            ProblemKind::Text => TEXT_SYSTEM_PROMPT,
            ProblemKind::Html => HTML_SYSTEM_PROMPT,
        };
        let messages = vec![
            ChatMessage::system(system),
            ChatMessage::user(problem.prompt.clone()),
        ];

        match produce_answer(&ctx, &model, &provider, problem, messages, &model_token).await {
            Ok(output) => {
                mark(&ctx, &result.id, ResultPatch {
                    output: Some(output.clone()),
                    ..Default::default()
                });
                // a cancel that landed while the call was finishing must not
                // leak further progress events
                if model_token.is_cancelled() {
                    settle_cancelled(&ctx, &result.id, problem, &model);
                    break;
                }
                if is_html {
                    // stays `manual` until a human reviews it
                    ctx.bus.publish(RunEvent::HtmlCandidateDone {
                        run_id: run_id.clone(),
                        problem_id: problem.id.clone(),
                        model_id: model.id.clone(),
                        model_name: model.label.clone(),
                        html: output,
                    });
                    continue;
                }
                ctx.bus.publish(RunEvent::CandidateDone {
                    run_id: run_id.clone(),
                    problem_id: problem.id.clone(),
                    model_id: model.id.clone(),
                    model_name: model.label.clone(),
                    text: output.clone(),
                });
                match judge_answer(
                    ctx.client.as_ref(),
                    &ctx.retry,
                    &ctx.judge_provider,
                    &ctx.judge_model,
                    problem,
                    &output,
                    &model_token,
                )
                .await
                {
                    Ok(verdict) => {
                        mark(&ctx, &result.id, ResultPatch {
                            score: Some(verdict.score),
                            status: Some(ResultStatus::Completed),
                            judged_by: Some(ctx.judge_model.id.clone()),
                            judge_reasoning: Some(verdict.reasoning.clone()),
                            ..Default::default()
                        });
                        ctx.bus.publish(RunEvent::JudgeDone {
                            run_id: run_id.clone(),
                            problem_id: problem.id.clone(),
                            model_id: model.id.clone(),
                            verdict: verdict.verdict,
                            reasoning: verdict.reasoning,
                            score: verdict.score,
                        });
                    }
                    Err(err) if err.is_cancelled() => {
                        settle_cancelled(&ctx, &result.id, problem, &model);
                        break;
                    }
                    Err(err) => {
                        settle_error(&ctx, &result.id, problem, &model, &err);
                    }
                }
            }
            Err(err) if err.is_cancelled() => {
                settle_cancelled(&ctx, &result.id, problem, &model);
                break;
            }
            Err(err) => {
                // one failed problem is not fatal to this worker's queue
                settle_error(&ctx, &result.id, problem, &model, &err);
            }
        }
    }
}

/// Produces one candidate answer, streaming tokens onto the bus when the run
/// has streaming enabled, otherwise synthesizing a single whole-answer token.
async fn produce_answer(
    ctx: &Arc<RunContext>,
    model: &Model,
    provider: &Provider,
    problem: &Problem,
    messages: Vec<ChatMessage>,
    token: &CancellationToken,
) -> Result<String, AdapterError> {
    let kind = match problem.kind {
        ProblemKind::Text => TokenKind::Text,
        ProblemKind::Html => TokenKind::Html,
    };
    if ctx.run.stream {
        ctx.retry
            .run(token, &model.label, |_| {
                let req =
                    CompletionRequest::for_model(provider, model, messages.clone(), token.clone());
                let ctx = ctx.clone();
                let problem_id = problem.id.clone();
                let model_id = model.id.clone();
                let model_name = model.label.clone();
                async move {
                    let (tx, mut rx) = mpsc::channel::<String>(TOKEN_QUEUE_CAPACITY);
                    let pump = {
                        let bus = ctx.bus.clone();
                        let run_id = ctx.run.id.clone();
                        tokio::spawn(async move {
                            while let Some(delta) = rx.recv().await {
                                bus.publish(RunEvent::CandidateToken {
                                    run_id: run_id.clone(),
                                    problem_id: problem_id.clone(),
                                    model_id: model_id.clone(),
                                    model_name: model_name.clone(),
                                    delta,
                                    kind,
                                });
                            }
                        })
                    };
                    let res = ctx.client.stream(req, tx).await;
                    // drain the pump before reporting: the done event must
                    // follow the last token
                    let _ = pump.await;
                    res
                }
            })
            .await
    } else {
        let output = ctx
            .retry
            .run(token, &model.label, |_| {
                let req =
                    CompletionRequest::for_model(provider, model, messages.clone(), token.clone());
                ctx.client.complete(req)
            })
            .await?;
        ctx.bus.publish(RunEvent::CandidateToken {
            run_id: ctx.run.id.clone(),
            problem_id: problem.id.clone(),
            model_id: model.id.clone(),
            model_name: model.label.clone(),
            delta: output.clone(),
            kind,
        });
        Ok(output)
    }
}

fn mark(ctx: &RunContext, result_id: &str, patch: ResultPatch) {
    if let Err(err) = ctx.store.mark_result(result_id, &patch) {
        tracing::error!(result_id, %err, "result update failed");
    }
}

fn settle_cancelled(ctx: &RunContext, result_id: &str, problem: &Problem, model: &Model) {
    mark(ctx, result_id, ResultPatch {
        status: Some(ResultStatus::Cancelled),
        cancelled_at: Some(now_ms()),
        ..Default::default()
    });
    ctx.bus.publish(RunEvent::ModelCancelled {
        run_id: ctx.run.id.clone(),
        problem_id: problem.id.clone(),
        model_id: model.id.clone(),
        model_name: model.label.clone(),
    });
}

fn settle_error(
    ctx: &RunContext,
    result_id: &str,
    problem: &Problem,
    model: &Model,
    err: &AdapterError,
) {
    tracing::warn!(run_id = %ctx.run.id, problem_id = %problem.id, model = %model.label, %err, "model call failed");
    mark(ctx, result_id, ResultPatch {
        status: Some(ResultStatus::Error),
        ..Default::default()
    });
    ctx.bus.publish(RunEvent::ModelError {
        run_id: ctx.run.id.clone(),
        problem_id: problem.id.clone(),
        model_id: model.id.clone(),
        model_name: model.label.clone(),
        error: err.to_string(),
        streaming: ctx.run.stream,
    });
}
