//! Shared fixture for engine integration tests: tempfile store, event bus,
//! cancellation registry and a scripted mock model client.
#![allow(dead_code)] // each test binary uses a different slice of the helpers

use std::collections::BTreeMap;
use std::sync::{Arc, Once};
use std::time::Duration;

use gauntlet::run_event::RunEvent;
use gauntlet::{
    new_id, now_ms, AdapterKind, CancelRegistry, Engine, EventBus, MockModelClient, Model, Problem,
    ProblemKind, ProblemSet, Provider, RetryPolicy, Run, RunStatus, Store,
};
use tempfile::NamedTempFile;
use tokio::sync::mpsc;

pub struct Harness {
    // keeps the sqlite file alive for the duration of the test
    pub _file: NamedTempFile,
    pub store: Arc<Store>,
    pub bus: Arc<EventBus>,
    pub registry: Arc<CancelRegistry>,
    pub mock: Arc<MockModelClient>,
    pub engine: Engine,
}

static INIT: Once = Once::new();

/// Installs a subscriber once per test binary; `RUST_LOG` controls verbosity.
fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

pub fn harness() -> Harness {
    init_tracing();
    let file = NamedTempFile::new().unwrap();
    let store = Arc::new(Store::open(file.path()).unwrap());
    let bus = Arc::new(EventBus::new());
    let registry = Arc::new(CancelRegistry::new());
    let mock = Arc::new(MockModelClient::new());
    let engine = Engine::new(
        store.clone(),
        bus.clone(),
        registry.clone(),
        mock.clone(),
    )
    .with_retry_policy(RetryPolicy {
        max_attempts: 4,
        initial_delay: Duration::from_millis(1),
    });
    Harness {
        _file: file,
        store,
        bus,
        registry,
        mock,
        engine,
    }
}

impl Harness {
    pub fn seed_provider(&self) -> Provider {
        let p = Provider {
            id: new_id(),
            name: "local".into(),
            kind: AdapterKind::OpenAiCompat,
            base_url: "http://localhost:1234/v1".into(),
            api_key: None,
            default_model: None,
            created_at: now_ms(),
            last_checked: None,
        };
        self.store.insert_provider(&p).unwrap();
        p
    }

    /// Inserts a model whose vendor id equals `vendor`; mock rules key on it.
    pub fn seed_model(&self, provider_id: &str, vendor: &str) -> Model {
        let m = Model {
            id: new_id(),
            provider_id: provider_id.to_string(),
            label: vendor.to_string(),
            model_id: vendor.to_string(),
            params: BTreeMap::new(),
        };
        self.store.insert_model(&m).unwrap();
        m
    }

    pub fn seed_problem_set(&self, name: &str) -> ProblemSet {
        let s = ProblemSet {
            id: new_id(),
            name: name.into(),
            description: None,
            created_at: now_ms(),
        };
        self.store.insert_problem_set(&s).unwrap();
        s
    }

    /// Inserts a problem with an explicit `created_at` so ordering is exact.
    pub fn seed_problem(
        &self,
        set_id: &str,
        kind: ProblemKind,
        prompt: &str,
        expected: Option<&str>,
        created_at: i64,
    ) -> Problem {
        let p = Problem {
            id: new_id(),
            problem_set_id: set_id.to_string(),
            kind,
            prompt: prompt.into(),
            expected: expected.map(str::to_string),
            html_assets: None,
            hints: None,
            created_at,
        };
        self.store.insert_problem(&p).unwrap();
        p
    }

    pub fn create_run(&self, set_id: &str, model_ids: Vec<String>, judge: &str, stream: bool) -> Run {
        self.engine
            .create_run(gauntlet::CreateRun {
                name: None,
                problem_set_id: set_id.to_string(),
                model_ids,
                judge_model_id: judge.to_string(),
                stream,
            })
            .unwrap()
    }
}

/// Polls until the run reaches `status` or the test times out.
pub async fn wait_for_run_status(store: &Store, run_id: &str, status: RunStatus) {
    for _ in 0..400 {
        if store.get_run(run_id).unwrap().status == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "run {run_id} never reached {status:?}; last seen {:?}",
        store.get_run(run_id).unwrap().status
    );
}

/// Drains a subscription until the channel closes (bus drops the topic on
/// terminal transition) or goes quiet.
pub async fn collect_events(mut rx: mpsc::Receiver<RunEvent>) -> Vec<RunEvent> {
    let mut out = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
        out.push(event);
    }
    out
}

pub fn event_type(event: &RunEvent) -> &'static str {
    match event {
        RunEvent::RunStatus { .. } => "run_status",
        RunEvent::ModelStarted { .. } => "model_started",
        RunEvent::ModelStreamingStarted { .. } => "model_streaming_started",
        RunEvent::CandidateToken { .. } => "candidate_token",
        RunEvent::CandidateDone { .. } => "candidate_done",
        RunEvent::HtmlCandidateDone { .. } => "html_candidate_done",
        RunEvent::JudgeDone { .. } => "judge_done",
        RunEvent::ModelError { .. } => "model_error",
        RunEvent::ModelCancelled { .. } => "model_cancelled",
        RunEvent::RunCancelled { .. } => "run_cancelled",
    }
}
