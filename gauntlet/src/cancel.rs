//! Hierarchical cancel tokens keyed by run and (run, model).
//!
//! Model tokens are children of their run token, so cancelling a run reaches
//! every in-flight HTTP read without walking the registry; the explicit walk
//! in [`CancelRegistry::cancel_run`] also covers model tokens registered
//! against a run whose token was already replaced.

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct CancelRegistry {
    runs: DashMap<String, CancellationToken>,
    models: DashMap<(String, String), CancellationToken>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or returns) the run-level token.
    pub fn register_run(&self, run_id: &str) -> CancellationToken {
        self.runs
            .entry(run_id.to_string())
            .or_insert_with(CancellationToken::new)
            .clone()
    }

    /// Registers a token for one model worker, as a child of the run token.
    pub fn register_model(&self, run_id: &str, model_id: &str) -> CancellationToken {
        let parent = self.register_run(run_id);
        self.models
            .entry((run_id.to_string(), model_id.to_string()))
            .or_insert_with(|| parent.child_token())
            .clone()
    }

    /// Triggers the run token and every model token registered under the run.
    /// Returns false when the run has no registered token.
    pub fn cancel_run(&self, run_id: &str) -> bool {
        let Some(token) = self.runs.get(run_id) else {
            return false;
        };
        token.cancel();
        for entry in self.models.iter() {
            if entry.key().0 == run_id {
                entry.value().cancel();
            }
        }
        true
    }

    /// Triggers one model worker's token; the rest of the run keeps going.
    pub fn cancel_model(&self, run_id: &str, model_id: &str) -> bool {
        match self
            .models
            .get(&(run_id.to_string(), model_id.to_string()))
        {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Clears all entries for a run on terminal transition.
    pub fn remove_run(&self, run_id: &str) {
        self.runs.remove(run_id);
        self.models.retain(|(rid, _), _| rid != run_id);
    }

    pub fn run_token(&self, run_id: &str) -> Option<CancellationToken> {
        self.runs.get(run_id).map(|t| t.clone())
    }
}
