//! SQLite-backed store for all harness entities.
//!
//! One connection behind a mutex: callers get a synchronous, transactional
//! API and writes from concurrent model workers serialize here. The journal
//! is write-ahead-log so readers do not block writers. Ids are client
//! generated UUID strings; timestamps are epoch milliseconds.

mod schema;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::adapter::AdapterKind;
use crate::entity::{
    Model, Problem, ProblemKind, ProblemSet, Provider, ResultStatus, Run, RunResult, RunStatus,
};

/// Error from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("run {run_id}: cannot transition from {from} to {to}")]
    InvalidTransition {
        run_id: String,
        from: String,
        to: String,
    },
    #[error("model {0} is referenced by existing runs")]
    DeleteProtected(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialize: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Partial update for one run result. `None` fields are left untouched.
#[derive(Clone, Debug, Default)]
pub struct ResultPatch {
    pub output: Option<String>,
    pub score: Option<i64>,
    pub status: Option<ResultStatus>,
    pub judged_by: Option<String>,
    pub judge_reasoning: Option<String>,
    pub cancelled_at: Option<i64>,
}

/// A run result joined with its problem's kind and prompt, as returned to
/// result listings.
#[derive(Clone, Debug, Serialize)]
pub struct RunResultRow {
    #[serde(flatten)]
    pub result: RunResult,
    pub problem_kind: ProblemKind,
    pub prompt: String,
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Opens (creating if needed) the database at `path` and self-migrates.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |r| r.get(0))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.pragma_update(None, "foreign_keys", true)?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ---- providers ----

    pub fn insert_provider(&self, p: &Provider) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO providers (id, name, kind, base_url, api_key, default_model, created_at, last_checked)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                p.id,
                p.name,
                p.kind.as_str(),
                p.base_url,
                p.api_key,
                p.default_model,
                p.created_at,
                p.last_checked
            ],
        )?;
        Ok(())
    }

    pub fn get_provider(&self, id: &str) -> Result<Provider, StoreError> {
        self.conn()
            .query_row(
                "SELECT id, name, kind, base_url, api_key, default_model, created_at, last_checked
                 FROM providers WHERE id = ?1",
                [id],
                provider_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("provider {id}")))
    }

    pub fn list_providers(&self) -> Result<Vec<Provider>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, kind, base_url, api_key, default_model, created_at, last_checked
             FROM providers ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt
            .query_map([], provider_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Records a successful connectivity probe.
    pub fn touch_provider_checked(&self, id: &str, at: i64) -> Result<(), StoreError> {
        let n = self.conn().execute(
            "UPDATE providers SET last_checked = ?1 WHERE id = ?2",
            params![at, id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(format!("provider {id}")));
        }
        Ok(())
    }

    pub fn cascade_delete_provider(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn();
        with_foreign_keys_off(&conn, |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "DELETE FROM run_results WHERE run_id IN (
                     SELECT r.id FROM runs r
                     WHERE r.judge_model_id IN (SELECT id FROM models WHERE provider_id = ?1)
                        OR EXISTS (SELECT 1 FROM models m WHERE m.provider_id = ?1
                                   AND r.model_ids LIKE '%\"' || m.id || '\"%')
                 )",
                [id],
            )?;
            tx.execute(
                "DELETE FROM runs
                 WHERE judge_model_id IN (SELECT id FROM models WHERE provider_id = ?1)
                    OR EXISTS (SELECT 1 FROM models m WHERE m.provider_id = ?1
                               AND runs.model_ids LIKE '%\"' || m.id || '\"%')",
                [id],
            )?;
            tx.execute("DELETE FROM models WHERE provider_id = ?1", [id])?;
            tx.execute("DELETE FROM providers WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(())
        })
    }

    // ---- models ----

    pub fn insert_model(&self, m: &Model) -> Result<(), StoreError> {
        let params_json = if m.params.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&m.params)?)
        };
        self.conn().execute(
            "INSERT INTO models (id, provider_id, label, model_id, params) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![m.id, m.provider_id, m.label, m.model_id, params_json],
        )?;
        Ok(())
    }

    pub fn get_model(&self, id: &str) -> Result<Model, StoreError> {
        self.conn()
            .query_row(
                "SELECT id, provider_id, label, model_id, params FROM models WHERE id = ?1",
                [id],
                model_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("model {id}")))?
    }

    /// Resolves a model to its provider row in one step.
    pub fn provider_for_model(&self, model_id: &str) -> Result<Provider, StoreError> {
        self.conn()
            .query_row(
                "SELECT p.id, p.name, p.kind, p.base_url, p.api_key, p.default_model, p.created_at, p.last_checked
                 FROM providers p JOIN models m ON m.provider_id = p.id
                 WHERE m.id = ?1",
                [model_id],
                provider_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("provider for model {model_id}")))
    }

    fn runs_referencing_model(&self, conn: &Connection, id: &str) -> Result<i64, StoreError> {
        let needle = format!("\"{id}\"");
        let n = conn.query_row(
            "SELECT COUNT(*) FROM runs WHERE judge_model_id = ?1 OR model_ids LIKE '%' || ?2 || '%'",
            params![id, needle],
            |r| r.get(0),
        )?;
        Ok(n)
    }

    /// Deletes a model; refused while any run references it as candidate or
    /// judge. Use [`Store::cascade_delete_model`] to delete those runs too.
    pub fn delete_model(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn();
        if self.runs_referencing_model(&conn, id)? > 0 {
            return Err(StoreError::DeleteProtected(id.to_string()));
        }
        let n = conn.execute("DELETE FROM models WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(StoreError::NotFound(format!("model {id}")));
        }
        Ok(())
    }

    pub fn cascade_delete_model(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn();
        with_foreign_keys_off(&conn, |conn| {
            let tx = conn.unchecked_transaction()?;
            let needle = format!("\"{id}\"");
            tx.execute(
                "DELETE FROM run_results WHERE run_id IN (
                     SELECT id FROM runs WHERE judge_model_id = ?1 OR model_ids LIKE '%' || ?2 || '%'
                 )",
                params![id, needle],
            )?;
            tx.execute(
                "DELETE FROM runs WHERE judge_model_id = ?1 OR model_ids LIKE '%' || ?2 || '%'",
                params![id, needle],
            )?;
            tx.execute("DELETE FROM models WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(())
        })
    }

    // ---- problem sets / problems ----

    pub fn insert_problem_set(&self, s: &ProblemSet) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO problem_sets (id, name, description, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![s.id, s.name, s.description, s.created_at],
        )?;
        Ok(())
    }

    pub fn get_problem_set(&self, id: &str) -> Result<ProblemSet, StoreError> {
        self.conn()
            .query_row(
                "SELECT id, name, description, created_at FROM problem_sets WHERE id = ?1",
                [id],
                |r| {
                    Ok(ProblemSet {
                        id: r.get(0)?,
                        name: r.get(1)?,
                        description: r.get(2)?,
                        created_at: r.get(3)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("problem set {id}")))
    }

    pub fn insert_problem(&self, p: &Problem) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO problems (id, problem_set_id, kind, prompt, expected, html_assets, hints, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                p.id,
                p.problem_set_id,
                p.kind.as_str(),
                p.prompt,
                p.expected,
                p.html_assets,
                p.hints,
                p.created_at
            ],
        )?;
        Ok(())
    }

    /// Problems of a set in their authoritative order: `created_at` ascending,
    /// id as tiebreak.
    pub fn problems_for_set(&self, set_id: &str) -> Result<Vec<Problem>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, problem_set_id, kind, prompt, expected, html_assets, hints, created_at
             FROM problems WHERE problem_set_id = ?1 ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt
            .query_map([set_id], problem_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().collect()
    }

    pub fn cascade_delete_problem_set(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn();
        with_foreign_keys_off(&conn, |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "DELETE FROM run_results WHERE run_id IN (SELECT id FROM runs WHERE problem_set_id = ?1)",
                [id],
            )?;
            tx.execute("DELETE FROM runs WHERE problem_set_id = ?1", [id])?;
            tx.execute("DELETE FROM problems WHERE problem_set_id = ?1", [id])?;
            tx.execute("DELETE FROM problem_sets WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(())
        })
    }

    // ---- runs ----

    pub fn insert_run(&self, run: &Run) -> Result<(), StoreError> {
        let model_ids = serde_json::to_string(&run.model_ids)?;
        self.conn().execute(
            "INSERT INTO runs (id, name, problem_set_id, model_ids, judge_model_id, status, stream,
                               created_at, cancelled_at, cancelled_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                run.id,
                run.name,
                run.problem_set_id,
                model_ids,
                run.judge_model_id,
                run.status.as_str(),
                run.stream,
                run.created_at,
                run.cancelled_at,
                run.cancelled_by
            ],
        )?;
        Ok(())
    }

    pub fn get_run(&self, id: &str) -> Result<Run, StoreError> {
        self.conn()
            .query_row(
                "SELECT id, name, problem_set_id, model_ids, judge_model_id, status, stream,
                        created_at, cancelled_at, cancelled_by
                 FROM runs WHERE id = ?1",
                [id],
                run_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("run {id}")))?
    }

    /// Recent runs, newest first. `limit` defaults to 50 and caps at 200.
    pub fn list_runs(
        &self,
        status: Option<RunStatus>,
        problem_set_id: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Run>, StoreError> {
        let limit = limit.unwrap_or(50).min(200);
        let mut sql = String::from(
            "SELECT id, name, problem_set_id, model_ids, judge_model_id, status, stream,
                    created_at, cancelled_at, cancelled_by
             FROM runs",
        );
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(s) = status {
            values.push(Box::new(s.as_str().to_string()));
            clauses.push(format!("status = ?{}", values.len()));
        }
        if let Some(set) = problem_set_id {
            values.push(Box::new(set.to_string()));
            clauses.push(format!("problem_set_id = ?{}", values.len()));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        values.push(Box::new(limit as i64));
        sql.push_str(&format!(
            " ORDER BY created_at DESC, id DESC LIMIT ?{}",
            values.len()
        ));

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
                run_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().collect()
    }

    /// Moves a run to `to` only when its current status is in `from`.
    pub fn transition_run_status(
        &self,
        run_id: &str,
        from: &[RunStatus],
        to: RunStatus,
    ) -> Result<(), StoreError> {
        let allowed = from
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        let conn = self.conn();
        let n = conn.execute(
            &format!("UPDATE runs SET status = ?1 WHERE id = ?2 AND status IN ({allowed})"),
            params![to.as_str(), run_id],
        )?;
        if n == 0 {
            let current: Option<String> = conn
                .query_row("SELECT status FROM runs WHERE id = ?1", [run_id], |r| {
                    r.get(0)
                })
                .optional()?;
            return match current {
                None => Err(StoreError::NotFound(format!("run {run_id}"))),
                Some(from) => Err(StoreError::InvalidTransition {
                    run_id: run_id.to_string(),
                    from,
                    to: to.as_str().to_string(),
                }),
            };
        }
        Ok(())
    }

    /// Completes a running run unless a cancellation stamp has landed.
    /// Returns false when the stamp won; the caller settles the run as
    /// cancelled instead. Keeps a run from ending `completed` when the
    /// cancel arrived after the scheduler's last token check.
    pub fn complete_run_unless_cancelled(&self, run_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn();
        let n = conn.execute(
            "UPDATE runs SET status = 'completed'
             WHERE id = ?1 AND status = 'running' AND cancelled_at IS NULL",
            [run_id],
        )?;
        if n == 1 {
            return Ok(true);
        }
        let row: Option<(String, bool)> = conn
            .query_row(
                "SELECT status, cancelled_at IS NOT NULL FROM runs WHERE id = ?1",
                [run_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        match row {
            None => Err(StoreError::NotFound(format!("run {run_id}"))),
            Some((status, true)) if status == "running" => Ok(false),
            Some((status, _)) => Err(StoreError::InvalidTransition {
                run_id: run_id.to_string(),
                from: status,
                to: "completed".to_string(),
            }),
        }
    }

    /// Records who cancelled a run and when; the status transition is done
    /// separately by the scheduler when the workers have drained.
    pub fn stamp_run_cancelled(&self, run_id: &str, by: &str, at: i64) -> Result<(), StoreError> {
        let n = self.conn().execute(
            "UPDATE runs SET cancelled_at = ?1, cancelled_by = ?2 WHERE id = ?3",
            params![at, by, run_id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(format!("run {run_id}")));
        }
        Ok(())
    }

    /// Clears a leftover cancellation stamp. Re-execution must not inherit
    /// the stamp of an earlier, already-settled cancellation.
    pub fn clear_run_cancellation(&self, run_id: &str) -> Result<(), StoreError> {
        self.conn().execute(
            "UPDATE runs SET cancelled_at = NULL, cancelled_by = NULL WHERE id = ?1",
            [run_id],
        )?;
        Ok(())
    }

    // ---- results ----

    pub fn insert_result(&self, r: &RunResult) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO run_results (id, run_id, problem_id, model_id, output, score, status,
                                      judged_by, judge_reasoning, created_at, cancelled_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                r.id,
                r.run_id,
                r.problem_id,
                r.model_id,
                r.output,
                r.score,
                r.status.as_str(),
                r.judged_by,
                r.judge_reasoning,
                r.created_at,
                r.cancelled_at
            ],
        )?;
        Ok(())
    }

    pub fn get_result(&self, id: &str) -> Result<RunResult, StoreError> {
        self.conn()
            .query_row(
                "SELECT id, run_id, problem_id, model_id, output, score, status, judged_by,
                        judge_reasoning, created_at, cancelled_at
                 FROM run_results WHERE id = ?1",
                [id],
                result_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("result {id}")))?
    }

    /// A result together with the kind of its problem (manual review needs to
    /// check the problem is html).
    pub fn get_result_with_kind(&self, id: &str) -> Result<(RunResult, ProblemKind), StoreError> {
        let row = self
            .conn()
            .query_row(
                "SELECT r.id, r.run_id, r.problem_id, r.model_id, r.output, r.score, r.status,
                        r.judged_by, r.judge_reasoning, r.created_at, r.cancelled_at, p.kind
                 FROM run_results r JOIN problems p ON p.id = r.problem_id
                 WHERE r.id = ?1",
                [id],
                |r| {
                    let result = result_from_row(r)?;
                    let kind: String = r.get(11)?;
                    Ok((result, kind))
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("result {id}")))?;
        let (result, kind) = row;
        let result = result?;
        let kind = ProblemKind::parse(&kind)
            .ok_or_else(|| StoreError::Corrupt(format!("problem kind {kind}")))?;
        Ok((result, kind))
    }

    /// Partially updates a result. No-op when the patch is empty.
    pub fn mark_result(&self, result_id: &str, patch: &ResultPatch) -> Result<(), StoreError> {
        let mut sets: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(ref v) = patch.output {
            values.push(Box::new(v.clone()));
            sets.push(format!("output = ?{}", values.len()));
        }
        if let Some(v) = patch.score {
            values.push(Box::new(v));
            sets.push(format!("score = ?{}", values.len()));
        }
        if let Some(v) = patch.status {
            values.push(Box::new(v.as_str().to_string()));
            sets.push(format!("status = ?{}", values.len()));
        }
        if let Some(ref v) = patch.judged_by {
            values.push(Box::new(v.clone()));
            sets.push(format!("judged_by = ?{}", values.len()));
        }
        if let Some(ref v) = patch.judge_reasoning {
            values.push(Box::new(v.clone()));
            sets.push(format!("judge_reasoning = ?{}", values.len()));
        }
        if let Some(v) = patch.cancelled_at {
            values.push(Box::new(v));
            sets.push(format!("cancelled_at = ?{}", values.len()));
        }
        if sets.is_empty() {
            return Ok(());
        }
        values.push(Box::new(result_id.to_string()));
        let sql = format!(
            "UPDATE run_results SET {} WHERE id = ?{}",
            sets.join(", "),
            values.len()
        );
        let n = self.conn().execute(
            &sql,
            rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(format!("result {result_id}")));
        }
        Ok(())
    }

    /// All results of a run joined with problem kind and prompt, oldest first.
    pub fn results_for_run(&self, run_id: &str) -> Result<Vec<RunResultRow>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT r.id, r.run_id, r.problem_id, r.model_id, r.output, r.score, r.status,
                    r.judged_by, r.judge_reasoning, r.created_at, r.cancelled_at, p.kind, p.prompt
             FROM run_results r JOIN problems p ON p.id = r.problem_id
             WHERE r.run_id = ?1 ORDER BY r.created_at ASC, r.id ASC",
        )?;
        let rows = stmt
            .query_map([run_id], |r| {
                let result = result_from_row(r)?;
                let kind: String = r.get(11)?;
                let prompt: String = r.get(12)?;
                Ok((result, kind, prompt))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(result, kind, prompt)| {
                let result = result?;
                let problem_kind = ProblemKind::parse(&kind)
                    .ok_or_else(|| StoreError::Corrupt(format!("problem kind {kind}")))?;
                Ok(RunResultRow {
                    result,
                    problem_kind,
                    prompt,
                })
            })
            .collect()
    }

    /// Clears results of a run. Re-executing an errored run starts from a
    /// clean result set under the same run id.
    pub fn delete_results_for_run(&self, run_id: &str) -> Result<(), StoreError> {
        self.conn()
            .execute("DELETE FROM run_results WHERE run_id = ?1", [run_id])?;
        Ok(())
    }
}

/// Runs `body` with `PRAGMA foreign_keys` off, re-enabling it on all exit
/// paths before the result is returned.
fn with_foreign_keys_off<T>(
    conn: &Connection,
    body: impl FnOnce(&Connection) -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    conn.pragma_update(None, "foreign_keys", false)?;
    let result = body(conn);
    let restore = conn.pragma_update(None, "foreign_keys", true);
    let value = result?;
    restore?;
    Ok(value)
}

// Row mappers. Enum parse failures surface as StoreError::Corrupt via the
// nested Result, because rusqlite's row mapper only speaks rusqlite::Error.

fn provider_from_row(r: &Row<'_>) -> rusqlite::Result<Provider> {
    let kind: String = r.get(2)?;
    Ok(Provider {
        id: r.get(0)?,
        name: r.get(1)?,
        kind: AdapterKind::normalize(&kind),
        base_url: r.get(3)?,
        api_key: r.get(4)?,
        default_model: r.get(5)?,
        created_at: r.get(6)?,
        last_checked: r.get(7)?,
    })
}

fn model_from_row(r: &Row<'_>) -> rusqlite::Result<Result<Model, StoreError>> {
    let params_json: Option<String> = r.get(4)?;
    let params = match params_json {
        None => Ok(BTreeMap::new()),
        Some(ref s) => serde_json::from_str(s).map_err(StoreError::from),
    };
    let (id, provider_id, label, model_id) =
        (r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?);
    Ok(params.map(|params| Model {
        id,
        provider_id,
        label,
        model_id,
        params,
    }))
}

fn problem_from_row(r: &Row<'_>) -> rusqlite::Result<Result<Problem, StoreError>> {
    let kind: String = r.get(2)?;
    let parsed = ProblemKind::parse(&kind)
        .ok_or_else(|| StoreError::Corrupt(format!("problem kind {kind}")));
    let (id, problem_set_id, prompt, expected, html_assets, hints, created_at) = (
        r.get(0)?,
        r.get(1)?,
        r.get(3)?,
        r.get(4)?,
        r.get(5)?,
        r.get(6)?,
        r.get(7)?,
    );
    Ok(parsed.map(|kind| Problem {
        id,
        problem_set_id,
        kind,
        prompt,
        expected,
        html_assets,
        hints,
        created_at,
    }))
}

fn run_from_row(r: &Row<'_>) -> rusqlite::Result<Result<Run, StoreError>> {
    let model_ids_json: String = r.get(3)?;
    let status_str: String = r.get(5)?;
    let model_ids: Result<Vec<String>, StoreError> =
        serde_json::from_str(&model_ids_json).map_err(StoreError::from);
    let status = RunStatus::parse(&status_str)
        .ok_or_else(|| StoreError::Corrupt(format!("run status {status_str}")));
    let (id, name, problem_set_id, judge_model_id, stream, created_at, cancelled_at, cancelled_by) = (
        r.get(0)?,
        r.get(1)?,
        r.get(2)?,
        r.get(4)?,
        r.get(6)?,
        r.get(7)?,
        r.get(8)?,
        r.get(9)?,
    );
    Ok(model_ids.and_then(|model_ids| {
        status.map(|status| Run {
            id,
            name,
            problem_set_id,
            model_ids,
            judge_model_id,
            status,
            stream,
            created_at,
            cancelled_at,
            cancelled_by,
        })
    }))
}

fn result_from_row(r: &Row<'_>) -> rusqlite::Result<Result<RunResult, StoreError>> {
    let status_str: String = r.get(6)?;
    let status = ResultStatus::parse(&status_str)
        .ok_or_else(|| StoreError::Corrupt(format!("result status {status_str}")));
    let (
        id,
        run_id,
        problem_id,
        model_id,
        output,
        score,
        judged_by,
        judge_reasoning,
        created_at,
        cancelled_at,
    ) = (
        r.get(0)?,
        r.get(1)?,
        r.get(2)?,
        r.get(3)?,
        r.get(4)?,
        r.get(5)?,
        r.get(7)?,
        r.get(8)?,
        r.get(9)?,
        r.get(10)?,
    );
    Ok(status.map(|status| RunResult {
        id,
        run_id,
        problem_id,
        model_id,
        output,
        score,
        status,
        judged_by,
        judge_reasoning,
        created_at,
        cancelled_at,
    }))
}
