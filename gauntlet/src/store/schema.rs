//! Schema creation and self-migration.
//!
//! `migrate` runs at open: creates tables when absent, then verifies the
//! columns that were added after the first release and `ALTER TABLE`s them in
//! with safe defaults. Older database files keep working without a tool.

use rusqlite::Connection;

use crate::entity::now_ms;
use crate::store::StoreError;

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS providers (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    base_url TEXT NOT NULL,
    api_key TEXT,
    default_model TEXT,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS models (
    id TEXT PRIMARY KEY,
    provider_id TEXT NOT NULL REFERENCES providers(id),
    label TEXT NOT NULL,
    model_id TEXT NOT NULL,
    params TEXT
);

CREATE TABLE IF NOT EXISTS problem_sets (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS problems (
    id TEXT PRIMARY KEY,
    problem_set_id TEXT NOT NULL REFERENCES problem_sets(id),
    kind TEXT NOT NULL,
    prompt TEXT NOT NULL,
    expected TEXT,
    html_assets TEXT,
    hints TEXT
);

CREATE TABLE IF NOT EXISTS runs (
    id TEXT PRIMARY KEY,
    name TEXT,
    problem_set_id TEXT NOT NULL REFERENCES problem_sets(id),
    model_ids TEXT NOT NULL,
    judge_model_id TEXT NOT NULL REFERENCES models(id),
    status TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS run_results (
    id TEXT PRIMARY KEY,
    run_id TEXT NOT NULL REFERENCES runs(id),
    problem_id TEXT NOT NULL REFERENCES problems(id),
    model_id TEXT NOT NULL,
    output TEXT,
    score INTEGER,
    status TEXT NOT NULL,
    judged_by TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_problems_set ON problems(problem_set_id);
CREATE INDEX IF NOT EXISTS idx_runs_set ON runs(problem_set_id);
CREATE INDEX IF NOT EXISTS idx_run_results_run ON run_results(run_id);
"#;

/// Columns added after the first schema version: (table, column, declaration).
const OPTIONAL_COLUMNS: &[(&str, &str, &str)] = &[
    ("runs", "stream", "stream INTEGER NOT NULL DEFAULT 0"),
    ("runs", "cancelled_at", "cancelled_at INTEGER"),
    ("runs", "cancelled_by", "cancelled_by TEXT"),
    ("providers", "last_checked", "last_checked INTEGER"),
    ("problems", "created_at", "created_at INTEGER NOT NULL DEFAULT 0"),
    ("run_results", "judge_reasoning", "judge_reasoning TEXT"),
    ("run_results", "cancelled_at", "cancelled_at INTEGER"),
];

pub(super) fn migrate(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(CREATE_TABLES)?;
    for (table, column, decl) in OPTIONAL_COLUMNS {
        ensure_column(conn, table, column, decl)?;
    }
    // Rows written before problems.created_at existed got the 0 default; give
    // them a real timestamp so ordering stays total.
    conn.execute(
        "UPDATE problems SET created_at = ?1 WHERE created_at = 0",
        [now_ms()],
    )?;
    Ok(())
}

fn ensure_column(
    conn: &Connection,
    table: &str,
    column: &str,
    decl: &str,
) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    if names.iter().any(|n| n == column) {
        return Ok(());
    }
    tracing::info!(table, column, "adding missing column");
    conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {decl}"), [])?;
    Ok(())
}
