//! SQLite-based persistence store

use crate::core::ExecutionStatus;
use crate::persistence::{ExecutionSummary, PersistenceBackend, StepSummary};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS executions (
        id TEXT PRIMARY KEY,
        pipeline_name TEXT NOT NULL,
        branch TEXT,
        status TEXT NOT NULL,
        started_at TEXT NOT NULL,
        completed_at TEXT,
        progress REAL NOT NULL DEFAULT 0.0,
        completed_steps INTEGER NOT NULL DEFAULT 0,
        total_steps INTEGER NOT NULL DEFAULT 0,
        failed_step INTEGER,
        error TEXT,
        artifacts TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS step_results (
        execution_id TEXT NOT NULL REFERENCES executions(id) ON DELETE CASCADE,
        idx INTEGER NOT NULL,
        step_id TEXT NOT NULL,
        state TEXT NOT NULL,
        exit_code INTEGER,
        duration_ms INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (execution_id, idx)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_pipeline_name ON executions(pipeline_name)",
    "CREATE INDEX IF NOT EXISTS idx_started_at ON executions(started_at)",
];

const SELECT_EXECUTION: &str = r#"
    SELECT id, pipeline_name, branch, status, started_at, completed_at, progress,
           completed_steps, total_steps, failed_step, error, artifacts
    FROM executions
"#;

/// SQLite execution store
pub struct SqliteExecutionStore {
    pool: SqlitePool,
}

impl SqliteExecutionStore {
    /// Open (creating if needed) the database at `db_path`
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {}", db_path.as_ref().display()))?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Private in-memory database; lives as long as the store
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("branchline");
        std::fs::create_dir_all(&db_dir)
            .with_context(|| format!("Failed to create {}", db_dir.display()))?;

        Self::new(db_dir.join("executions.db")).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to initialize schema")?;
        }
        Ok(())
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    /// Convert NaiveDateTime to DateTime<Utc>
    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn summary_from_row(row: &SqliteRow) -> Result<ExecutionSummary> {
        let status: String = row.get("status");
        let artifacts: String = row.get("artifacts");

        Ok(ExecutionSummary {
            execution_id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            pipeline_name: row.get("pipeline_name"),
            branch: row.get("branch"),
            status: ExecutionStatus::parse(&status)
                .with_context(|| format!("Unknown execution status '{}'", status))?,
            started_at: Self::from_naive(row.get("started_at")),
            completed_at: row
                .get::<Option<NaiveDateTime>, _>("completed_at")
                .map(Self::from_naive),
            progress: row.get("progress"),
            completed_steps: row.get::<i64, _>("completed_steps") as usize,
            total_steps: row.get::<i64, _>("total_steps") as usize,
            failed_step: row.get::<Option<i64>, _>("failed_step").map(|i| i as usize),
            error: row.get("error"),
            artifacts: serde_json::from_str(&artifacts).context("Corrupt artifact list")?,
            steps: Vec::new(),
        })
    }

    async fn load_steps(&self, execution_id: Uuid) -> Result<Vec<StepSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT idx, step_id, state, exit_code, duration_ms
            FROM step_results
            WHERE execution_id = ?1
            ORDER BY idx ASC
            "#,
        )
        .bind(execution_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to load step results")?;

        Ok(rows
            .iter()
            .map(|row| StepSummary {
                index: row.get::<i64, _>("idx") as usize,
                step_id: row.get("step_id"),
                state: row.get("state"),
                exit_code: row.get::<Option<i64>, _>("exit_code").map(|c| c as i32),
                duration_ms: row.get("duration_ms"),
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteExecutionStore {
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO executions
            (id, pipeline_name, branch, status, started_at, completed_at, progress,
             completed_steps, total_steps, failed_step, error, artifacts)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(execution.execution_id.to_string())
        .bind(&execution.pipeline_name)
        .bind(&execution.branch)
        .bind(execution.status.as_str())
        .bind(Self::to_naive(execution.started_at))
        .bind(execution.completed_at.map(Self::to_naive))
        .bind(execution.progress)
        .bind(execution.completed_steps as i64)
        .bind(execution.total_steps as i64)
        .bind(execution.failed_step.map(|i| i as i64))
        .bind(&execution.error)
        .bind(serde_json::to_string(&execution.artifacts)?)
        .execute(&mut *tx)
        .await
        .context("Failed to save execution")?;

        sqlx::query("DELETE FROM step_results WHERE execution_id = ?1")
            .bind(execution.execution_id.to_string())
            .execute(&mut *tx)
            .await?;

        for step in &execution.steps {
            sqlx::query(
                r#"
                INSERT INTO step_results (execution_id, idx, step_id, state, exit_code, duration_ms)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(execution.execution_id.to_string())
            .bind(step.index as i64)
            .bind(&step.step_id)
            .bind(&step.state)
            .bind(step.exit_code)
            .bind(step.duration_ms)
            .execute(&mut *tx)
            .await
            .context("Failed to save step result")?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>> {
        let row = sqlx::query(&format!("{} WHERE id = ?1", SELECT_EXECUTION))
            .bind(execution_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load execution")?;

        match row {
            Some(row) => {
                let mut summary = Self::summary_from_row(&row)?;
                summary.steps = self.load_steps(execution_id).await?;
                Ok(Some(summary))
            }
            None => Ok(None),
        }
    }

    async fn list_executions(&self, pipeline_name: &str) -> Result<Vec<ExecutionSummary>> {
        let rows = sqlx::query(&format!(
            "{} WHERE pipeline_name = ?1 ORDER BY started_at DESC",
            SELECT_EXECUTION
        ))
        .bind(pipeline_name)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list executions")?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut summary = Self::summary_from_row(row)?;
            summary.steps = self.load_steps(summary.execution_id).await?;
            summaries.push(summary);
        }
        Ok(summaries)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT pipeline_name
            FROM executions
            ORDER BY pipeline_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list pipelines")?;

        Ok(rows.iter().map(|row| row.get("pipeline_name")).collect())
    }
}
