/*!
SQLite checkpointer

Async implementation of the [`Checkpointer`] trait over a `sqlx` connection
pool. One row per step keeps the full history append-only; `load_latest`
reads the newest row for crash recovery and resume.

- Uses the serde persistence models (see [`super::persistence`]) for
  encoding state, the pending interrupt, and the next node.
- When the `sqlite-migrations` feature is enabled (default), embedded
  migrations (`sqlx::migrate!("./migrations")`) run on connect; disabling
  the feature assumes external migration orchestration.
- The pool is shared with [`SqliteRateStore`](crate::ratelimit::SqliteRateStore)
  so rate counters live in the same database file.
*/

use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tracing::instrument;

use crate::runtimes::checkpointer::{Checkpoint, Checkpointer, CheckpointerError, Result};
use crate::runtimes::persistence::{from_json_str, to_json_string, PersistedCheckpoint};

#[derive(Debug, Error, Diagnostic)]
pub enum SqliteCheckpointerError {
    #[error("sqlx error: {0}")]
    #[diagnostic(
        code(codeloom::sqlite::sqlx),
        help("Ensure the SQLite database URL is valid and accessible.")
    )]
    Sqlx(#[from] sqlx::Error),

    #[error("JSON serialization error: {0}")]
    #[diagnostic(
        code(codeloom::sqlite::serde),
        help("Check serialized checkpoint shapes.")
    )]
    Serde(String),

    #[error("migration error: {0}")]
    #[diagnostic(code(codeloom::sqlite::migrate))]
    Migrate(String),
}

impl From<SqliteCheckpointerError> for CheckpointerError {
    fn from(e: SqliteCheckpointerError) -> Self {
        match e {
            SqliteCheckpointerError::Sqlx(err) => CheckpointerError::Backend {
                message: err.to_string(),
            },
            SqliteCheckpointerError::Serde(message) => CheckpointerError::Serde { message },
            SqliteCheckpointerError::Migrate(message) => CheckpointerError::Backend { message },
        }
    }
}

/// SQLite-backed checkpointer with full step history.
///
/// Storage grows roughly with `(runs × steps_per_run × state_size)`; plan
/// periodic cleanup of terminal runs for long-lived deployments, e.g.:
///
/// ```bash
/// sqlite3 codeloom.db "DELETE FROM checkpoints WHERE created_at < datetime('now', '-30 days')"
/// sqlite3 codeloom.db "VACUUM"
/// ```
pub struct SqliteCheckpointer {
    pool: Arc<SqlitePool>,
}

impl std::fmt::Debug for SqliteCheckpointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCheckpointer").finish()
    }
}

impl SqliteCheckpointer {
    /// Connect (or create) a SQLite database at `database_url`, e.g.
    /// `"sqlite://codeloom.db"`.
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> std::result::Result<Self, CheckpointerError> {
        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(SqliteCheckpointerError::Sqlx)?;

        #[cfg(feature = "sqlite-migrations")]
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| SqliteCheckpointerError::Migrate(e.to_string()))?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Shared pool, for co-located stores (rate counters).
    #[must_use]
    pub fn pool(&self) -> Arc<SqlitePool> {
        Arc::clone(&self.pool)
    }

    fn row_to_checkpoint(row: &sqlx::sqlite::SqliteRow) -> Result<Checkpoint> {
        let payload: String = row.get("payload_json");
        let persisted: PersistedCheckpoint = from_json_str(&payload)
            .map_err(|e| SqliteCheckpointerError::Serde(e.to_string()))?;
        Ok(Checkpoint::from(persisted))
    }
}

#[async_trait]
impl Checkpointer for SqliteCheckpointer {
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        let persisted = PersistedCheckpoint::from(&checkpoint);
        let payload = to_json_string(&persisted)
            .map_err(|e| SqliteCheckpointerError::Serde(e.to_string()))?;

        sqlx::query(
            "INSERT INTO runs (run_id, updated_at) VALUES (?1, datetime('now')) \
             ON CONFLICT(run_id) DO UPDATE SET updated_at = datetime('now')",
        )
        .bind(&checkpoint.run_id)
        .execute(&*self.pool)
        .await
        .map_err(SqliteCheckpointerError::Sqlx)?;

        sqlx::query(
            "INSERT INTO checkpoints (run_id, step, payload_json, created_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(run_id, step) DO UPDATE SET payload_json = excluded.payload_json",
        )
        .bind(&checkpoint.run_id)
        .bind(checkpoint.step as i64)
        .bind(&payload)
        .bind(persisted.created_at)
        .execute(&*self.pool)
        .await
        .map_err(SqliteCheckpointerError::Sqlx)?;

        Ok(())
    }

    async fn load_latest(&self, run_id: &str) -> Result<Option<Checkpoint>> {
        let row = sqlx::query(
            "SELECT payload_json FROM checkpoints WHERE run_id = ?1 \
             ORDER BY step DESC LIMIT 1",
        )
        .bind(run_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(SqliteCheckpointerError::Sqlx)?;

        row.as_ref().map(Self::row_to_checkpoint).transpose()
    }

    async fn history(&self, run_id: &str) -> Result<Vec<Checkpoint>> {
        let rows = sqlx::query(
            "SELECT payload_json FROM checkpoints WHERE run_id = ?1 ORDER BY step ASC",
        )
        .bind(run_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(SqliteCheckpointerError::Sqlx)?;

        rows.iter().map(Self::row_to_checkpoint).collect()
    }
}
