//! Postgres-backed analytics store.
//!
//! This module persists the raw event log and the reduced analytics records
//! in PostgreSQL. Claims are taken with a single conditional `UPDATE`, which
//! re-evaluates its predicate under row locks, so two workers issuing claims
//! concurrently partition the pending set instead of double-claiming it.
//! Reduction batches are committed inside a transaction.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `StoreError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Concurrent writer hit the same key |
//! | Database (other) | Any other | `Backend` | Constraint or engine failure |
//! | PoolClosed | N/A | `Backend` | Connection pool was shut down |
//! | ColumnDecode / Decode | N/A | `Serialization` | Row did not match the expected shape |
//! | Other | N/A | `Backend` | Network errors, connection failures, etc. |

use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{instrument, Span};

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use sparkwatch_analytics::{JobRecord, RawEvent, TaskRecord};
use sparkwatch_core::JobStatus;

use super::r#trait::{AnalyticsStore, ReductionBatch, StoreError};

/// Postgres-backed analytics store.
///
/// ## Thread Safety
///
/// Uses the SQLx connection pool, which handles thread-safe connection
/// management; the store itself is cheap to clone and share.
#[derive(Debug, Clone)]
pub struct PostgresAnalyticsStore {
    pool: Arc<PgPool>,
}

impl PostgresAnalyticsStore {
    /// Create a new store from an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the tables and indexes this store needs if they do not exist.
    ///
    /// Safe to call on every startup.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS raw_events (
                id BIGSERIAL PRIMARY KEY,
                job_id BIGINT NOT NULL,
                event_type TEXT NOT NULL,
                payload JSONB NOT NULL,
                processed BOOLEAN NOT NULL DEFAULT FALSE,
                claimed_by TEXT
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS raw_events_pending_idx
                ON raw_events (id) WHERE NOT processed
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS job_analytics (
                job_id BIGINT PRIMARY KEY,
                "user" TEXT,
                start_time TEXT,
                end_time TEXT,
                status TEXT
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS job_analytics_start_time_idx
                ON job_analytics (start_time)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS task_analytics (
                task_id TEXT NOT NULL,
                job_id BIGINT NOT NULL,
                timestamp TEXT,
                duration_ms BIGINT,
                successful BOOLEAN NOT NULL DEFAULT TRUE,
                PRIMARY KEY (task_id, job_id)
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS task_analytics_task_id_idx
                ON task_analytics (task_id)
            "#,
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl AnalyticsStore for PostgresAnalyticsStore {
    #[instrument(skip(self, payload), fields(event_id), err)]
    async fn insert_raw_event(
        &self,
        job_id: i64,
        event_type: &str,
        payload: JsonValue,
    ) -> Result<RawEvent, StoreError> {
        let row: RawEventRow = sqlx::query_as(
            r#"
            INSERT INTO raw_events (job_id, event_type, payload)
            VALUES ($1, $2, $3)
            RETURNING id, job_id, event_type, payload, processed, claimed_by
            "#,
        )
        .bind(job_id)
        .bind(event_type)
        .bind(&payload)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_raw_event", e))?;

        Span::current().record("event_id", row.id);
        Ok(row.into())
    }

    #[instrument(skip(self), fields(claimed), err)]
    async fn claim_unprocessed(&self, worker: &str) -> Result<Vec<RawEvent>, StoreError> {
        // The UPDATE re-checks `claimed_by` after any row-lock wait, so a
        // batch claimed by a concurrent worker in the meantime is skipped.
        let rows: Vec<RawEventRow> = sqlx::query_as(
            r#"
            UPDATE raw_events
            SET claimed_by = $1
            WHERE processed = FALSE
              AND (claimed_by IS NULL OR claimed_by = $1)
            RETURNING id, job_id, event_type, payload, processed, claimed_by
            "#,
        )
        .bind(worker)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("claim_unprocessed", e))?;

        Span::current().record("claimed", rows.len());

        let mut events: Vec<RawEvent> = rows.into_iter().map(RawEvent::from).collect();
        // RETURNING does not guarantee ordering; restore arrival order.
        events.sort_by_key(|e| e.id);
        Ok(events)
    }

    #[instrument(skip(self), err)]
    async fn release_claims(&self, worker: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE raw_events
            SET claimed_by = NULL
            WHERE processed = FALSE AND claimed_by = $1
            "#,
        )
        .bind(worker)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("release_claims", e))?;
        Ok(())
    }

    #[instrument(
        skip(self, batch),
        fields(
            jobs = batch.jobs.len(),
            tasks = batch.tasks.len(),
            events = batch.processed_event_ids.len()
        ),
        err
    )]
    async fn commit_reduction(&self, batch: ReductionBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        // A transaction keeps the record upserts and the processed-flag flips
        // atomic; on any error the early return drops the transaction and
        // Postgres rolls it back.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        for job in &batch.jobs {
            sqlx::query(
                r#"
                INSERT INTO job_analytics (job_id, "user", start_time, end_time, status)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (job_id) DO UPDATE SET
                    "user" = EXCLUDED."user",
                    start_time = EXCLUDED.start_time,
                    end_time = EXCLUDED.end_time,
                    status = EXCLUDED.status
                "#,
            )
            .bind(job.job_id)
            .bind(&job.user)
            .bind(&job.start_time)
            .bind(&job.end_time)
            .bind(job.status.map(|s| s.as_str().to_string()))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("upsert_job", e))?;
        }

        for task in &batch.tasks {
            sqlx::query(
                r#"
                INSERT INTO task_analytics (task_id, job_id, timestamp, duration_ms, successful)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (task_id, job_id) DO UPDATE SET
                    timestamp = EXCLUDED.timestamp,
                    duration_ms = EXCLUDED.duration_ms,
                    successful = EXCLUDED.successful
                "#,
            )
            .bind(&task.task_id)
            .bind(task.job_id)
            .bind(&task.timestamp)
            .bind(task.duration_ms)
            .bind(task.successful)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("upsert_task", e))?;
        }

        if !batch.processed_event_ids.is_empty() {
            sqlx::query(
                r#"
                UPDATE raw_events
                SET processed = TRUE, claimed_by = NULL
                WHERE id = ANY($1)
                "#,
            )
            .bind(&batch.processed_event_ids)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("mark_processed", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self), err)]
    async fn get_job(&self, job_id: i64) -> Result<Option<JobRecord>, StoreError> {
        let row: Option<JobRow> = sqlx::query_as(
            r#"
            SELECT job_id, "user", start_time, end_time, status
            FROM job_analytics
            WHERE job_id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_job", e))?;

        row.map(JobRecord::try_from).transpose()
    }

    #[instrument(skip(self), err)]
    async fn get_task(
        &self,
        task_id: &str,
        job_id: i64,
    ) -> Result<Option<TaskRecord>, StoreError> {
        let row: Option<TaskRow> = sqlx::query_as(
            r#"
            SELECT task_id, job_id, timestamp, duration_ms, successful
            FROM task_analytics
            WHERE task_id = $1 AND job_id = $2
            "#,
        )
        .bind(task_id)
        .bind(job_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_task", e))?;

        Ok(row.map(TaskRecord::from))
    }

    #[instrument(skip(self), err)]
    async fn find_task(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        let row: Option<TaskRow> = sqlx::query_as(
            r#"
            SELECT task_id, job_id, timestamp, duration_ms, successful
            FROM task_analytics
            WHERE task_id = $1
            LIMIT 1
            "#,
        )
        .bind(task_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_task", e))?;

        Ok(row.map(TaskRecord::from))
    }

    #[instrument(skip(self), err)]
    async fn tasks_for_job(&self, job_id: i64) -> Result<Vec<TaskRecord>, StoreError> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            r#"
            SELECT task_id, job_id, timestamp, duration_ms, successful
            FROM task_analytics
            WHERE job_id = $1
            ORDER BY task_id ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("tasks_for_job", e))?;

        Ok(rows.into_iter().map(TaskRecord::from).collect())
    }

    #[instrument(skip(self), fields(matched), err)]
    async fn jobs_started_between(
        &self,
        from: &str,
        to: &str,
    ) -> Result<Vec<JobRecord>, StoreError> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT job_id, "user", start_time, end_time, status
            FROM job_analytics
            WHERE start_time >= $1 AND start_time < $2
            ORDER BY job_id ASC
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("jobs_started_between", e))?;

        Span::current().record("matched", rows.len());
        rows.into_iter().map(JobRecord::try_from).collect()
    }
}

/// Map SQLx errors to StoreError with context about the failed operation.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            if db_err.code().as_deref() == Some("23505") {
                StoreError::Conflict(msg)
            } else {
                StoreError::Backend(msg)
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Serialization(format!("row decode failed in {}: {}", operation, err))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

// SQLx row types

#[derive(Debug)]
struct RawEventRow {
    id: i64,
    job_id: i64,
    event_type: String,
    payload: JsonValue,
    processed: bool,
    claimed_by: Option<String>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for RawEventRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(RawEventRow {
            id: row.try_get("id")?,
            job_id: row.try_get("job_id")?,
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            processed: row.try_get("processed")?,
            claimed_by: row.try_get("claimed_by")?,
        })
    }
}

impl From<RawEventRow> for RawEvent {
    fn from(row: RawEventRow) -> Self {
        RawEvent {
            id: row.id,
            job_id: row.job_id,
            event_type: row.event_type,
            payload: row.payload,
            processed: row.processed,
            claimed_by: row.claimed_by,
        }
    }
}

#[derive(Debug)]
struct JobRow {
    job_id: i64,
    user: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    status: Option<String>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for JobRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(JobRow {
            job_id: row.try_get("job_id")?,
            user: row.try_get("user")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            status: row.try_get("status")?,
        })
    }
}

impl TryFrom<JobRow> for JobRecord {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, StoreError> {
        let status = row
            .status
            .as_deref()
            .map(str::parse::<JobStatus>)
            .transpose()
            .map_err(|e| {
                StoreError::serialization(format!("job {} has {}", row.job_id, e))
            })?;
        Ok(JobRecord {
            job_id: row.job_id,
            user: row.user,
            start_time: row.start_time,
            end_time: row.end_time,
            status,
        })
    }
}

#[derive(Debug)]
struct TaskRow {
    task_id: String,
    job_id: i64,
    timestamp: Option<String>,
    duration_ms: Option<i64>,
    successful: bool,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for TaskRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(TaskRow {
            task_id: row.try_get("task_id")?,
            job_id: row.try_get("job_id")?,
            timestamp: row.try_get("timestamp")?,
            duration_ms: row.try_get("duration_ms")?,
            successful: row.try_get("successful")?,
        })
    }
}

impl From<TaskRow> for TaskRecord {
    fn from(row: TaskRow) -> Self {
        TaskRecord {
            task_id: row.task_id,
            job_id: row.job_id,
            timestamp: row.timestamp,
            duration_ms: row.duration_ms,
            successful: row.successful,
        }
    }
}
