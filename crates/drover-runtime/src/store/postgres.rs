use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};

use drover_core::cluster::{WorkerId, WorkerInfo};
use drover_core::error::{DroverError, Result};
use drover_core::job::{Collection, Job, JobEntry, JobId, Lease, QueueStats};
use drover_core::store::{QueueStore, RunningGuard, StoreFuture};

const JOB_COLUMNS: &str = "id, queue, collection, payload, attempts, log_id, last_error, \
                           enqueued_at, due_at, worker_id, heartbeat_at";

/// Store backed by the `drover_*` tables.
///
/// Each job is one row whose `collection` column is its only membership, so
/// every move is a single guarded `UPDATE`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Shared body of the three Running exits.
    async fn leave_running(
        &self,
        queue: &str,
        id: JobId,
        target: Collection,
        error: Option<String>,
        guard: RunningGuard,
    ) -> Result<bool> {
        let sql = format!(
            r#"
            UPDATE drover_jobs
            SET collection = $3,
                attempts = attempts + 1,
                last_error = COALESCE($4, last_error),
                worker_id = NULL,
                heartbeat_at = NULL,
                finished_at = NOW(),
                position = nextval('drover_jobs_position_seq')
            WHERE queue = $1 AND id = $2 AND collection = 'running' AND {}
            "#,
            guard_predicate(&guard, 5)
        );

        let query = sqlx::query(&sql)
            .bind(queue)
            .bind(id.as_uuid())
            .bind(target.as_str())
            .bind(error);
        let result = bind_guard(query, guard).execute(&self.pool).await?;

        Ok(result.rows_affected() > 0)
    }
}

/// SQL condition a running row must meet for `guard` to hold.
fn guard_predicate(guard: &RunningGuard, param: usize) -> String {
    match guard {
        RunningGuard::Owner(_) => format!("worker_id = ${}", param),
        RunningGuard::StaleBefore(_) => format!("heartbeat_at < ${}", param),
    }
}

fn bind_guard(
    query: Query<'_, Postgres, PgArguments>,
    guard: RunningGuard,
) -> Query<'_, Postgres, PgArguments> {
    match guard {
        RunningGuard::Owner(worker) => query.bind(worker.as_uuid()),
        RunningGuard::StaleBefore(cutoff) => query.bind(cutoff),
    }
}

/// Natural order of a collection when listed.
fn order_clause(collection: Collection) -> &'static str {
    match collection {
        Collection::Pending | Collection::Running => "position ASC",
        Collection::Delayed => "due_at ASC, position ASC",
        Collection::Failed | Collection::Done => "position DESC",
    }
}

fn job_from_row(row: &PgRow) -> Result<Job> {
    Ok(Job {
        id: JobId::from_uuid(row.try_get("id")?),
        queue: row.try_get("queue")?,
        payload: row.try_get("payload")?,
        attempts: row.try_get::<i32, _>("attempts")?.max(0) as u32,
        enqueued_at: row.try_get("enqueued_at")?,
        due_at: row.try_get("due_at")?,
        log_id: row.try_get("log_id")?,
        last_error: row.try_get("last_error")?,
    })
}

fn entry_from_row(row: &PgRow) -> Result<JobEntry> {
    let collection: Collection = row.try_get::<String, _>("collection")?.parse()?;
    let worker: Option<uuid::Uuid> = row.try_get("worker_id")?;
    let heartbeat: Option<DateTime<Utc>> = row.try_get("heartbeat_at")?;

    let lease = match (collection, worker, heartbeat) {
        (Collection::Running, Some(worker), Some(heartbeat_at)) => Some(Lease {
            worker_id: WorkerId::from_uuid(worker),
            heartbeat_at,
        }),
        _ => None,
    };

    Ok(JobEntry {
        collection,
        job: job_from_row(row)?,
        lease,
    })
}

fn worker_from_row(row: &PgRow) -> Result<WorkerInfo> {
    Ok(WorkerInfo {
        id: WorkerId::from_uuid(row.try_get("id")?),
        hostname: row.try_get("hostname")?,
        pid: row.try_get::<i32, _>("pid")?.max(0) as u32,
        queues: row.try_get("queues")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        started_at: row.try_get("started_at")?,
        last_heartbeat: row.try_get("last_heartbeat")?,
    })
}

impl QueueStore for PgStore {
    fn now(&self) -> StoreFuture<'_, DateTime<Utc>> {
        Box::pin(async move {
            let now: DateTime<Utc> = sqlx::query_scalar("SELECT NOW()")
                .fetch_one(&self.pool)
                .await?;
            Ok(now)
        })
    }

    fn enqueue(&self, job: Job) -> StoreFuture<'_, JobId> {
        Box::pin(async move {
            if job.queue.is_empty() {
                return Err(DroverError::InvalidArgument(
                    "Job queue name must not be empty".into(),
                ));
            }

            sqlx::query("INSERT INTO drover_queues (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
                .bind(&job.queue)
                .execute(&self.pool)
                .await?;

            let result = sqlx::query(
                r#"
                INSERT INTO drover_jobs (
                    id, queue, collection, payload, attempts, log_id, last_error,
                    enqueued_at, due_at
                ) VALUES (
                    $1, $2,
                    CASE WHEN $8::timestamptz > NOW() THEN 'delayed' ELSE 'pending' END,
                    $3, $4, $5, $6, $7,
                    CASE WHEN $8::timestamptz > NOW() THEN $8::timestamptz ELSE NULL END
                )
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(job.id.as_uuid())
            .bind(&job.queue)
            .bind(&job.payload)
            .bind(job.attempts as i32)
            .bind(&job.log_id)
            .bind(&job.last_error)
            .bind(job.enqueued_at)
            .bind(job.due_at)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(DroverError::InvalidArgument(format!(
                    "Job {} already exists",
                    job.id
                )));
            }
            Ok(job.id)
        })
    }

    fn dequeue<'a>(
        &'a self,
        queue: &'a str,
        worker: WorkerId,
        concurrency: u32,
    ) -> StoreFuture<'a, Option<Job>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;

            sqlx::query("INSERT INTO drover_queues (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
                .bind(queue)
                .execute(&mut *tx)
                .await?;

            // Serializes dequeuers of this queue for the cap check.
            sqlx::query("SELECT name FROM drover_queues WHERE name = $1 FOR UPDATE")
                .bind(queue)
                .execute(&mut *tx)
                .await?;

            let running: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM drover_jobs WHERE queue = $1 AND collection = 'running'",
            )
            .bind(queue)
            .fetch_one(&mut *tx)
            .await?;

            if running >= i64::from(concurrency) {
                tx.rollback().await?;
                return Ok(None);
            }

            let sql = format!(
                r#"
                UPDATE drover_jobs
                SET collection = 'running',
                    worker_id = $2,
                    heartbeat_at = NOW(),
                    position = nextval('drover_jobs_position_seq')
                WHERE id = (
                    SELECT id FROM drover_jobs
                    WHERE queue = $1 AND collection = 'pending'
                    ORDER BY position ASC
                    LIMIT 1
                    FOR UPDATE SKIP LOCKED
                )
                RETURNING {}
                "#,
                JOB_COLUMNS
            );
            let row = sqlx::query(&sql)
                .bind(queue)
                .bind(worker.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;

            let job = row.as_ref().map(job_from_row).transpose()?;
            tx.commit().await?;
            Ok(job)
        })
    }

    fn heartbeat<'a>(
        &'a self,
        queue: &'a str,
        id: JobId,
        worker: WorkerId,
    ) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let result = sqlx::query(
                r#"
                UPDATE drover_jobs
                SET heartbeat_at = NOW()
                WHERE queue = $1 AND id = $2 AND collection = 'running' AND worker_id = $3
                "#,
            )
            .bind(queue)
            .bind(id.as_uuid())
            .bind(worker.as_uuid())
            .execute(&self.pool)
            .await?;

            Ok(result.rows_affected() > 0)
        })
    }

    fn complete<'a>(
        &'a self,
        queue: &'a str,
        id: JobId,
        guard: RunningGuard,
    ) -> StoreFuture<'a, bool> {
        Box::pin(self.leave_running(queue, id, Collection::Done, None, guard))
    }

    fn fail<'a>(
        &'a self,
        queue: &'a str,
        id: JobId,
        error: Option<String>,
        guard: RunningGuard,
    ) -> StoreFuture<'a, bool> {
        Box::pin(self.leave_running(queue, id, Collection::Failed, error, guard))
    }

    fn requeue_from_running<'a>(
        &'a self,
        queue: &'a str,
        id: JobId,
        error: Option<String>,
        retry_at: Option<DateTime<Utc>>,
        guard: RunningGuard,
    ) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let sql = format!(
                r#"
                UPDATE drover_jobs
                SET collection = CASE WHEN $3::timestamptz > NOW() THEN 'delayed' ELSE 'pending' END,
                    due_at = CASE WHEN $3::timestamptz > NOW() THEN $3::timestamptz ELSE NULL END,
                    attempts = attempts + 1,
                    last_error = COALESCE($4, last_error),
                    worker_id = NULL,
                    heartbeat_at = NULL,
                    position = nextval('drover_jobs_position_seq')
                WHERE queue = $1 AND id = $2 AND collection = 'running' AND {}
                "#,
                guard_predicate(&guard, 5)
            );

            let query = sqlx::query(&sql)
                .bind(queue)
                .bind(id.as_uuid())
                .bind(retry_at)
                .bind(error);
            let result = bind_guard(query, guard).execute(&self.pool).await?;

            Ok(result.rows_affected() > 0)
        })
    }

    fn promote_due<'a>(&'a self, queue: &'a str, now: DateTime<Utc>) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            // Positions are drawn in due order so Pending keeps it.
            let result = sqlx::query(
                r#"
                WITH due AS (
                    SELECT id, due_at, position FROM drover_jobs
                    WHERE queue = $1 AND collection = 'delayed' AND due_at <= $2
                    FOR UPDATE SKIP LOCKED
                ),
                ordered AS (
                    SELECT id, nextval('drover_jobs_position_seq') AS next_position
                    FROM (SELECT id FROM due ORDER BY due_at ASC, position ASC) sorted
                )
                UPDATE drover_jobs
                SET collection = 'pending',
                    position = ordered.next_position
                FROM ordered
                WHERE drover_jobs.id = ordered.id AND drover_jobs.collection = 'delayed'
                "#,
            )
            .bind(queue)
            .bind(now)
            .execute(&self.pool)
            .await?;

            Ok(result.rows_affected())
        })
    }

    fn delete<'a>(
        &'a self,
        queue: &'a str,
        collection: Collection,
        id: JobId,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if collection == Collection::Running {
                return Err(DroverError::InvalidArgument(
                    "Running entries cannot be deleted".into(),
                ));
            }

            let mut tx = self.pool.begin().await?;
            let log_id: Option<String> = sqlx::query_scalar(
                r#"
                DELETE FROM drover_jobs
                WHERE queue = $1 AND id = $2 AND collection = $3
                RETURNING log_id
                "#,
            )
            .bind(queue)
            .bind(id.as_uuid())
            .bind(collection.as_str())
            .fetch_optional(&mut *tx)
            .await?;

            let Some(log_id) = log_id else {
                tx.rollback().await?;
                return Err(DroverError::IdentityMismatch {
                    queue: queue.to_string(),
                    collection,
                    job_id: id,
                });
            };

            sqlx::query("DELETE FROM drover_job_logs WHERE log_id = $1")
                .bind(&log_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(())
        })
    }

    fn requeue<'a>(
        &'a self,
        queue: &'a str,
        collection: Collection,
        id: JobId,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if !collection.is_terminal() {
                return Err(DroverError::InvalidArgument(format!(
                    "Only failed or done entries can be requeued, not {}",
                    collection
                )));
            }

            let result = sqlx::query(
                r#"
                UPDATE drover_jobs
                SET collection = 'pending',
                    attempts = 0,
                    last_error = NULL,
                    due_at = NULL,
                    finished_at = NULL,
                    position = nextval('drover_jobs_position_seq')
                WHERE queue = $1 AND id = $2 AND collection = $3
                "#,
            )
            .bind(queue)
            .bind(id.as_uuid())
            .bind(collection.as_str())
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(DroverError::IdentityMismatch {
                    queue: queue.to_string(),
                    collection,
                    job_id: id,
                });
            }
            Ok(())
        })
    }

    fn stats<'a>(&'a self, queue: &'a str) -> StoreFuture<'a, QueueStats> {
        Box::pin(async move {
            let rows: Vec<(String, i64)> = sqlx::query_as(
                r#"
                SELECT collection, COUNT(*)
                FROM drover_jobs
                WHERE queue = $1
                GROUP BY collection
                "#,
            )
            .bind(queue)
            .fetch_all(&self.pool)
            .await?;

            let mut stats = QueueStats::default();
            for (collection, count) in rows {
                *stats.get_mut(collection.parse()?) = count.max(0) as u64;
            }
            Ok(stats)
        })
    }

    fn list<'a>(
        &'a self,
        queue: &'a str,
        collection: Collection,
        offset: u64,
        limit: u64,
    ) -> StoreFuture<'a, Vec<JobEntry>> {
        Box::pin(async move {
            let sql = format!(
                r#"
                SELECT {}
                FROM drover_jobs
                WHERE queue = $1 AND collection = $2
                ORDER BY {}
                OFFSET $3 LIMIT $4
                "#,
                JOB_COLUMNS,
                order_clause(collection)
            );

            let rows = sqlx::query(&sql)
                .bind(queue)
                .bind(collection.as_str())
                .bind(i64::try_from(offset).unwrap_or(i64::MAX))
                .bind(i64::try_from(limit).unwrap_or(i64::MAX))
                .fetch_all(&self.pool)
                .await?;

            rows.iter().map(entry_from_row).collect()
        })
    }

    fn find<'a>(&'a self, queue: &'a str, id: JobId) -> StoreFuture<'a, Option<JobEntry>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {} FROM drover_jobs WHERE queue = $1 AND id = $2",
                JOB_COLUMNS
            );
            let row = sqlx::query(&sql)
                .bind(queue)
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

            row.as_ref().map(entry_from_row).transpose()
        })
    }

    fn running<'a>(&'a self, queue: &'a str) -> StoreFuture<'a, Vec<JobEntry>> {
        self.list(queue, Collection::Running, 0, u64::MAX)
    }

    fn trim_history<'a>(
        &'a self,
        queue: &'a str,
        collection: Collection,
        keep: u64,
    ) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            if !collection.is_terminal() {
                return Err(DroverError::InvalidArgument(format!(
                    "Cannot trim {} entries",
                    collection
                )));
            }

            let trimmed: i64 = sqlx::query_scalar(
                r#"
                WITH doomed AS (
                    SELECT id FROM drover_jobs
                    WHERE queue = $1 AND collection = $2
                    ORDER BY position DESC
                    OFFSET $3
                ),
                gone AS (
                    DELETE FROM drover_jobs
                    WHERE id IN (SELECT id FROM doomed)
                    RETURNING log_id
                ),
                logs AS (
                    DELETE FROM drover_job_logs
                    WHERE log_id IN (SELECT log_id FROM gone)
                )
                SELECT COUNT(*) FROM gone
                "#,
            )
            .bind(queue)
            .bind(collection.as_str())
            .bind(i64::try_from(keep).unwrap_or(i64::MAX))
            .fetch_one(&self.pool)
            .await?;

            Ok(trimmed.max(0) as u64)
        })
    }

    fn register_worker<'a>(
        &'a self,
        cluster: &'a str,
        info: &'a WorkerInfo,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query(
                r#"
                INSERT INTO drover_workers (
                    cluster, id, hostname, pid, queues, status, started_at, last_heartbeat
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
                ON CONFLICT (cluster, id) DO UPDATE SET
                    hostname = EXCLUDED.hostname,
                    pid = EXCLUDED.pid,
                    queues = EXCLUDED.queues,
                    status = EXCLUDED.status,
                    last_heartbeat = NOW()
                "#,
            )
            .bind(cluster)
            .bind(info.id.as_uuid())
            .bind(&info.hostname)
            .bind(info.pid as i32)
            .bind(&info.queues)
            .bind(info.status.as_str())
            .bind(info.started_at)
            .execute(&self.pool)
            .await?;

            Ok(())
        })
    }

    fn deregister_worker<'a>(&'a self, cluster: &'a str, id: WorkerId) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query("DELETE FROM drover_workers WHERE cluster = $1 AND id = $2")
                .bind(cluster)
                .bind(id.as_uuid())
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }

    fn prune_workers<'a>(
        &'a self,
        cluster: &'a str,
        seen_before: DateTime<Utc>,
    ) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            let result = sqlx::query(
                "DELETE FROM drover_workers WHERE cluster = $1 AND last_heartbeat < $2",
            )
            .bind(cluster)
            .bind(seen_before)
            .execute(&self.pool)
            .await?;

            Ok(result.rows_affected())
        })
    }

    fn workers<'a>(&'a self, cluster: &'a str) -> StoreFuture<'a, Vec<WorkerInfo>> {
        Box::pin(async move {
            let rows = sqlx::query(
                r#"
                SELECT id, hostname, pid, queues, status, started_at, last_heartbeat
                FROM drover_workers
                WHERE cluster = $1
                ORDER BY started_at ASC, id ASC
                "#,
            )
            .bind(cluster)
            .fetch_all(&self.pool)
            .await?;

            rows.iter().map(worker_from_row).collect()
        })
    }

    fn worker_count<'a>(&'a self, cluster: &'a str) -> StoreFuture<'a, usize> {
        Box::pin(async move {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM drover_workers WHERE cluster = $1")
                    .bind(cluster)
                    .fetch_one(&self.pool)
                    .await?;
            Ok(count.max(0) as usize)
        })
    }

    fn append_log<'a>(&'a self, log_id: &'a str, text: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query(
                r#"
                INSERT INTO drover_job_logs (log_id, content)
                VALUES ($1, $2)
                ON CONFLICT (log_id) DO UPDATE SET
                    content = drover_job_logs.content || EXCLUDED.content,
                    updated_at = NOW()
                "#,
            )
            .bind(log_id)
            .bind(text)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn read_log<'a>(&'a self, log_id: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            let content: Option<String> =
                sqlx::query_scalar("SELECT content FROM drover_job_logs WHERE log_id = $1")
                    .bind(log_id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(content)
        })
    }
}
