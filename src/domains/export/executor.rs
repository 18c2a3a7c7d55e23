use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::repository::JOBS_TABLE;
use super::sql::quote_ident;

/// Runs a job's statement batch detached from the caller.
///
/// Completion and failure are only observable through the job's status
/// record. Dropping the returned handle does not cancel the batch.
pub trait ExecutionBackend: Send + Sync {
    fn dispatch(&self, job_id: Uuid, statements: Vec<String>) -> JoinHandle<()>;
}

struct QueuedBatch {
    job_id: Uuid,
    statements: Vec<String>,
    done: oneshot::Sender<()>,
}

/// Executes batches one at a time, in dispatch order, on a background worker.
///
/// SQLite has a single writer, so concurrent batches would only queue up on
/// the write lock. Each statement runs in its own IMMEDIATE transaction after
/// checking that the job is still registered; a deleted job stops its batch.
pub struct SqliteBatchExecutor {
    pool: SqlitePool,
    queue: Mutex<Option<mpsc::UnboundedSender<QueuedBatch>>>,
}

impl SqliteBatchExecutor {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            queue: Mutex::new(None),
        }
    }

    /// The worker is started on first use, on the caller's runtime.
    fn queue(&self) -> mpsc::UnboundedSender<QueuedBatch> {
        let mut queue = self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match queue.as_ref() {
            Some(sender) if !sender.is_closed() => sender.clone(),
            _ => {
                let (sender, receiver) = mpsc::unbounded_channel();
                tokio::spawn(run_queue(self.pool.clone(), receiver));
                *queue = Some(sender.clone());
                sender
            }
        }
    }
}

impl ExecutionBackend for SqliteBatchExecutor {
    fn dispatch(&self, job_id: Uuid, statements: Vec<String>) -> JoinHandle<()> {
        let (done, finished) = oneshot::channel();
        let batch = QueuedBatch {
            job_id,
            statements,
            done,
        };

        if self.queue().send(batch).is_err() {
            log::error!("Export job {}: execution queue is closed", job_id);
        } else {
            log::debug!("Export job {} queued for execution", job_id);
        }

        tokio::spawn(async move {
            let _ = finished.await;
        })
    }
}

async fn run_queue(pool: SqlitePool, mut receiver: mpsc::UnboundedReceiver<QueuedBatch>) {
    while let Some(batch) = receiver.recv().await {
        run_batch(&pool, batch.job_id, &batch.statements).await;
        let _ = batch.done.send(());
    }
}

async fn run_batch(pool: &SqlitePool, job_id: Uuid, statements: &[String]) {
    let mut conn = match pool.acquire().await {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Export job {}: could not acquire a connection: {}", job_id, e);
            return;
        }
    };

    let total = statements.len();
    for (index, statement) in statements.iter().enumerate() {
        match run_statement(&mut *conn, job_id, statement).await {
            Ok(true) => {}
            Ok(false) => {
                log::info!(
                    "Export job {} was deleted, abandoning batch at statement {}/{}",
                    job_id,
                    index + 1,
                    total
                );
                return;
            }
            Err(e) => {
                log::error!(
                    "Export job {} stopped at statement {}/{}: {}",
                    job_id,
                    index + 1,
                    total,
                    e
                );
                return;
            }
        }
    }

    log::info!("Export job {} finished {} statements", job_id, total);
}

/// Run one statement if the job is still registered. `Ok(false)` means it was deleted.
///
/// The existence check and the statement share a write transaction, so a
/// concurrent delete either happens first and stops the batch, or happens
/// after and sees every table the statement created.
async fn run_statement(conn: &mut SqliteConnection, job_id: Uuid, statement: &str) -> Result<bool, sqlx::Error> {
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

    let outcome = checked_statement(conn, job_id, statement).await;
    match outcome {
        Ok(true) => {
            sqlx::query("COMMIT").execute(&mut *conn).await?;
            Ok(true)
        }
        other => {
            if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                log::warn!("Export job {}: rollback failed: {}", job_id, e);
            }
            other
        }
    }
}

async fn checked_statement(conn: &mut SqliteConnection, job_id: Uuid, statement: &str) -> Result<bool, sqlx::Error> {
    let check = format!("SELECT COUNT(*) FROM {} WHERE \"id\" = ?", quote_ident(JOBS_TABLE));
    let registered: i64 = sqlx::query_scalar(&check)
        .bind(job_id.to_string())
        .fetch_one(&mut *conn)
        .await?;
    if registered == 0 {
        return Ok(false);
    }

    // one-off statements, no point caching them
    sqlx::query(statement).persistent(false).execute(&mut *conn).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::export::repository::{ExportJobRepository, SqliteExportJobRepository};
    use crate::domains::export::test_support::TestStore;
    use crate::domains::export::types::{ExportJob, ExportStatus};
    use chrono::Utc;

    async fn register_job(store: &TestStore) -> Uuid {
        let id = Uuid::new_v4();
        let suffix = &id.simple().to_string()[..7];
        let job = ExportJob {
            id,
            scratch_table_name: format!("wp_csvexport_scratch_{}", suffix),
            result_table_name: format!("wp_csvexport_results_{}", suffix),
            status_step: ExportStatus::Started,
            owner_id: 1,
            entity_type_label: "Posts".to_string(),
            start_time: Utc::now(),
            compiled_statements: None,
        };
        SqliteExportJobRepository::new(store.pool.clone())
            .create_job(&job)
            .await
            .unwrap();
        id
    }

    async fn table_exists(store: &TestStore, name: &str) -> bool {
        SqliteExportJobRepository::new(store.pool.clone())
            .table_exists(name)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_runs_statements_in_order() {
        let store = TestStore::seeded().await;
        let executor = SqliteBatchExecutor::new(store.pool.clone());
        let job_id = register_job(&store).await;

        executor
            .dispatch(
                job_id,
                vec![
                    "CREATE TABLE exec_order (n INTEGER)".to_string(),
                    "INSERT INTO exec_order VALUES (1)".to_string(),
                    "INSERT INTO exec_order SELECT MAX(n) + 1 FROM exec_order".to_string(),
                ],
            )
            .await
            .unwrap();

        let max: i64 = sqlx::query_scalar("SELECT MAX(n) FROM exec_order")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(max, 2);
    }

    #[tokio::test]
    async fn test_first_failure_stops_the_batch() {
        let store = TestStore::seeded().await;
        let executor = SqliteBatchExecutor::new(store.pool.clone());
        let job_id = register_job(&store).await;

        executor
            .dispatch(
                job_id,
                vec![
                    "CREATE TABLE exec_stop (n INTEGER)".to_string(),
                    "INSERT INTO no_such_table VALUES (1)".to_string(),
                    "INSERT INTO exec_stop VALUES (1)".to_string(),
                ],
            )
            .await
            .unwrap();

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM exec_stop")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(rows, 0);

        // the failed statement's transaction was rolled back, so the connection is reusable
        let next = register_job(&store).await;
        executor
            .dispatch(next, vec!["INSERT INTO exec_stop VALUES (2)".to_string()])
            .await
            .unwrap();
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM exec_stop")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_batches_run_one_at_a_time_in_dispatch_order() {
        let store = TestStore::seeded().await;
        let executor = SqliteBatchExecutor::new(store.pool.clone());
        let first = register_job(&store).await;
        let second = register_job(&store).await;

        let slow = executor.dispatch(
            first,
            vec![
                "CREATE TABLE exec_queue (tag TEXT)".to_string(),
                "CREATE TABLE exec_queue_slow AS WITH RECURSIVE c(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM c WHERE n < 300000) SELECT n FROM c".to_string(),
                "INSERT INTO exec_queue VALUES ('first')".to_string(),
            ],
        );
        let quick = executor.dispatch(second, vec!["INSERT INTO exec_queue VALUES ('second')".to_string()]);

        quick.await.unwrap();
        slow.await.unwrap();

        let order: String = sqlx::query_scalar("SELECT group_concat(tag, ',') FROM (SELECT tag FROM exec_queue ORDER BY rowid)")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(order, "first,second");
    }

    #[tokio::test]
    async fn test_deleted_job_abandons_remaining_statements() {
        let store = TestStore::seeded().await;
        let executor = SqliteBatchExecutor::new(store.pool.clone());
        let job_id = register_job(&store).await;

        executor
            .dispatch(
                job_id,
                vec![
                    "CREATE TABLE exec_before_delete (n INTEGER)".to_string(),
                    format!("DELETE FROM export_jobs WHERE id = '{}'", job_id),
                    "CREATE TABLE exec_after_delete (n INTEGER)".to_string(),
                ],
            )
            .await
            .unwrap();

        assert!(table_exists(&store, "exec_before_delete").await);
        assert!(!table_exists(&store, "exec_after_delete").await);
    }

    #[tokio::test]
    async fn test_unregistered_job_runs_nothing() {
        let store = TestStore::seeded().await;
        let executor = SqliteBatchExecutor::new(store.pool.clone());

        executor
            .dispatch(Uuid::new_v4(), vec!["CREATE TABLE exec_orphan (n INTEGER)".to_string()])
            .await
            .unwrap();

        assert!(!table_exists(&store, "exec_orphan").await);
    }
}
