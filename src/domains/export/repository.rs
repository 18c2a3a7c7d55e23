use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::{DomainError, DomainResult};

use super::sql::{quote_ident, quote_literal};
use super::types::{ExportJob, ExportStatus};

pub const JOBS_TABLE: &str = "export_jobs";

/// Statement that moves a job to `status`, run inline with the job's own batch.
pub fn status_update_sql(job_id: Uuid, status: ExportStatus) -> String {
    format!(
        "UPDATE {} SET \"status_step\" = {} WHERE \"id\" = {}",
        quote_ident(JOBS_TABLE),
        quote_literal(status.as_str()),
        quote_literal(&job_id.to_string())
    )
}

#[async_trait]
pub trait ExportJobRepository: Send + Sync {
    async fn create_job(&self, job: &ExportJob) -> DomainResult<()>;
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<ExportJob>>;
    /// Newest first. `None` lists every owner's jobs.
    async fn list_jobs(&self, owner_id: Option<i64>) -> DomainResult<Vec<ExportJob>>;
    /// Remove the record and its backing tables.
    async fn delete_job(&self, id: Uuid) -> DomainResult<()>;
    /// Returns how many jobs were removed.
    async fn delete_all(&self) -> DomainResult<u64>;
    async fn table_exists(&self, table_name: &str) -> DomainResult<bool>;
}

pub struct SqliteExportJobRepository {
    pool: SqlitePool,
}

impl SqliteExportJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Table drops never fail the caller; a leftover table only wastes space.
    async fn drop_table_best_effort(&self, table_name: &str) {
        let sql = format!("DROP TABLE IF EXISTS {}", quote_ident(table_name));
        if let Err(e) = sqlx::query(&sql).execute(&self.pool).await {
            log::warn!("Failed to drop export table {}: {}", table_name, e);
        }
    }
}

#[derive(sqlx::FromRow)]
struct ExportJobRow {
    id: String,
    scratch_table_name: String,
    result_table_name: String,
    status_step: String,
    owner_id: i64,
    entity_type_label: String,
    start_time: String,
    compiled_statements: Option<String>,
}

impl ExportJobRow {
    fn into_job(self) -> DomainResult<ExportJob> {
        Ok(ExportJob {
            id: Uuid::parse_str(&self.id)
                .map_err(|e| DomainError::Internal(format!("Bad job id {}: {}", self.id, e)))?,
            scratch_table_name: self.scratch_table_name,
            result_table_name: self.result_table_name,
            status_step: self.status_step.parse()?,
            owner_id: self.owner_id,
            entity_type_label: self.entity_type_label,
            start_time: DateTime::parse_from_rfc3339(&self.start_time)
                .map_err(|e| DomainError::Internal(format!("Bad timestamp: {}", e)))?
                .with_timezone(&Utc),
            compiled_statements: self.compiled_statements,
        })
    }
}

const SELECT_JOB_COLUMNS: &str = "SELECT id, scratch_table_name, result_table_name, status_step, owner_id, entity_type_label, start_time, compiled_statements FROM export_jobs";

#[async_trait]
impl ExportJobRepository for SqliteExportJobRepository {
    async fn create_job(&self, job: &ExportJob) -> DomainResult<()> {
        sqlx::query("INSERT INTO export_jobs (id, scratch_table_name, result_table_name, status_step, owner_id, entity_type_label, start_time, compiled_statements) VALUES (?,?,?,?,?,?,?,?)")
            .bind(job.id.to_string())
            .bind(&job.scratch_table_name)
            .bind(&job.result_table_name)
            .bind(job.status_step.as_str())
            .bind(job.owner_id)
            .bind(&job.entity_type_label)
            .bind(job.start_time.to_rfc3339())
            .bind(&job.compiled_statements)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::Database(e.into()))?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<ExportJob>> {
        let sql = format!("{} WHERE id = ?", SELECT_JOB_COLUMNS);
        let row: Option<ExportJobRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::Database(e.into()))?;

        row.map(ExportJobRow::into_job).transpose()
    }

    async fn list_jobs(&self, owner_id: Option<i64>) -> DomainResult<Vec<ExportJob>> {
        let rows: Vec<ExportJobRow> = match owner_id {
            Some(owner) => {
                let sql = format!("{} WHERE owner_id = ? ORDER BY start_time DESC", SELECT_JOB_COLUMNS);
                sqlx::query_as(&sql).bind(owner).fetch_all(&self.pool).await
            }
            None => {
                let sql = format!("{} ORDER BY start_time DESC", SELECT_JOB_COLUMNS);
                sqlx::query_as(&sql).fetch_all(&self.pool).await
            }
        }
        .map_err(|e| DomainError::Database(e.into()))?;

        rows.into_iter().map(ExportJobRow::into_job).collect()
    }

    async fn delete_job(&self, id: Uuid) -> DomainResult<()> {
        let job = self.find_by_id(id).await?.ok_or(DomainError::JobNotFound(id))?;

        // the row goes first: a batch still running checks for it before every
        // statement, so no table can appear after the drops below
        let result = sqlx::query("DELETE FROM export_jobs WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::Database(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::JobNotFound(id));
        }

        self.drop_table_best_effort(&job.scratch_table_name).await;
        self.drop_table_best_effort(&job.result_table_name).await;
        Ok(())
    }

    async fn delete_all(&self) -> DomainResult<u64> {
        let mut removed = 0;
        for job in self.list_jobs(None).await? {
            match self.delete_job(job.id).await {
                Ok(()) => removed += 1,
                // deleted concurrently
                Err(DomainError::JobNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(removed)
    }

    async fn table_exists(&self, table_name: &str) -> DomainResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::Database(e.into()))?;
        Ok(count > 0)
    }
}
