use chrono::NaiveDate;
use futures::TryStreamExt;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tokio::io::AsyncWrite;
use uuid::Uuid;

use crate::errors::{DomainError, DomainResult};

use super::repository::ExportJobRepository;
use super::sql::quote_ident;
use super::types::{ExportJob, ExportStats};
use super::writers::{CsvConfig, StreamingCsvWriter};

/// `csvexport-Posts-export.2024-05-01.csv`
pub fn suggested_filename(job: &ExportJob, date: NaiveDate) -> String {
    let label: String = job
        .entity_type_label
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("csvexport-{}-export.{}.csv", label, date.format("%Y-%m-%d"))
}

/// Streams a finished job's result table as CSV, then removes the job.
pub struct ResultStreamer {
    pool: SqlitePool,
    repository: Arc<dyn ExportJobRepository>,
    config: CsvConfig,
}

impl ResultStreamer {
    pub fn new(pool: SqlitePool, repository: Arc<dyn ExportJobRepository>, config: CsvConfig) -> Self {
        Self { pool, repository, config }
    }

    /// Results are single use: once streaming has started the job is deleted
    /// whether or not it succeeds. A job that is not done yet is left alone.
    pub async fn stream_result(
        &self,
        job_id: Uuid,
        output: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> DomainResult<ExportStats> {
        let job = self
            .repository
            .find_by_id(job_id)
            .await?
            .ok_or(DomainError::JobNotFound(job_id))?;

        if !job.status_step.is_done() {
            return Err(DomainError::JobNotReady {
                id: job_id,
                status: job.status_step.to_string(),
            });
        }

        let result = self.write_csv(&job, output).await;

        match self.repository.delete_job(job_id).await {
            Ok(()) => {}
            // a concurrent delete got there first
            Err(DomainError::JobNotFound(_)) => {}
            Err(e) => log::warn!("Failed to remove export job {} after download: {}", job_id, e),
        }

        match &result {
            Ok(stats) => log::info!(
                "Streamed export job {}: {} rows, {} bytes in {} ms",
                job_id,
                stats.rows_written,
                stats.bytes_written,
                stats.duration_ms
            ),
            Err(e) => log::warn!("Streaming export job {} failed: {}", job_id, e),
        }
        result
    }

    async fn result_columns(&self, table_name: &str) -> DomainResult<Vec<String>> {
        let columns: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info(?) ORDER BY cid")
                .bind(table_name)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| DomainError::Database(e.into()))?;
        Ok(columns)
    }

    async fn write_csv(
        &self,
        job: &ExportJob,
        output: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> DomainResult<ExportStats> {
        let table = &job.result_table_name;
        let columns = self.result_columns(table).await?;
        if columns.is_empty() {
            return Err(DomainError::JobNotFound(job.id));
        }

        let select = format!(
            "SELECT {} FROM {}",
            columns
                .iter()
                .map(|c| format!("CAST({} AS TEXT)", quote_ident(c)))
                .collect::<Vec<_>>()
                .join(", "),
            quote_ident(table)
        );

        let batch_size = self.config.batch_size.max(1) as u64;
        let mut writer = StreamingCsvWriter::new(output, self.config.clone());
        writer.write_header(&columns).await?;

        let mut conn = self.pool.acquire().await.map_err(|e| DomainError::Database(e.into()))?;
        let mut rows = sqlx::query(&select).persistent(false).fetch(&mut *conn);
        let mut written: u64 = 0;

        while let Some(row) = rows.try_next().await.map_err(|e| DomainError::Database(e.into()))? {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                let value: Option<String> = row
                    .try_get(i)
                    .map_err(|e| DomainError::Database(e.into()))?;
                values.push(value.unwrap_or_default());
            }
            writer.write_row(&values).await?;
            written += 1;

            // the job may have been deleted underneath us
            if written % batch_size == 0 && !self.repository.table_exists(table).await? {
                return Err(DomainError::JobNotFound(job.id));
            }
        }

        writer.finish().await
    }
}
