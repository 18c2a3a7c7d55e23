use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::errors::{DomainError, ServiceResult};

use super::catalog::FieldCatalogService;
use super::executor::{ExecutionBackend, SqliteBatchExecutor};
use super::planner::compile_plan;
use super::repository::{ExportJobRepository, SqliteExportJobRepository};
use super::schema::StoreSchema;
use super::sql::JobTables;
use super::streamer::ResultStreamer;
use super::types::{
    ExportJob, ExportRequest, ExportStats, ExportStatus, FieldCatalog, ValidatedExport,
};
use super::writers::CsvConfig;

/// Separator between statements in a job's stored batch
pub const STATEMENT_SEPARATOR: &str = ";\n\n";

#[async_trait]
pub trait ExportService: Send + Sync {
    async fn get_field_catalog(&self, entity_type: &str) -> ServiceResult<FieldCatalog>;
    async fn get_example_values(&self, entity_type: &str, field: &str) -> ServiceResult<Vec<String>>;

    /// Validate, compile and start an export. Returns as soon as the batch is dispatched.
    async fn submit_request(&self, request: ExportRequest, owner_id: i64) -> ServiceResult<Uuid>;
    async fn submit_export(&self, export: ValidatedExport, owner_id: i64) -> ServiceResult<Uuid>;

    async fn get_job_status(&self, job_id: Uuid) -> ServiceResult<ExportStatus>;
    async fn get_job(&self, job_id: Uuid) -> ServiceResult<ExportJob>;
    async fn list_jobs(&self, owner_id: Option<i64>) -> ServiceResult<Vec<ExportJob>>;
    /// Removes bookkeeping and tables. A batch still running is not interrupted.
    async fn delete_job(&self, job_id: Uuid) -> ServiceResult<()>;
    async fn purge_all_jobs(&self) -> ServiceResult<u64>;

    /// Stream the job's CSV into `output`, then delete the job.
    async fn download_csv(
        &self,
        job_id: Uuid,
        output: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> ServiceResult<ExportStats>;

    /// Wait for a batch dispatched by this service to stop running.
    async fn wait_for_job(&self, job_id: Uuid) -> ServiceResult<()>;
}

pub struct ExportServiceImpl {
    schema: StoreSchema,
    repository: Arc<dyn ExportJobRepository>,
    executor: Arc<dyn ExecutionBackend>,
    streamer: ResultStreamer,
    catalog: FieldCatalogService,
    in_flight: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl ExportServiceImpl {
    pub fn new(
        pool: SqlitePool,
        schema: StoreSchema,
        repository: Arc<dyn ExportJobRepository>,
        executor: Arc<dyn ExecutionBackend>,
        csv_config: CsvConfig,
    ) -> Self {
        Self {
            streamer: ResultStreamer::new(pool.clone(), repository.clone(), csv_config),
            catalog: FieldCatalogService::new(pool, schema.clone()),
            schema,
            repository,
            executor,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Service wired to the SQLite registry and batch executor.
    pub fn with_sqlite(pool: SqlitePool, schema: StoreSchema, csv_config: CsvConfig) -> Self {
        let repository = Arc::new(SqliteExportJobRepository::new(pool.clone()));
        let executor = Arc::new(SqliteBatchExecutor::new(pool.clone()));
        Self::new(pool, schema, repository, executor, csv_config)
    }
}

#[async_trait]
impl ExportService for ExportServiceImpl {
    async fn get_field_catalog(&self, entity_type: &str) -> ServiceResult<FieldCatalog> {
        Ok(self.catalog.get_field_catalog(entity_type).await?)
    }

    async fn get_example_values(&self, entity_type: &str, field: &str) -> ServiceResult<Vec<String>> {
        Ok(self.catalog.get_example_values(entity_type, field).await?)
    }

    async fn submit_request(&self, request: ExportRequest, owner_id: i64) -> ServiceResult<Uuid> {
        let export = request.into_validated()?;
        self.submit_export(export, owner_id).await
    }

    async fn submit_export(&self, export: ValidatedExport, owner_id: i64) -> ServiceResult<Uuid> {
        let job_id = Uuid::new_v4();
        let plan = compile_plan(
            &self.schema,
            &export.entity_type,
            &export.fields,
            &export.filters,
            JobTables::generate(&self.schema),
        )?;
        let statements = plan.render(job_id);
        log::debug!(
            "Compiled export job {}:\n{}",
            job_id,
            statements.join(STATEMENT_SEPARATOR)
        );

        let job = ExportJob {
            id: job_id,
            scratch_table_name: plan.tables.scratch.clone(),
            result_table_name: plan.tables.result.clone(),
            status_step: ExportStatus::Started,
            owner_id,
            entity_type_label: plan.entity_type.label.clone(),
            start_time: Utc::now(),
            compiled_statements: Some(statements.join(STATEMENT_SEPARATOR)),
        };
        self.repository.create_job(&job).await?;

        let handle = self.executor.dispatch(job_id, statements);
        {
            let mut in_flight = self.in_flight.lock().await;
            in_flight.retain(|_, h| !h.is_finished());
            in_flight.insert(job_id, handle);
        }

        log::info!(
            "Submitted export job {} for {} ({} fields, {} filters) by owner {}",
            job_id,
            job.entity_type_label,
            export.fields.len(),
            export.filters.len(),
            owner_id
        );
        Ok(job_id)
    }

    async fn get_job_status(&self, job_id: Uuid) -> ServiceResult<ExportStatus> {
        Ok(self.get_job(job_id).await?.status_step)
    }

    async fn get_job(&self, job_id: Uuid) -> ServiceResult<ExportJob> {
        let job = self
            .repository
            .find_by_id(job_id)
            .await?
            .ok_or(DomainError::JobNotFound(job_id))?;
        Ok(job)
    }

    async fn list_jobs(&self, owner_id: Option<i64>) -> ServiceResult<Vec<ExportJob>> {
        Ok(self.repository.list_jobs(owner_id).await?)
    }

    async fn delete_job(&self, job_id: Uuid) -> ServiceResult<()> {
        self.repository.delete_job(job_id).await?;
        log::info!("Deleted export job {}", job_id);
        Ok(())
    }

    async fn purge_all_jobs(&self) -> ServiceResult<u64> {
        let removed = self.repository.delete_all().await?;
        log::info!("Purged {} export job(s)", removed);
        Ok(removed)
    }

    async fn download_csv(
        &self,
        job_id: Uuid,
        output: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> ServiceResult<ExportStats> {
        Ok(self.streamer.stream_result(job_id, output).await?)
    }

    async fn wait_for_job(&self, job_id: Uuid) -> ServiceResult<()> {
        let handle = self.in_flight.lock().await.remove(&job_id);
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| DomainError::Internal(format!("Export job {} task failed: {}", job_id, e)))?;
        }
        Ok(())
    }
}
