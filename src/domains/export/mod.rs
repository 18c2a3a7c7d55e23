pub mod types;
pub mod schema;
pub mod sql;
pub mod predicate;
pub mod planner;
pub mod repository;
pub mod executor;
pub mod writers;
pub mod streamer;
pub mod catalog;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

pub use types::{
    ExportJob, ExportJobResponse, ExportRequest, ExportStats, ExportStatus, FieldCatalog, FieldRef,
    FilterSpec, Rule, Cast, ValidatedExport,
};
pub use schema::{EntityTypeConfig, StoreSchema};
pub use planner::{compile_plan, ExecutionPlan, PlanStep};
pub use repository::{ExportJobRepository, SqliteExportJobRepository};
pub use executor::{ExecutionBackend, SqliteBatchExecutor};
pub use streamer::{suggested_filename, ResultStreamer};
pub use catalog::FieldCatalogService;
pub use service::{ExportService, ExportServiceImpl};
pub use writers::{CsvConfig, StreamingCsvWriter};
