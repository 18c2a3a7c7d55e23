// Public modules
pub mod config;
pub mod domains;
pub mod errors;
pub mod ffi;
pub mod globals;
pub mod validation;

// Private modules
mod db_migration;

pub use config::ExportConfig;
pub use domains::export::{ExportRequest, ExportService, ExportStatus};

/// Initialize the export engine. Must be called before any other function in the library.
pub async fn initialize(config: ExportConfig) -> errors::ServiceResult<()> {
    globals::initialize(config).await
}

/// Initialize from `CSV_EXPORT_*` environment variables and an optional `.env` file.
pub async fn initialize_from_env() -> errors::ServiceResult<()> {
    initialize(ExportConfig::from_env()?).await
}
