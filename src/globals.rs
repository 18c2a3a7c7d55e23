use crate::config::ExportConfig;
use crate::db_migration;
use crate::domains::export::schema::StoreSchema;
use crate::domains::export::service::{ExportService, ExportServiceImpl};
use crate::domains::export::writers::CsvConfig;
use crate::errors::{DbError, DbResult, ServiceError, ServiceResult};
use lazy_static::lazy_static;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// Global state definitions
lazy_static! {
    static ref INIT_MUTEX: tokio::sync::Mutex<()> = tokio::sync::Mutex::new(());
    static ref INITIALIZED: AtomicBool = AtomicBool::new(false);

    static ref CONFIG: Mutex<Option<ExportConfig>> = Mutex::new(None);
    static ref DB_POOL: Mutex<Option<SqlitePool>> = Mutex::new(None);
    static ref EXPORT_SERVICE: Mutex<Option<Arc<dyn ExportService>>> = Mutex::new(None);
}

// --- Getter Functions ---

pub fn get_db_pool() -> ServiceResult<SqlitePool> {
    DB_POOL
        .lock()
        .map_err(|_| ServiceError::NotInitialized("DB_POOL lock poisoned".to_string()))?
        .clone()
        .ok_or_else(|| ServiceError::NotInitialized("Database pool not initialized".to_string()))
}

pub fn get_config() -> ServiceResult<ExportConfig> {
    CONFIG
        .lock()
        .map_err(|_| ServiceError::NotInitialized("CONFIG lock poisoned".to_string()))?
        .clone()
        .ok_or_else(|| ServiceError::NotInitialized("Configuration not initialized".to_string()))
}

pub fn get_export_service() -> ServiceResult<Arc<dyn ExportService>> {
    EXPORT_SERVICE
        .lock()
        .map_err(|_| ServiceError::NotInitialized("EXPORT_SERVICE lock poisoned".to_string()))?
        .clone()
        .ok_or_else(|| ServiceError::NotInitialized("Export service not initialized".to_string()))
}

pub fn is_initialized() -> bool {
    INITIALIZED.load(Ordering::Acquire)
}

/// Open a pool on the store, creating the database file if needed.
///
/// SQLite has a single writer. A running export holds the write lock for the
/// length of its longest statement, so `busy_timeout` bounds how long registry
/// writes from other callers wait behind it.
pub async fn create_pool(
    database_url: &str,
    max_connections: u32,
    busy_timeout: Duration,
) -> DbResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(busy_timeout);

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(|e| DbError::ConnectionPool(format!("Failed to connect to {}: {}", database_url, e)))
}

/// Set up logging, the pool, the job registry and the export service.
/// Calling it again after a successful run is a no-op.
pub async fn initialize(config: ExportConfig) -> ServiceResult<()> {
    let _guard = INIT_MUTEX.lock().await;

    if INITIALIZED.load(Ordering::Acquire) {
        return Ok(());
    }

    let result = initialize_internal(config).await;

    if result.is_ok() {
        INITIALIZED.store(true, Ordering::Release);
    }

    result
}

async fn initialize_internal(config: ExportConfig) -> ServiceResult<()> {
    init_logging();

    log::info!("Starting export engine initialization");
    config.validate()?;
    log::debug!("Database URL: {}", config.database_url);
    log::debug!("Table prefix: {}", config.table_prefix);

    let pool = create_pool(&config.database_url, config.max_connections, config.busy_timeout()).await?;
    db_migration::initialize_database(&pool).await?;

    let csv_config = CsvConfig {
        batch_size: config.csv_batch_size,
        ..CsvConfig::default()
    };
    let service: Arc<dyn ExportService> = Arc::new(ExportServiceImpl::with_sqlite(
        pool.clone(),
        StoreSchema::new(config.table_prefix.clone()),
        csv_config,
    ));

    *DB_POOL
        .lock()
        .map_err(|_| ServiceError::NotInitialized("DB_POOL lock poisoned".to_string()))? = Some(pool);
    *EXPORT_SERVICE
        .lock()
        .map_err(|_| ServiceError::NotInitialized("EXPORT_SERVICE lock poisoned".to_string()))? =
        Some(service);
    *CONFIG
        .lock()
        .map_err(|_| ServiceError::NotInitialized("CONFIG lock poisoned".to_string()))? = Some(config);

    log::info!("Export engine initialized");
    Ok(())
}

fn init_logging() {
    let default_level = if cfg!(debug_assertions) { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .try_init();
}
