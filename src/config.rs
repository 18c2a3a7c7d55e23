use crate::errors::{ServiceError, ServiceResult};
use crate::validation::ValidationBuilder;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_DATABASE_URL: &str = "CSV_EXPORT_DATABASE_URL";
pub const ENV_TABLE_PREFIX: &str = "CSV_EXPORT_TABLE_PREFIX";
pub const ENV_MAX_CONNECTIONS: &str = "CSV_EXPORT_MAX_CONNECTIONS";
pub const ENV_BATCH_SIZE: &str = "CSV_EXPORT_BATCH_SIZE";
pub const ENV_BUSY_TIMEOUT_SECS: &str = "CSV_EXPORT_BUSY_TIMEOUT_SECS";

/// Runtime configuration for the export engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportConfig {
    /// SQLite connection string, e.g. `sqlite:site.db`
    pub database_url: String,
    /// Prefix shared by every entity, attribute and relation table
    pub table_prefix: String,
    pub max_connections: u32,
    /// Rows written between result-table existence checks while streaming
    pub csv_batch_size: usize,
    /// How long a connection waits on the store's write lock before failing.
    /// Must outlast the longest statement of a running export.
    pub busy_timeout_secs: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:csv_export.db".to_string(),
            table_prefix: "wp_".to_string(),
            max_connections: 5,
            csv_batch_size: 1000,
            busy_timeout_secs: 300,
        }
    }
}

impl ExportConfig {
    /// Load configuration from the process environment, reading `.env` first when present.
    pub fn from_env() -> ServiceResult<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> ServiceResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            database_url: lookup(ENV_DATABASE_URL).unwrap_or(defaults.database_url),
            table_prefix: lookup(ENV_TABLE_PREFIX).unwrap_or(defaults.table_prefix),
            max_connections: parse_var(&lookup, ENV_MAX_CONNECTIONS, defaults.max_connections)?,
            csv_batch_size: parse_var(&lookup, ENV_BATCH_SIZE, defaults.csv_batch_size)?,
            busy_timeout_secs: parse_var(&lookup, ENV_BUSY_TIMEOUT_SECS, defaults.busy_timeout_secs)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ServiceResult<()> {
        ValidationBuilder::new("databaseUrl", Some(self.database_url.as_str()))
            .required()
            .validate()
            .map_err(|e| ServiceError::Configuration(e.to_string()))?;
        ValidationBuilder::new("tablePrefix", Some(self.table_prefix.as_str()))
            .table_prefix()
            .validate()
            .map_err(|e| ServiceError::Configuration(e.to_string()))?;
        // the streamer holds one connection for the cursor and needs another for its guard checks
        if self.max_connections < 2 {
            return Err(ServiceError::Configuration(
                "maxConnections must be at least 2".to_string(),
            ));
        }
        if self.csv_batch_size == 0 {
            return Err(ServiceError::Configuration(
                "csvBatchSize must be greater than zero".to_string(),
            ));
        }
        if self.busy_timeout_secs == 0 {
            return Err(ServiceError::Configuration(
                "busyTimeoutSecs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.busy_timeout_secs)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> ServiceResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            ServiceError::Configuration(format!("{} must be a number, got '{}'", key, raw))
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = ExportConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, ExportConfig::default());
    }

    #[test]
    fn test_overrides_from_environment() {
        let config = ExportConfig::from_lookup(lookup_from(&[
            (ENV_DATABASE_URL, "sqlite:/tmp/site.db"),
            (ENV_TABLE_PREFIX, "site2_"),
            (ENV_MAX_CONNECTIONS, "8"),
            (ENV_BATCH_SIZE, " 250 "),
            (ENV_BUSY_TIMEOUT_SECS, "45"),
        ]))
        .unwrap();
        assert_eq!(config.database_url, "sqlite:/tmp/site.db");
        assert_eq!(config.table_prefix, "site2_");
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.csv_batch_size, 250);
        assert_eq!(config.busy_timeout(), Duration::from_secs(45));
    }

    #[test]
    fn test_zero_busy_timeout_is_rejected() {
        let result = ExportConfig::from_lookup(lookup_from(&[(ENV_BUSY_TIMEOUT_SECS, "0")]));
        assert!(matches!(result, Err(ServiceError::Configuration(_))));
    }

    #[test]
    fn test_invalid_number_is_a_configuration_error() {
        let result = ExportConfig::from_lookup(lookup_from(&[(ENV_MAX_CONNECTIONS, "lots")]));
        assert!(matches!(result, Err(ServiceError::Configuration(_))));
    }

    #[test]
    fn test_unsafe_prefix_is_rejected() {
        let result = ExportConfig::from_lookup(lookup_from(&[(ENV_TABLE_PREFIX, "wp`; DROP")]));
        assert!(matches!(result, Err(ServiceError::Configuration(_))));
    }

    #[test]
    fn test_deserialize_partial_json_uses_defaults() {
        let config: ExportConfig = serde_json::from_str(r#"{"databaseUrl":"sqlite::memory:"}"#).unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.table_prefix, "wp_");
        assert_eq!(config.csv_batch_size, 1000);
        assert_eq!(config.busy_timeout_secs, 300);
    }
}
