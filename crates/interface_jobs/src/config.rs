//! Job configuration

use std::time::Duration;

use config::builder::DefaultState;
use config::{ConfigBuilder, Environment};
use serde::Deserialize;

use core_kernel::YearId;
use domain_ledger::EngineConfig;
use infra_db::DatabaseConfig;

use crate::error::JobError;

/// Settings for the `fee-sync` job
///
/// Every field can be set through a `FEE_`-prefixed environment variable,
/// e.g. `FEE_YEAR_ID=2024-25` or `FEE_MAX_CONCURRENCY=4`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// PostgreSQL URL; ledgers are kept in memory when absent
    #[serde(default)]
    pub database_url: Option<String>,
    /// Maximum database connections
    pub db_max_connections: u32,
    /// Seconds a student task waits for a free connection
    pub db_acquire_timeout_secs: u64,
    /// JSON file holding students and fee catalogs
    pub snapshot_path: String,
    /// Academic year to sync
    pub year_id: String,
    pub max_concurrency: usize,
    pub batch_size: usize,
    pub max_conflict_retries: u32,
    /// Stop starting new students after this many seconds
    #[serde(default)]
    pub deadline_secs: Option<u64>,
    pub log_level: String,
    /// Emit JSON log lines instead of plain text
    pub log_json: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            database_url: None,
            db_max_connections: 10,
            db_acquire_timeout_secs: 30,
            snapshot_path: "reference.json".to_string(),
            year_id: String::new(),
            max_concurrency: engine.max_concurrency,
            batch_size: engine.batch_size,
            max_conflict_retries: engine.max_conflict_retries,
            deadline_secs: None,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl JobConfig {
    /// Loads configuration from `FEE_*` environment variables over the defaults
    pub fn from_env() -> Result<Self, JobError> {
        Self::from_builder(Self::defaults()?.add_source(Environment::with_prefix("FEE")))
    }

    /// A builder seeded with the default values
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, JobError> {
        let d = Self::default();
        Ok(config::Config::builder()
            .set_default("db_max_connections", d.db_max_connections)?
            .set_default("db_acquire_timeout_secs", d.db_acquire_timeout_secs)?
            .set_default("snapshot_path", d.snapshot_path)?
            .set_default("year_id", d.year_id)?
            .set_default("max_concurrency", d.max_concurrency as u64)?
            .set_default("batch_size", d.batch_size as u64)?
            .set_default("max_conflict_retries", d.max_conflict_retries)?
            .set_default("log_level", d.log_level)?
            .set_default("log_json", d.log_json)?)
    }

    /// Builds and validates a configuration from any set of sources
    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, JobError> {
        let config: JobConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), JobError> {
        if self.year_id.trim().is_empty() {
            return Err(JobError::InvalidConfig("year_id is required".to_string()));
        }
        if self.database_url.is_some() && self.db_max_connections == 0 {
            return Err(JobError::InvalidConfig(
                "db_max_connections must be at least 1".to_string(),
            ));
        }
        if self.snapshot_path.trim().is_empty() {
            return Err(JobError::InvalidConfig("snapshot_path is required".to_string()));
        }
        self.engine_config()
            .validate()
            .map_err(|e| JobError::InvalidConfig(e.to_string()))
    }

    pub fn year(&self) -> YearId {
        YearId::new(self.year_id.trim())
    }

    /// Pool settings for `database_url`, if one is configured
    pub fn database_config(&self) -> Option<DatabaseConfig> {
        self.database_url.as_deref().map(|url| {
            DatabaseConfig::new(url)
                .max_connections(self.db_max_connections)
                .acquire_timeout(Duration::from_secs(self.db_acquire_timeout_secs))
        })
    }

    /// Engine limits derived from this configuration
    pub fn engine_config(&self) -> EngineConfig {
        let config = EngineConfig::new()
            .max_concurrency(self.max_concurrency)
            .batch_size(self.batch_size)
            .max_conflict_retries(self.max_conflict_retries);
        match self.deadline_secs {
            Some(secs) => config.deadline(Duration::from_secs(secs)),
            None => config,
        }
    }
}
