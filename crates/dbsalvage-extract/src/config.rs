//! Run configuration
//!
//! Loaded from an optional TOML file; the CLI overrides individual fields
//! from flags and environment variables afterwards.
//!
//! ```toml
//! database = "/data/legacy.db"
//! tables = "CUSTOMERS;ORDERS"
//! chunk_size = 5000
//! server_start_command = "/etc/init.d/firebird start"
//! ```

use dbsalvage_core::ConnectionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::CatalogRunOptions;
use crate::exporter::ExportMode;
use crate::supervisor::{CommandServerHook, NoopServerHook, ServerHook, SupervisorConfig};
use crate::{ExtractError, Result, TableSelection};

pub const DEFAULT_CHUNK_SIZE: u64 = 10_000;
pub const DEFAULT_MAX_COLUMNS: usize = 1000;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;
pub const DEFAULT_WARMUP_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractConfig {
    /// Source database file
    pub database: Option<PathBuf>,
    pub user: String,
    pub password: String,
    pub charset: String,
    pub tables: TableSelection,
    pub chunk_size: u64,
    pub max_columns: usize,
    /// First row of the first selected table
    pub resume_offset: u64,
    /// One query per column group instead of pages
    pub no_chunks: bool,
    pub max_attempts: u32,
    pub warmup_secs: u64,
    pub output_dir: PathBuf,
    /// Command run before every connection attempt
    pub server_start_command: Option<String>,
    pub driver: String,
    /// Rows per column probe; defaults to `chunk_size`
    pub probe_sample_size: Option<u64>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            database: None,
            user: "SYSDBA".to_string(),
            password: "masterkey".to_string(),
            charset: "WIN1252".to_string(),
            tables: TableSelection::All,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_columns: DEFAULT_MAX_COLUMNS,
            resume_offset: 0,
            no_chunks: false,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            warmup_secs: DEFAULT_WARMUP_SECS,
            output_dir: PathBuf::from("./csv"),
            server_start_command: None,
            driver: "sqlite".to_string(),
            probe_sample_size: None,
        }
    }
}

impl ExtractConfig {
    /// Read a TOML config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ExtractError::io(path, e))?;
        Self::from_toml_str(&text)
            .map_err(|e| ExtractError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ExtractError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ExtractError::Config("chunk_size must be at least 1".into()));
        }
        if self.max_columns == 0 {
            return Err(ExtractError::Config("max_columns must be at least 1".into()));
        }
        if self.max_attempts == 0 {
            return Err(ExtractError::Config("max_attempts must be at least 1".into()));
        }
        if self.probe_sample_size == Some(0) {
            return Err(ExtractError::Config(
                "probe_sample_size must be at least 1".into(),
            ));
        }
        match &self.database {
            None => Err(ExtractError::Config("no database path given".into())),
            Some(path) if !path.is_file() => Err(ExtractError::Config(format!(
                "database file not found: {}",
                path.display()
            ))),
            Some(_) => Ok(()),
        }
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        let mut config = ConnectionConfig::new(&self.driver)
            .with_credentials(&self.user, &self.password)
            .with_param("charset", self.charset.clone());
        config.database = self
            .database
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());
        config
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig::new(self.max_attempts, Duration::from_secs(self.warmup_secs))
    }

    pub fn server_hook(&self) -> Arc<dyn ServerHook> {
        match self
            .server_start_command
            .as_deref()
            .and_then(CommandServerHook::from_command_line)
        {
            Some(hook) => Arc::new(hook),
            None => Arc::new(NoopServerHook),
        }
    }

    pub fn export_mode(&self) -> ExportMode {
        if self.no_chunks {
            ExportMode::Whole
        } else {
            ExportMode::Chunked {
                chunk_size: self.chunk_size,
            }
        }
    }

    pub fn run_options(&self) -> CatalogRunOptions {
        CatalogRunOptions {
            selection: self.tables.clone(),
            mode: self.export_mode(),
            resume_offset: self.resume_offset,
            max_columns: self.max_columns,
            probe_sample_size: self.probe_sample_size.unwrap_or(self.chunk_size),
        }
    }
}
