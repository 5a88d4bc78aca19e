//! SQLite driver implementation

use async_trait::async_trait;
use dbsalvage_core::{
    Connection, ConnectionConfig, DatabaseDriver, ExportDialect, Result, SalvageError,
};
use std::sync::Arc;

use crate::{SqliteConnection, SqliteExportDialect};

/// SQLite database driver
pub struct SqliteDriver;

impl SqliteDriver {
    /// Create a new SQLite driver instance
    pub fn new() -> Self {
        tracing::debug!("SQLite driver initialized");
        Self
    }
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn display_name(&self) -> &'static str {
        "SQLite"
    }

    fn export_dialect(&self) -> Arc<dyn ExportDialect> {
        Arc::new(SqliteExportDialect)
    }

    #[tracing::instrument(skip(self, config), fields(path = config.get_string("path").as_deref()))]
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        let path = config.get_string("path").ok_or_else(|| {
            SalvageError::Configuration(
                "SQLite requires a 'path' or 'database' parameter".into(),
            )
        })?;

        // SQLite has no session credentials or client character set
        if config.username.is_some() || config.charset().is_some() {
            tracing::debug!(
                charset = config.charset(),
                "ignoring credentials and charset for SQLite"
            );
        }

        let conn = SqliteConnection::open_read_only(&path).map_err(|e| {
            tracing::error!(error = %e, "failed to connect to SQLite database");
            e
        })?;

        tracing::info!(path = %path, "SQLite connection created");
        Ok(Arc::new(conn))
    }

    fn build_connection_string(&self, config: &ConnectionConfig) -> String {
        config
            .get_string("path")
            .unwrap_or_else(|| ":memory:".to_string())
    }
}
