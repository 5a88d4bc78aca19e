//! Database driver trait definition

use crate::{Connection, ExportDialect, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Core driver trait that all database drivers must implement
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Unique identifier for this driver (e.g., "sqlite")
    fn id(&self) -> &'static str {
        self.name()
    }

    /// Short name used for registry lookups
    fn name(&self) -> &'static str;

    /// Human-readable name
    fn display_name(&self) -> &'static str {
        self.name()
    }

    /// SQL rendering rules for catalog discovery and paged reads.
    ///
    /// This is the extension point for database-specific syntax: the engine
    /// never hardcodes per-driver SQL.
    fn export_dialect(&self) -> Arc<dyn ExportDialect>;

    /// Create a new connection
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>>;

    /// Open a connection and run a trivial query
    async fn test_connection(&self, config: &ConnectionConfig) -> Result<()> {
        let conn = self.connect(config).await?;
        conn.query("SELECT 1", &[]).await?;
        conn.close().await
    }

    /// Build a connection string from configuration, for logging
    fn build_connection_string(&self, config: &ConnectionConfig) -> String;
}

/// Connection configuration
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    /// Driver ID (e.g., "sqlite")
    pub driver: String,
    /// Host address (empty for file-based databases)
    pub host: String,
    /// Port number (0 for default or file-based)
    pub port: u16,
    /// Database name or file path
    pub database: Option<String>,
    /// Username
    pub username: Option<String>,
    /// Password
    pub password: Option<String>,
    /// Additional connection parameters (e.g. "charset")
    pub params: HashMap<String, String>,
}

impl ConnectionConfig {
    /// Create a new configuration with default values
    pub fn new(driver: &str) -> Self {
        Self {
            driver: driver.to_string(),
            ..Default::default()
        }
    }

    /// Create a SQLite configuration
    pub fn new_sqlite(database_path: &str) -> Self {
        let mut config = Self::new("sqlite");
        config.database = Some(database_path.to_string());
        config
    }

    /// Set credentials
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    /// Set a connection parameter
    pub fn with_param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Get a string parameter
    pub fn get_string(&self, key: &str) -> Option<String> {
        if let Some(val) = self.params.get(key) {
            return Some(val.clone());
        }
        match key {
            "host" if !self.host.is_empty() => Some(self.host.clone()),
            "database" | "path" => self.database.clone(),
            "username" | "user" => self.username.clone(),
            "password" => self.password.clone(),
            _ => None,
        }
    }

    /// Character set requested for the session, if any
    pub fn charset(&self) -> Option<&str> {
        self.params.get("charset").map(String::as_str)
    }
}
