//! dbsalvage drivers - database driver implementations
//!
//! This crate provides concrete implementations of the driver traits defined
//! in `dbsalvage-core`, each behind a cargo feature.

#[cfg(feature = "sqlite")]
pub use dbsalvage_driver_sqlite as sqlite;

mod registry;

pub use registry::DriverRegistry;

/// Re-export commonly used types from dbsalvage-core
pub use dbsalvage_core::{
    ColumnMeta, Connection, ConnectionConfig, DatabaseDriver, ExportDialect, QueryResult, Result,
    Row, SalvageError, StatementResult, Value,
};
