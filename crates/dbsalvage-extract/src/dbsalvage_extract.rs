//! Fault-tolerant extraction of database tables to flat files
//!
//! The engine pages through every selected table in a stable row order,
//! splitting very wide tables into column groups and quarantining columns
//! that make the server fail, so that one bad column does not cost the rest
//! of the table.
//!
//! - [`ConnectionSupervisor`] opens connections with bounded retry
//! - [`runner::run`] executes one statement
//! - [`planner::plan`] splits a table's columns into groups
//! - [`probe::probe`] finds the columns that cannot be selected
//! - [`ChunkedTableExporter`] drives the paging loop for one table
//! - [`CatalogExporter`] runs over every selected table and keeps the
//!   [`FailureLedger`]

pub mod catalog;
pub mod checkpoint;
pub mod config;
mod error;
pub mod exporter;
mod ledger;
pub mod planner;
pub mod probe;
pub mod runner;
mod selection;
pub mod sink;
pub mod supervisor;

pub use catalog::{CatalogExporter, CatalogRunOptions, RunSummary, discover_tables};
pub use checkpoint::ExportCheckpoint;
pub use config::ExtractConfig;
pub use error::{ExtractError, QueryError, Result};
pub use exporter::{
    ChunkedTableExporter, ExportMode, TableExportRequest, TableExportResult, TableOutcome,
    TableStatus,
};
pub use ledger::FailureLedger;
pub use planner::ColumnGroup;
pub use probe::ProbeReport;
pub use runner::RowPage;
pub use selection::TableSelection;
pub use sink::{Artifact, CsvDirectorySink, CsvOptions, PageSink, WriteMode};
pub use supervisor::{
    CommandServerHook, ConnectionSupervisor, NoopServerHook, ServerHook, SupervisorConfig,
};
