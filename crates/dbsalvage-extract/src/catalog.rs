//! Whole-database export run

use dbsalvage_core::{Connection, ExportDialect, Ident};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::exporter::{
    ChunkedTableExporter, ExportMode, TableExportRequest, TableExportResult, TableStatus,
};
use crate::planner::idents_from_page;
use crate::sink::{Artifact, PageSink, WriteMode};
use crate::{ConnectionSupervisor, ExtractError, FailureLedger, Result, TableSelection, runner};

/// Settings for one run over the catalog
#[derive(Debug, Clone)]
pub struct CatalogRunOptions {
    pub selection: TableSelection,
    pub mode: ExportMode,
    /// Applied to the first selected table only
    pub resume_offset: u64,
    pub max_columns: usize,
    pub probe_sample_size: u64,
}

/// What a run did
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub ledger: FailureLedger,
    pub results: Vec<TableExportResult>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn count(&self, status: TableStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }
}

/// User tables of the database, in catalog order
pub async fn discover_tables(
    conn: &dyn Connection,
    dialect: &dyn ExportDialect,
) -> Result<Vec<Ident>> {
    let page = runner::run(conn, &dialect.list_tables()).await?;
    idents_from_page(dialect, &page)
}

/// Exports every selected table and keeps the failure ledger
pub struct CatalogExporter {
    supervisor: Arc<ConnectionSupervisor>,
    dialect: Arc<dyn ExportDialect>,
    sink: Arc<dyn PageSink>,
    exporter: ChunkedTableExporter,
}

impl CatalogExporter {
    pub fn new(
        supervisor: Arc<ConnectionSupervisor>,
        dialect: Arc<dyn ExportDialect>,
        sink: Arc<dyn PageSink>,
    ) -> Self {
        let exporter =
            ChunkedTableExporter::new(supervisor.clone(), dialect.clone(), sink.clone());
        Self {
            supervisor,
            dialect,
            sink,
            exporter,
        }
    }

    /// Run the export.
    ///
    /// Only connection exhaustion and problems before the first table
    /// (listing tables, clearing the output) end the run with an error.
    /// Per-table failures are recorded in the ledger and the run moves on.
    #[tracing::instrument(skip_all, fields(dialect = self.dialect.id()))]
    pub async fn run(&self, options: &CatalogRunOptions) -> Result<RunSummary> {
        let started = Instant::now();

        let conn = self.supervisor.acquire().await?;
        if let Err(e) = self.check_dialect(conn.as_ref()) {
            self.supervisor.discard(conn).await;
            return Err(e);
        }

        let discovered = match discover_tables(conn.as_ref(), self.dialect.as_ref()).await {
            Ok(tables) => tables,
            Err(e) => {
                self.supervisor.discard(conn).await;
                return Err(e);
            }
        };
        let tables = options.selection.resolve(&discovered);
        tracing::info!(
            discovered = discovered.len(),
            selected = tables.len(),
            "tables resolved"
        );

        if let Err(e) = self.sink.reset() {
            self.supervisor.discard(conn).await;
            return Err(e);
        }

        let mut current = Some(self.export_schema(conn).await?);
        let mut ledger = FailureLedger::new();
        let mut results = Vec::with_capacity(tables.len());

        for (i, table) in tables.iter().enumerate() {
            let conn = match current.take() {
                Some(conn) => conn,
                None => match self.supervisor.acquire().await {
                    Ok(conn) => conn,
                    Err(e) => {
                        if let Err(write_err) = self.write_ledger(&ledger) {
                            tracing::error!(error = %write_err, "could not write failure ledger");
                        }
                        return Err(e);
                    }
                },
            };

            tracing::info!(
                table = %table,
                index = i + 1,
                total = tables.len(),
                "exporting table"
            );
            let request = TableExportRequest {
                table: table.clone(),
                mode: options.mode,
                resume_offset: if i == 0 { options.resume_offset } else { 0 },
                max_columns: options.max_columns,
                columns_override: None,
                probe_sample_size: options.probe_sample_size,
            };
            let outcome = self.exporter.export(conn, &request).await;

            if outcome.result.status != TableStatus::Success {
                ledger.record(table.clone(), &outcome.result.quarantined_columns);
            }
            current = outcome.connection;
            results.push(outcome.result);
        }

        if let Some(conn) = current {
            self.supervisor.discard(conn).await;
        }
        self.write_ledger(&ledger)?;

        let summary = RunSummary {
            ledger,
            results,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            success = summary.count(TableStatus::Success),
            partial = summary.count(TableStatus::Partial),
            failed = summary.count(TableStatus::Failed),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "run finished"
        );
        Ok(summary)
    }

    fn check_dialect(&self, conn: &dyn Connection) -> Result<()> {
        match conn.dialect_id() {
            Some(id) if id != self.dialect.id() => Err(ExtractError::UnsupportedDialect(format!(
                "connection speaks {}, exporter renders {}",
                id,
                self.dialect.id()
            ))),
            _ => Ok(()),
        }
    }

    /// Export the catalog's column listing. Best effort: a failed query
    /// replaces the connection and the run continues.
    async fn export_schema(&self, conn: Arc<dyn Connection>) -> Result<Arc<dyn Connection>> {
        match runner::run(conn.as_ref(), &self.dialect.schema_columns()).await {
            Ok(page) => {
                if let Err(e) = self.sink.write(&Artifact::SchemaColumns, &page, WriteMode::Create)
                {
                    tracing::warn!(error = %e, "could not write schema columns");
                }
                Ok(conn)
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not read schema columns");
                self.supervisor.replace(conn).await
            }
        }
    }

    fn write_ledger(&self, ledger: &FailureLedger) -> Result<()> {
        if ledger.is_empty() {
            return Ok(());
        }
        self.sink
            .write(&Artifact::FailedTables, &ledger.to_page(), WriteMode::Create)?;
        tracing::warn!(tables = ledger.len(), "failure ledger written");
        Ok(())
    }
}
