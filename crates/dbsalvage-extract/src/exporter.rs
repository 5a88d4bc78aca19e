//! Paged export of a single table
//!
//! A table export moves through three states:
//!
//! - **Planning**: resolve the column groups and (best effort) the row count.
//! - **Paging**: for each round, fetch one page per group at the current
//!   offset, ordered by the dialect's stable row key, and write it out.
//!   The loop ends after a round in which any page came back short or empty.
//! - **Recovering**: a failed page fetch replaces the connection, probes the
//!   failing group's columns and retries the same page with the columns that
//!   passed. Each group gets one recovery; a second failure fails the table.
//!
//! The connection is owned by the export while it runs and handed back in
//! [`TableOutcome`]. It is `None` when the export ended on a failure that
//! may have poisoned the session.

use dbsalvage_core::{Connection, ExportDialect, Ident, PageWindow, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::checkpoint::{ExportCheckpoint, percent_complete};
use crate::config::DEFAULT_CHUNK_SIZE;
use crate::planner::{self, ColumnGroup};
use crate::sink::{Artifact, PageSink, WriteMode};
use crate::{ConnectionSupervisor, ExtractError, RowPage, probe, runner};

/// How rows are fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    /// Pages of `chunk_size` rows
    Chunked { chunk_size: u64 },
    /// One unbounded query per column group
    Whole,
}

/// Everything needed to export one table
#[derive(Debug, Clone)]
pub struct TableExportRequest {
    pub table: Ident,
    pub mode: ExportMode,
    /// First row to fetch. Ignored in `Whole` mode.
    pub resume_offset: u64,
    pub max_columns: usize,
    /// Export exactly these columns as a single group instead of asking the catalog
    pub columns_override: Option<Vec<Ident>>,
    /// Rows selected per column while probing
    pub probe_sample_size: u64,
}

impl TableExportRequest {
    pub fn new(table: Ident, mode: ExportMode) -> Self {
        let probe_sample_size = match mode {
            ExportMode::Chunked { chunk_size } => chunk_size,
            ExportMode::Whole => DEFAULT_CHUNK_SIZE,
        };
        Self {
            table,
            mode,
            resume_offset: 0,
            max_columns: crate::config::DEFAULT_MAX_COLUMNS,
            columns_override: None,
            probe_sample_size,
        }
    }

    pub fn with_resume_offset(mut self, offset: u64) -> Self {
        self.resume_offset = offset;
        self
    }

    pub fn with_max_columns(mut self, max_columns: usize) -> Self {
        self.max_columns = max_columns;
        self
    }

    pub fn with_columns(mut self, columns: Vec<Ident>) -> Self {
        self.columns_override = Some(columns);
        self
    }

    pub fn with_probe_sample_size(mut self, sample_size: u64) -> Self {
        self.probe_sample_size = sample_size;
        self
    }

    fn effective_resume_offset(&self) -> u64 {
        match self.mode {
            ExportMode::Chunked { .. } => self.resume_offset,
            ExportMode::Whole => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableStatus {
    /// Every column exported
    Success,
    /// Some columns were quarantined, the rest exported
    Partial,
    /// Not even the reduced column set could be exported
    Failed,
}

impl fmt::Display for TableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TableStatus::Success => "SUCCESS",
            TableStatus::Partial => "PARTIAL",
            TableStatus::Failed => "FAILED",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableExportResult {
    pub table: Ident,
    pub status: TableStatus,
    pub quarantined_columns: Vec<Ident>,
    /// Rows written to the primary artifact by this export
    pub rows_exported: u64,
    pub error: Option<String>,
}

/// Result of one table export plus the connection, if still usable
pub struct TableOutcome {
    pub result: TableExportResult,
    pub connection: Option<Arc<dyn Connection>>,
}

/// Early exit from a table export
struct Abort {
    error: ExtractError,
    connection: Option<Arc<dyn Connection>>,
}

impl Abort {
    fn lost(error: ExtractError) -> Self {
        Self {
            error,
            connection: None,
        }
    }
}

#[derive(Default)]
struct TableProgress {
    quarantined: Vec<Ident>,
    rows_exported: u64,
}

impl TableProgress {
    fn quarantine(&mut self, columns: &[Ident]) {
        for column in columns {
            if !self.quarantined.contains(column) {
                self.quarantined.push(column.clone());
            }
        }
    }
}

/// Exports tables page by page, isolating broken columns
pub struct ChunkedTableExporter {
    supervisor: Arc<ConnectionSupervisor>,
    dialect: Arc<dyn ExportDialect>,
    sink: Arc<dyn PageSink>,
}

impl ChunkedTableExporter {
    pub fn new(
        supervisor: Arc<ConnectionSupervisor>,
        dialect: Arc<dyn ExportDialect>,
        sink: Arc<dyn PageSink>,
    ) -> Self {
        Self {
            supervisor,
            dialect,
            sink,
        }
    }

    /// Export one table. Never returns an error: failures are reported in
    /// the result with status `Failed`.
    #[tracing::instrument(skip(self, conn, request), fields(table = %request.table))]
    pub async fn export(
        &self,
        conn: Arc<dyn Connection>,
        request: &TableExportRequest,
    ) -> TableOutcome {
        let started = Instant::now();
        let mut progress = TableProgress::default();

        let (status, error, connection) = match self.run(conn, request, &mut progress).await {
            Ok(conn) if progress.quarantined.is_empty() => (TableStatus::Success, None, Some(conn)),
            Ok(conn) => (TableStatus::Partial, None, Some(conn)),
            Err(abort) => {
                tracing::error!(error = %abort.error, "table export failed");
                (
                    TableStatus::Failed,
                    Some(abort.error.to_string()),
                    abort.connection,
                )
            }
        };

        tracing::info!(
            %status,
            rows = progress.rows_exported,
            quarantined = progress.quarantined.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "table export finished"
        );

        TableOutcome {
            result: TableExportResult {
                table: request.table.clone(),
                status,
                quarantined_columns: progress.quarantined,
                rows_exported: progress.rows_exported,
                error,
            },
            connection,
        }
    }

    async fn run(
        &self,
        conn: Arc<dyn Connection>,
        request: &TableExportRequest,
        progress: &mut TableProgress,
    ) -> Result<Arc<dyn Connection>, Abort> {
        let mut groups = match &request.columns_override {
            Some(columns) => vec![ColumnGroup::new(0, columns.clone())],
            None => {
                let planned = planner::plan(
                    conn.as_ref(),
                    self.dialect.as_ref(),
                    &request.table,
                    request.max_columns,
                )
                .await;
                match planned {
                    Ok(groups) => groups,
                    Err(e) => return Err(self.abort(conn, e).await),
                }
            }
        };

        let (total_rows, mut conn) = self.count_rows(conn, &request.table).await?;

        if request.mode == ExportMode::Whole && request.resume_offset > 0 {
            tracing::warn!(
                resume_offset = request.resume_offset,
                "resume offset ignored without chunking"
            );
        }
        let resume_offset = request.effective_resume_offset();
        let mut checkpoint = ExportCheckpoint::start(request.table.clone(), resume_offset);
        if resume_offset > 0 {
            tracing::info!(
                table = %checkpoint.table(),
                offset = checkpoint.row_offset(),
                "resuming table export"
            );
        }
        let mut recovered = vec![false; groups.len()];
        // a resumed export appends to what the previous run wrote
        let mut written = vec![resume_offset > 0; groups.len()];
        // column layout of each artifact, fixed by the write that created it
        let mut layouts: Vec<Option<Vec<Ident>>> = groups
            .iter()
            .map(|g| (resume_offset > 0).then(|| g.columns.clone()))
            .collect();

        loop {
            let mut end_of_table = false;

            for (gi, group) in groups.iter_mut().enumerate() {
                checkpoint.enter_group(gi);
                let window = match request.mode {
                    ExportMode::Chunked { chunk_size } => {
                        PageWindow::new(checkpoint.row_offset(), chunk_size)
                    }
                    ExportMode::Whole => PageWindow::unbounded(),
                };

                let (page, next) = self
                    .fetch_group(
                        conn,
                        request,
                        group,
                        &mut recovered[gi],
                        written[gi],
                        window,
                        progress,
                    )
                    .await?;
                conn = next;

                let mode = if written[gi] {
                    WriteMode::Append
                } else {
                    WriteMode::Create
                };
                let layout = layouts[gi].get_or_insert_with(|| group.columns.clone());
                let page = page.align_to(&group.columns, layout);
                let artifact = Artifact::table_group(&request.table, gi);
                if let Err(e) = self.sink.write(&artifact, &page, mode) {
                    return Err(Abort {
                        error: e,
                        connection: Some(conn),
                    });
                }
                written[gi] = true;

                if group.is_primary() {
                    progress.rows_exported += page.len() as u64;
                    let position = checkpoint.row_offset() + page.len() as u64;
                    tracing::info!(
                        group = checkpoint.group_index(),
                        offset = checkpoint.row_offset(),
                        rows = page.len(),
                        percent = percent_complete(position, total_rows),
                        "page exported"
                    );
                }

                if let ExportMode::Chunked { chunk_size } = request.mode
                    && (page.is_empty() || (page.len() as u64) < chunk_size)
                {
                    end_of_table = true;
                }
            }

            match request.mode {
                ExportMode::Whole => break,
                ExportMode::Chunked { chunk_size } => {
                    checkpoint.advance(chunk_size);
                    if end_of_table {
                        break;
                    }
                }
            }
        }

        Ok(conn)
    }

    /// Fetch one page for `group`, recovering from a failure at most once
    /// per group.
    #[allow(clippy::too_many_arguments)]
    async fn fetch_group(
        &self,
        mut conn: Arc<dyn Connection>,
        request: &TableExportRequest,
        group: &mut ColumnGroup,
        recovered: &mut bool,
        already_written: bool,
        window: PageWindow,
        progress: &mut TableProgress,
    ) -> Result<(RowPage, Arc<dyn Connection>), Abort> {
        loop {
            let stmt = self
                .dialect
                .select_page(&request.table, &group.columns, window);
            let err = match runner::run(conn.as_ref(), &stmt).await {
                Ok(page) => return Ok((page, conn)),
                Err(e) => e,
            };

            if *recovered {
                self.supervisor.discard(conn).await;
                return Err(Abort::lost(ExtractError::PartialExport {
                    table: request.table.to_string(),
                    reason: format!(
                        "column group {} failed again after quarantine: {}",
                        group.index, err
                    ),
                }));
            }
            *recovered = true;

            tracing::warn!(
                group = group.index,
                offset = window.offset,
                error = %err,
                "page fetch failed, probing columns"
            );
            conn = self.supervisor.replace(conn).await.map_err(Abort::lost)?;
            let report = probe::probe(
                &self.supervisor,
                self.dialect.as_ref(),
                conn,
                &request.table,
                request.probe_sample_size,
                &group.columns,
            )
            .await
            .map_err(Abort::lost)?;
            conn = report.connection;
            progress.quarantine(&report.bad);

            if report.good.is_empty() {
                return Err(Abort {
                    error: ExtractError::PartialExport {
                        table: request.table.to_string(),
                        reason: format!("no column of group {} survived probing", group.index),
                    },
                    connection: Some(conn),
                });
            }
            if already_written && !report.bad.is_empty() {
                tracing::warn!(
                    group = group.index,
                    quarantined = ?report.bad,
                    "columns quarantined mid-table, their fields stay empty for the remaining rows"
                );
            }
            tracing::info!(
                group = group.index,
                quarantined = ?report.bad,
                "retrying page without quarantined columns"
            );
            group.columns = report.good;
        }
    }

    /// Row count for progress reporting. A failed count only costs progress
    /// output, but the connection is replaced since the failure may have
    /// poisoned it.
    async fn count_rows(
        &self,
        conn: Arc<dyn Connection>,
        table: &Ident,
    ) -> Result<(Option<u64>, Arc<dyn Connection>), Abort> {
        match runner::run(conn.as_ref(), &self.dialect.count_rows(table)).await {
            Ok(page) => {
                let total = page.rows.first().and_then(|r| r.first()).and_then(Value::as_u64);
                tracing::info!(total_rows = total, "table size");
                Ok((total, conn))
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not count rows, progress will not be reported");
                let conn = self.supervisor.replace(conn).await.map_err(Abort::lost)?;
                Ok((None, conn))
            }
        }
    }

    /// Query failures may leave the session unusable, so the connection is
    /// dropped for those; other errors keep it.
    async fn abort(&self, conn: Arc<dyn Connection>, error: ExtractError) -> Abort {
        if matches!(error, ExtractError::Query(_)) {
            self.supervisor.discard(conn).await;
            Abort::lost(error)
        } else {
            Abort {
                error,
                connection: Some(conn),
            }
        }
    }
}
