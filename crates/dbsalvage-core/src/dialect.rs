//! SQL rendering for extraction
//!
//! Drivers describe how their database lists tables and columns, how a
//! stable row ordering is expressed and how a bounded page of rows is
//! requested. The engine consumes this through `ExportDialect` and never
//! builds database-specific SQL itself.
//!
//! Identifiers are always rendered through `ExportDialect::quote_ident`;
//! literal values (table names in catalog lookups, page bounds) are bound as
//! parameters.

use crate::{Ident, Value};

/// A SQL statement with its bound parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Row window for a paged read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    /// Number of rows to skip in stable-key order
    pub offset: u64,
    /// Maximum number of rows to return; `None` reads to the end of the table
    pub limit: Option<u64>,
}

impl PageWindow {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit: Some(limit),
        }
    }

    /// The whole table in one read
    pub fn unbounded() -> Self {
        Self {
            offset: 0,
            limit: None,
        }
    }
}

/// Database-specific SQL used by the extraction engine
pub trait ExportDialect: Send + Sync {
    /// Dialect identifier (matches `Connection::dialect_id`)
    fn id(&self) -> &'static str;

    /// Quote an identifier for inclusion in SQL text
    fn quote_ident(&self, ident: &Ident) -> String {
        ident.quoted('"')
    }

    /// Expression that uniquely orders the rows of any user table,
    /// independent of user-visible columns.
    fn stable_row_key(&self) -> &'static str;

    /// User tables only (no system tables, no views), one name per row in
    /// the first column.
    fn list_tables(&self) -> Statement;

    /// The table's column names in catalog order, one per row in the first
    /// column.
    fn list_columns(&self, table: &Ident) -> Statement;

    /// The catalog relation describing every column of every table
    fn schema_columns(&self) -> Statement;

    /// Turn a name read back from `list_tables` or `list_columns` into the
    /// name used in SQL. Catalogs that store names in blank-padded CHAR
    /// columns trim the padding here; the default keeps the name verbatim.
    fn normalize_catalog_name<'a>(&self, name: &'a str) -> &'a str {
        name
    }

    /// Exact row count of a table
    fn count_rows(&self, table: &Ident) -> Statement {
        Statement::new(format!("SELECT COUNT(*) FROM {}", self.quote_ident(table)))
    }

    /// Projection list for `columns`; an empty list selects every column
    fn select_list(&self, columns: &[Ident]) -> String {
        if columns.is_empty() {
            return "*".to_string();
        }
        columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// A window of rows ordered by the stable row key
    fn select_page(&self, table: &Ident, columns: &[Ident], window: PageWindow) -> Statement;

    /// A single column over the first `sample_size` rows
    fn probe_column(&self, table: &Ident, column: &Ident, sample_size: u64) -> Statement {
        self.select_page(
            table,
            std::slice::from_ref(column),
            PageWindow::new(0, sample_size),
        )
    }
}
