//! Column discovery and partitioning
//!
//! Very wide selects are what tends to crash a fragile server, so a table's
//! columns are split into groups of at most `max_columns`. Each group is
//! exported to its own artifact; group 0 is the primary one.

use dbsalvage_core::{Connection, ExportDialect, Ident};

use crate::runner::{self, first_column_strings};
use crate::{ExtractError, Result, RowPage};

/// A bounded slice of a table's columns, exported to its own artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnGroup {
    pub index: usize,
    /// Empty means every column (`SELECT *`)
    pub columns: Vec<Ident>,
}

impl ColumnGroup {
    pub fn new(index: usize, columns: Vec<Ident>) -> Self {
        Self { index, columns }
    }

    pub fn is_primary(&self) -> bool {
        self.index == 0
    }
}

/// Split `columns` into consecutive groups of `max_columns`, the last one
/// possibly smaller. An empty column list yields one empty group.
pub fn partition(columns: Vec<Ident>, max_columns: usize) -> Vec<ColumnGroup> {
    if columns.is_empty() {
        return vec![ColumnGroup::new(0, Vec::new())];
    }

    columns
        .chunks(max_columns.max(1))
        .enumerate()
        .map(|(index, chunk)| ColumnGroup::new(index, chunk.to_vec()))
        .collect()
}

/// Validate catalog names read from the first column of `page`
pub(crate) fn idents_from_page(
    dialect: &dyn ExportDialect,
    page: &RowPage,
) -> Result<Vec<Ident>> {
    first_column_strings(page)
        .into_iter()
        .map(|name| {
            let name = name.ok_or_else(|| ExtractError::InvalidIdentifier("NULL".into()))?;
            Ident::new(dialect.normalize_catalog_name(&name)).map_err(ExtractError::from)
        })
        .collect()
}

/// The table's column names in catalog order
pub async fn discover_columns(
    conn: &dyn Connection,
    dialect: &dyn ExportDialect,
    table: &Ident,
) -> Result<Vec<Ident>> {
    let page = runner::run(conn, &dialect.list_columns(table)).await?;
    idents_from_page(dialect, &page)
}

/// Discover the table's columns and partition them
#[tracing::instrument(skip(conn, dialect), fields(table = %table))]
pub async fn plan(
    conn: &dyn Connection,
    dialect: &dyn ExportDialect,
    table: &Ident,
    max_columns: usize,
) -> Result<Vec<ColumnGroup>> {
    let columns = discover_columns(conn, dialect, table).await?;
    let column_count = columns.len();
    let groups = partition(columns, max_columns);
    if groups.len() > 1 {
        tracing::info!(
            columns = column_count,
            max_columns,
            groups = groups.len(),
            "table split into column groups"
        );
    }
    Ok(groups)
}
