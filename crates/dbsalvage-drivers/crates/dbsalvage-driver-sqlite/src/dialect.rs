//! SQLite extraction dialect
//!
//! Rows are paged in `rowid` order. Tables declared `WITHOUT ROWID` have no
//! such key and cannot be paged; a user column literally named `rowid`
//! shadows the built-in key.

use dbsalvage_core::{ExportDialect, Ident, PageWindow, Statement};

/// Catalog and paging SQL for SQLite
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteExportDialect;

const USER_TABLES: &str = "type = 'table' AND name NOT LIKE 'sqlite_%'";

impl ExportDialect for SqliteExportDialect {
    fn id(&self) -> &'static str {
        "sqlite"
    }

    fn stable_row_key(&self) -> &'static str {
        "rowid"
    }

    fn list_tables(&self) -> Statement {
        Statement::new(format!(
            "SELECT name FROM sqlite_master WHERE {USER_TABLES} ORDER BY name"
        ))
    }

    fn list_columns(&self, table: &Ident) -> Statement {
        Statement::with_params(
            "SELECT name FROM pragma_table_info(?1) ORDER BY cid",
            vec![table.as_str().into()],
        )
    }

    fn schema_columns(&self) -> Statement {
        Statement::new(
            "SELECT m.name AS table_name, p.cid AS position, p.name AS column_name, \
             p.type AS data_type, p.\"notnull\" AS not_null, p.dflt_value AS default_value, \
             p.pk AS primary_key \
             FROM sqlite_master AS m, pragma_table_info(m.name) AS p \
             WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite_%' \
             ORDER BY m.name, p.cid",
        )
    }

    fn select_page(&self, table: &Ident, columns: &[Ident], window: PageWindow) -> Statement {
        let base = format!(
            "SELECT {} FROM {} ORDER BY {}",
            self.select_list(columns),
            self.quote_ident(table),
            self.stable_row_key()
        );

        match (window.limit, window.offset) {
            (None, 0) => Statement::new(base),
            // LIMIT -1 is SQLite's "no limit"
            (None, offset) => {
                Statement::with_params(format!("{base} LIMIT -1 OFFSET ?1"), vec![offset.into()])
            }
            (Some(limit), offset) => Statement::with_params(
                format!("{base} LIMIT ?1 OFFSET ?2"),
                vec![limit.into(), offset.into()],
            ),
        }
    }
}
