//! Single-statement execution

use dbsalvage_core::{Connection, Ident, QueryResult, Statement, Value};
use std::time::Instant;

use crate::QueryError;

/// Rows returned by one statement, with the result column names
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowPage {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowPage {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Lay the page out as `layout`. The page holds the `selected` columns in
    /// order; layout columns missing from `selected` come out as NULL.
    pub fn align_to(self, selected: &[Ident], layout: &[Ident]) -> RowPage {
        if layout.is_empty() || selected == layout {
            return self;
        }
        let positions: Vec<Option<usize>> = layout
            .iter()
            .map(|column| selected.iter().position(|s| s == column))
            .collect();
        let rows = self
            .rows
            .into_iter()
            .map(|row| {
                let mut cells: Vec<Option<Value>> = row.into_iter().map(Some).collect();
                positions
                    .iter()
                    .map(|p| {
                        p.and_then(|i| cells.get_mut(i).and_then(Option::take))
                            .unwrap_or(Value::Null)
                    })
                    .collect()
            })
            .collect();
        RowPage {
            columns: layout.iter().map(|c| c.as_str().to_string()).collect(),
            rows,
        }
    }
}

impl From<QueryResult> for RowPage {
    fn from(result: QueryResult) -> Self {
        let columns = result.column_names();
        let rows = result.rows.into_iter().map(|r| r.into_values()).collect();
        Self { columns, rows }
    }
}

/// Execute one statement. No retry and no reconnect: on error the caller
/// decides what happens to the connection.
pub async fn run(conn: &dyn Connection, stmt: &Statement) -> Result<RowPage, QueryError> {
    tracing::debug!(sql = %stmt.sql, params = ?stmt.params, "running query");
    let started = Instant::now();

    let result = conn
        .query(&stmt.sql, &stmt.params)
        .await
        .map_err(|e| QueryError::new(stmt.sql.clone(), e))?;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    tracing::info!(elapsed_ms, rows = result.row_count(), "query finished");
    Ok(result.into())
}

/// Read the first column of every row as text, e.g. a catalog name listing
pub(crate) fn first_column_strings(page: &RowPage) -> Vec<Option<String>> {
    page.rows
        .iter()
        .map(|row| match row.first() {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn idents(names: &[&str]) -> Vec<Ident> {
        names.iter().map(|n| Ident::new(*n).unwrap()).collect()
    }

    #[test]
    fn test_align_fills_dropped_columns_with_null() {
        let page = RowPage::new(
            vec!["ID".into(), "Y".into()],
            vec![
                vec![Value::Int64(11), Value::String("y11".into())],
                vec![Value::Int64(12), Value::String("y12".into())],
            ],
        );

        let aligned = page.align_to(&idents(&["ID", "Y"]), &idents(&["ID", "X", "Y"]));

        assert_eq!(aligned.columns, vec!["ID", "X", "Y"]);
        assert_eq!(
            aligned.rows,
            vec![
                vec![Value::Int64(11), Value::Null, Value::String("y11".into())],
                vec![Value::Int64(12), Value::Null, Value::String("y12".into())],
            ]
        );
    }

    #[test]
    fn test_align_keeps_page_matching_layout() {
        let page = RowPage::new(vec!["ID".into()], vec![vec![Value::Int64(1)]]);
        let aligned = page.clone().align_to(&idents(&["ID"]), &idents(&["ID"]));
        assert_eq!(aligned, page);
    }
}
