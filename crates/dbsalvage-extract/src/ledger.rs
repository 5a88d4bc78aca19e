//! Record of tables that lost columns or failed outright

use dbsalvage_core::{Ident, Value};
use indexmap::IndexMap;

use crate::RowPage;

/// Tables in the order they were recorded, each with its quarantined columns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureLedger {
    entries: IndexMap<Ident, Vec<Ident>>,
}

impl FailureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `table`. Recording a table again adds to its columns.
    pub fn record(&mut self, table: Ident, quarantined: &[Ident]) {
        let columns = self.entries.entry(table).or_default();
        for column in quarantined {
            if !columns.contains(column) {
                columns.push(column.clone());
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, table: &Ident) -> Option<&[Ident]> {
        self.entries.get(table).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Ident, &[Ident])> {
        self.entries.iter().map(|(t, c)| (t, c.as_slice()))
    }

    /// The persisted form: `failed_table`, `failed_columns` (names joined with `|`)
    pub fn to_page(&self) -> RowPage {
        let rows = self
            .iter()
            .map(|(table, columns)| {
                let joined = columns
                    .iter()
                    .map(Ident::as_str)
                    .collect::<Vec<_>>()
                    .join("|");
                vec![Value::from(table.as_str()), Value::from(joined)]
            })
            .collect();
        RowPage::new(vec!["failed_table".into(), "failed_columns".into()], rows)
    }
}
