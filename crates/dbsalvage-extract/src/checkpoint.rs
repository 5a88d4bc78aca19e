//! Paging cursor for one table export

use dbsalvage_core::Ident;

/// Where the paging loop of a table currently is.
///
/// The offset only moves forward. It lives for one table's export; resuming
/// across processes goes through the caller-supplied resume offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportCheckpoint {
    table: Ident,
    group_index: usize,
    row_offset: u64,
}

impl ExportCheckpoint {
    pub fn start(table: Ident, resume_offset: u64) -> Self {
        Self {
            table,
            group_index: 0,
            row_offset: resume_offset,
        }
    }

    pub fn table(&self) -> &Ident {
        &self.table
    }

    pub fn group_index(&self) -> usize {
        self.group_index
    }

    pub fn row_offset(&self) -> u64 {
        self.row_offset
    }

    pub fn enter_group(&mut self, group_index: usize) {
        self.group_index = group_index;
    }

    /// Move past a completed round of pages
    pub fn advance(&mut self, chunk_size: u64) {
        self.row_offset = self.row_offset.saturating_add(chunk_size);
        self.group_index = 0;
    }
}

/// Share of `total` rows read so far, as a percentage with two decimals.
/// `None` when the total is unknown or zero.
pub fn percent_complete(rows_read: u64, total: Option<u64>) -> Option<f64> {
    match total {
        Some(total) if total > 0 => {
            let pct = rows_read as f64 / total as f64 * 100.0;
            Some((pct * 100.0).round() / 100.0)
        }
        _ => None,
    }
}
