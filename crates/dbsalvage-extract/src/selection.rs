//! Which tables a run exports

use dbsalvage_core::Ident;
use serde::{Deserialize, Serialize};

/// `all`, or an explicit list of table names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TableSelection {
    #[default]
    All,
    Named(Vec<String>),
}

impl TableSelection {
    /// Parse `all` (any case) or a `;`-separated list. Blank entries are skipped.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return TableSelection::All;
        }
        TableSelection::Named(
            trimmed
                .split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// The selected tables, in discovery order. Requested names that were not
    /// discovered are dropped with a warning.
    pub fn resolve(&self, discovered: &[Ident]) -> Vec<Ident> {
        match self {
            TableSelection::All => discovered.to_vec(),
            TableSelection::Named(names) => {
                for name in names {
                    if !discovered.iter().any(|t| t == name.as_str()) {
                        tracing::warn!(table = %name, "requested table not found, skipping");
                    }
                }
                discovered
                    .iter()
                    .filter(|t| names.iter().any(|n| *t == n.as_str()))
                    .cloned()
                    .collect()
            }
        }
    }
}

impl From<String> for TableSelection {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<TableSelection> for String {
    fn from(value: TableSelection) -> Self {
        match value {
            TableSelection::All => "all".to_string(),
            TableSelection::Named(names) => names.join(";"),
        }
    }
}
