//! Per-column fault isolation
//!
//! Runs after a page fetch has failed: each column is selected on its own
//! over the first `sample_size` rows. Columns that fail are BAD and get
//! quarantined. This costs one round trip per column, so it stays off the
//! happy path.

use dbsalvage_core::{Connection, ExportDialect, Ident};
use std::sync::Arc;

use crate::{ConnectionSupervisor, Result, runner};

/// Outcome of probing a set of columns
pub struct ProbeReport {
    /// Columns that could be selected, in input order
    pub good: Vec<Ident>,
    /// Columns whose select failed, in input order
    pub bad: Vec<Ident>,
    /// The live connection after probing
    pub connection: Arc<dyn Connection>,
}

impl std::fmt::Debug for ProbeReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeReport")
            .field("good", &self.good)
            .field("bad", &self.bad)
            .finish_non_exhaustive()
    }
}

/// Probe every column of `columns` independently.
///
/// A failed probe may leave the session unusable, so the connection is
/// replaced before the next column. Only running out of connection
/// attempts is an error.
#[tracing::instrument(skip(supervisor, dialect, conn, columns), fields(table = %table, columns = columns.len()))]
pub async fn probe(
    supervisor: &ConnectionSupervisor,
    dialect: &dyn ExportDialect,
    mut conn: Arc<dyn Connection>,
    table: &Ident,
    sample_size: u64,
    columns: &[Ident],
) -> Result<ProbeReport> {
    let mut good = Vec::new();
    let mut bad = Vec::new();

    for column in columns {
        let stmt = dialect.probe_column(table, column, sample_size);
        match runner::run(conn.as_ref(), &stmt).await {
            Ok(_) => good.push(column.clone()),
            Err(e) => {
                tracing::warn!(column = %column, error = %e, "column failed probe");
                bad.push(column.clone());
                conn = supervisor.replace(conn).await?;
            }
        }
    }

    tracing::info!(good = good.len(), bad = bad.len(), "probe finished");
    Ok(ProbeReport {
        good,
        bad,
        connection: conn,
    })
}
