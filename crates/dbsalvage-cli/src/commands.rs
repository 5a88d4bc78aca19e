//! Subcommand handlers

use anyhow::{Context, Result, anyhow};
use comfy_table::{Cell, Color, Table, presets::UTF8_FULL};
use dbsalvage_core::{DatabaseDriver, Ident, Value};
use dbsalvage_drivers::DriverRegistry;
use dbsalvage_extract::{
    CatalogExporter, ConnectionSupervisor, CsvDirectorySink, ExtractConfig, RunSummary,
    TableStatus, discover_tables, planner, probe, runner,
};
use std::sync::Arc;

/// Driver and supervisor built from a validated config
struct Session {
    driver: Arc<dyn DatabaseDriver>,
    supervisor: Arc<ConnectionSupervisor>,
}

impl Session {
    fn open(config: &ExtractConfig) -> Result<Self> {
        config.validate()?;

        let registry = DriverRegistry::with_defaults();
        let driver = registry.get(&config.driver).ok_or_else(|| {
            anyhow!(
                "unknown driver '{}', available: {}",
                config.driver,
                registry.list().join(", ")
            )
        })?;
        tracing::info!(
            driver = driver.display_name(),
            target = %driver.build_connection_string(&config.connection_config()),
            "using driver"
        );

        let supervisor = Arc::new(ConnectionSupervisor::new(
            driver.clone(),
            config.connection_config(),
            config.server_hook(),
            config.supervisor_config(),
        ));
        Ok(Self { driver, supervisor })
    }
}

/// Run the full export and print the per-table summary
pub async fn export(config: &ExtractConfig) -> Result<()> {
    let session = Session::open(config)?;
    let sink = Arc::new(CsvDirectorySink::new(&config.output_dir));
    let exporter = CatalogExporter::new(
        session.supervisor.clone(),
        session.driver.export_dialect(),
        sink,
    );

    let summary = exporter
        .run(&config.run_options())
        .await
        .context("export aborted")?;

    println!("{}", summary_table(&summary));
    println!(
        "{} succeeded, {} partial, {} failed in {:.1}s, output in {}",
        summary.count(TableStatus::Success),
        summary.count(TableStatus::Partial),
        summary.count(TableStatus::Failed),
        summary.elapsed.as_secs_f64(),
        config.output_dir.display()
    );
    Ok(())
}

/// List user tables with their row counts
pub async fn tables(config: &ExtractConfig) -> Result<()> {
    let session = Session::open(config)?;
    let dialect = session.driver.export_dialect();
    let conn = session.supervisor.acquire().await?;

    let names = discover_tables(conn.as_ref(), dialect.as_ref()).await?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Table", "Rows"]);
    for name in &names {
        let rows = match runner::run(conn.as_ref(), &dialect.count_rows(name)).await {
            Ok(page) => page
                .rows
                .first()
                .and_then(|r| r.first())
                .and_then(Value::as_u64)
                .map(|n| n.to_string())
                .unwrap_or_else(|| "?".to_string()),
            Err(e) => {
                tracing::warn!(table = %name, error = %e, "could not count rows");
                "error".to_string()
            }
        };
        table.add_row(vec![Cell::new(name), Cell::new(rows)]);
    }

    session.supervisor.discard(conn).await;
    println!("{table}");
    println!("{} tables", names.len());
    Ok(())
}

/// Probe every column of one table and print which ones can be read
pub async fn probe_table(config: &ExtractConfig, table_name: &str) -> Result<()> {
    let session = Session::open(config)?;
    let dialect = session.driver.export_dialect();
    let table = Ident::new(table_name)?;

    let conn = session.supervisor.acquire().await?;
    let columns = planner::discover_columns(conn.as_ref(), dialect.as_ref(), &table)
        .await
        .with_context(|| format!("could not list the columns of {table}"))?;
    if columns.is_empty() {
        session.supervisor.discard(conn).await;
        return Err(anyhow!("table {table} not found or has no columns"));
    }

    let sample_size = config.run_options().probe_sample_size;
    let report = probe::probe(
        &session.supervisor,
        dialect.as_ref(),
        conn,
        &table,
        sample_size,
        &columns,
    )
    .await?;
    session.supervisor.discard(report.connection.clone()).await;

    let mut output = Table::new();
    output.load_preset(UTF8_FULL).set_header(vec!["Column", "Result"]);
    for column in &columns {
        let cell = if report.bad.contains(column) {
            Cell::new("BAD").fg(Color::Red)
        } else {
            Cell::new("GOOD").fg(Color::Green)
        };
        output.add_row(vec![Cell::new(column), cell]);
    }
    println!("{output}");
    println!(
        "{} good, {} bad over the first {} rows",
        report.good.len(),
        report.bad.len(),
        sample_size
    );
    Ok(())
}

fn summary_table(summary: &RunSummary) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Table", "Status", "Rows", "Quarantined", "Error"]);

    for result in &summary.results {
        let color = match result.status {
            TableStatus::Success => Color::Green,
            TableStatus::Partial => Color::Yellow,
            TableStatus::Failed => Color::Red,
        };
        let quarantined = result
            .quarantined_columns
            .iter()
            .map(Ident::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(vec![
            Cell::new(&result.table),
            Cell::new(result.status).fg(color),
            Cell::new(result.rows_exported),
            Cell::new(quarantined),
            Cell::new(result.error.as_deref().unwrap_or("")),
        ]);
    }
    table
}
