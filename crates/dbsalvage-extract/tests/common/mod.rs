//! Shared fixtures: SQLite source databases, a driver that injects faults
//! and a sink that records every write.

#![allow(dead_code)]

use async_trait::async_trait;
use dbsalvage_core::{
    Connection, ConnectionConfig, DatabaseDriver, ExportDialect, QueryResult, SalvageError,
    StatementResult, Value,
};
use dbsalvage_drivers::sqlite::{SqliteConnection, SqliteDriver};
use dbsalvage_extract::{
    Artifact, ConnectionSupervisor, CsvDirectorySink, ExtractError, NoopServerHook, PageSink,
    RowPage, SupervisorConfig, WriteMode,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Create `source.db` in `dir` and run `setup` against it
pub async fn fixture_db(dir: &Path, setup: &str) -> PathBuf {
    let path = dir.join("source.db");
    let conn = SqliteConnection::open(path.to_str().unwrap()).expect("create fixture db");
    conn.execute_batch(setup).await.expect("fixture setup");
    conn.close().await.unwrap();
    path
}

/// `CREATE TABLE` plus `rows` rows whose first column counts from 1
pub fn table_sql(table: &str, columns: &[&str], rows: usize) -> String {
    let mut sql = format!(
        "CREATE TABLE \"{}\" ({});\n",
        table,
        columns
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ")
    );
    for i in 1..=rows {
        let values = (0..columns.len())
            .map(|c| {
                if c == 0 {
                    i.to_string()
                } else {
                    format!("'{}{}'", columns[c].to_lowercase(), i)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&format!("INSERT INTO \"{table}\" VALUES ({values});\n"));
    }
    sql
}

/// A column whose selection fails from `from_offset` on, once its grace
/// of successful queries is used up
#[derive(Debug, Clone)]
pub struct Poison {
    pub column: String,
    pub from_offset: u64,
    grace: Option<Arc<AtomicU32>>,
}

impl Poison {
    pub fn always(column: &str) -> Self {
        Self::from_offset(column, 0)
    }

    pub fn from_offset(column: &str, offset: u64) -> Self {
        Self {
            column: column.to_string(),
            from_offset: offset,
            grace: None,
        }
    }

    /// Let `n` queries selecting `column` through, then fail every later one
    /// whatever its offset. The count is shared by all connections.
    pub fn after_successes(column: &str, n: u32) -> Self {
        Self {
            grace: Some(Arc::new(AtomicU32::new(n))),
            ..Self::always(column)
        }
    }

    fn hits(&self, sql: &str, params: &[Value]) -> bool {
        if !sql.contains(&format!("\"{}\"", self.column)) {
            return false;
        }
        if let Some(grace) = &self.grace {
            let spent = grace
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if spent {
                return false;
            }
        }
        // page queries bind (limit, offset)
        let offset = params.get(1).and_then(Value::as_u64).unwrap_or(0);
        offset >= self.from_offset
    }
}

/// Wraps the SQLite driver. Refuses connects on demand and fails every
/// query that selects a poisoned column.
pub struct FaultyDriver {
    inner: SqliteDriver,
    poisons: Vec<Poison>,
    refuse_connects: AtomicU32,
    pub connect_count: AtomicU32,
    pub queries: Arc<Mutex<Vec<String>>>,
}

impl FaultyDriver {
    pub fn new(poisons: Vec<Poison>) -> Self {
        Self {
            inner: SqliteDriver::new(),
            poisons,
            refuse_connects: AtomicU32::new(0),
            connect_count: AtomicU32::new(0),
            queries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn healthy() -> Self {
        Self::new(Vec::new())
    }

    /// Refuse the next `n` connection attempts
    pub fn refuse_next(&self, n: u32) {
        self.refuse_connects.store(n, Ordering::SeqCst);
    }

    pub fn connects(&self) -> u32 {
        self.connect_count.load(Ordering::SeqCst)
    }

    /// Logged statements containing `needle`
    pub fn queries_matching(&self, needle: &str) -> Vec<String> {
        self.queries
            .lock()
            .unwrap()
            .iter()
            .filter(|q| q.contains(needle))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DatabaseDriver for FaultyDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn export_dialect(&self) -> Arc<dyn ExportDialect> {
        self.inner.export_dialect()
    }

    async fn connect(&self, config: &ConnectionConfig) -> dbsalvage_core::Result<Arc<dyn Connection>> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .refuse_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(SalvageError::Connection("connection refused".into()));
        }
        let inner = self.inner.connect(config).await?;
        Ok(Arc::new(FaultyConnection {
            inner,
            poisons: self.poisons.clone(),
            queries: self.queries.clone(),
        }))
    }

    fn build_connection_string(&self, config: &ConnectionConfig) -> String {
        self.inner.build_connection_string(config)
    }
}

struct FaultyConnection {
    inner: Arc<dyn Connection>,
    poisons: Vec<Poison>,
    queries: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Connection for FaultyConnection {
    fn driver_name(&self) -> &str {
        self.inner.driver_name()
    }

    fn dialect_id(&self) -> Option<&'static str> {
        self.inner.dialect_id()
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> dbsalvage_core::Result<StatementResult> {
        self.inner.execute(sql, params).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> dbsalvage_core::Result<QueryResult> {
        self.queries.lock().unwrap().push(sql.to_string());
        if let Some(poison) = self.poisons.iter().find(|p| p.hits(sql, params)) {
            return Err(SalvageError::Query(format!(
                "internal server error reading column {}",
                poison.column
            )));
        }
        self.inner.query(sql, params).await
    }

    async fn close(&self) -> dbsalvage_core::Result<()> {
        self.inner.close().await
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// A write seen by [`RecordingSink`]
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub file: String,
    pub mode: WriteMode,
    pub columns: Vec<String>,
    pub rows: usize,
}

/// CSV sink that records every write and can fail the n-th one
pub struct RecordingSink {
    pub csv: CsvDirectorySink,
    pub writes: Mutex<Vec<WriteRecord>>,
    fail_on_write: Option<usize>,
}

impl RecordingSink {
    pub fn new(dir: &Path) -> Self {
        Self {
            csv: CsvDirectorySink::new(dir),
            writes: Mutex::new(Vec::new()),
            fail_on_write: None,
        }
    }

    /// Fail the `n`-th write (1-based) as if the disk filled up
    pub fn failing_on_write(dir: &Path, n: usize) -> Self {
        Self {
            fail_on_write: Some(n),
            ..Self::new(dir)
        }
    }

    pub fn writes_to(&self, file: &str) -> Vec<WriteRecord> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.file == file)
            .cloned()
            .collect()
    }

    pub fn read(&self, file: &str) -> String {
        std::fs::read_to_string(self.csv.dir().join(file)).unwrap()
    }
}

impl PageSink for RecordingSink {
    fn reset(&self) -> dbsalvage_extract::Result<()> {
        self.csv.reset()
    }

    fn write(
        &self,
        artifact: &Artifact,
        page: &RowPage,
        mode: WriteMode,
    ) -> dbsalvage_extract::Result<()> {
        let mut writes = self.writes.lock().unwrap();
        if self.fail_on_write == Some(writes.len() + 1) {
            return Err(ExtractError::Io {
                path: self.csv.path_for(artifact),
                source: std::io::Error::other("no space left on device"),
            });
        }
        writes.push(WriteRecord {
            file: artifact.file_name(),
            mode,
            columns: page.columns.clone(),
            rows: page.len(),
        });
        self.csv.write(artifact, page, mode)
    }
}

/// Supervisor over `driver` with no warm-up and three attempts
pub fn supervisor(driver: Arc<FaultyDriver>, db: &Path) -> Arc<ConnectionSupervisor> {
    Arc::new(ConnectionSupervisor::new(
        driver,
        ConnectionConfig::new_sqlite(db.to_str().unwrap()),
        Arc::new(NoopServerHook),
        SupervisorConfig::new(3, Duration::ZERO),
    ))
}

/// Data lines of a CSV file (header excluded)
pub fn data_lines(content: &str) -> Vec<&str> {
    content.lines().skip(1).collect()
}
