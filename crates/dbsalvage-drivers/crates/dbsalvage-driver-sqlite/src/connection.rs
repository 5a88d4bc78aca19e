//! SQLite connection implementation

use async_trait::async_trait;
use dbsalvage_core::{
    ColumnMeta, Connection, QueryResult, Result, Row, SalvageError, StatementResult, Value,
};
use parking_lot::Mutex;
use rusqlite::{Connection as RusqliteConnection, OpenFlags, params_from_iter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// SQLite connection wrapper
pub struct SqliteConnection {
    conn: Arc<Mutex<RusqliteConnection>>,
    closed: AtomicBool,
}

impl SqliteConnection {
    /// Open (or create) a SQLite database for reading and writing
    pub fn open(path: &str) -> Result<Self> {
        tracing::info!(path = %path, "opening SQLite database");

        if path == ":memory:" {
            let conn = RusqliteConnection::open_in_memory().map_err(|e| {
                SalvageError::Connection(format!("Failed to open in-memory database: {}", e))
            })?;
            return Ok(Self::wrap(conn));
        }

        let expanded_path = Self::expand_path(path)?;
        if !expanded_path.starts_with("file:") {
            let file_path = std::path::Path::new(&expanded_path);
            if let Some(parent) = file_path.parent()
                && !parent.exists()
            {
                return Err(SalvageError::Connection(format!(
                    "Parent directory does not exist: {}",
                    parent.display()
                )));
            }
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        Self::open_with_flags(&expanded_path, flags)
    }

    /// Open an existing database without write access.
    ///
    /// This is what extraction uses: the source database is never modified
    /// and a missing file is reported instead of silently created.
    pub fn open_read_only(path: &str) -> Result<Self> {
        tracing::info!(path = %path, "opening SQLite database read-only");
        let expanded_path = Self::expand_path(path)?;

        if !expanded_path.starts_with("file:") && !std::path::Path::new(&expanded_path).is_file()
        {
            return Err(SalvageError::Connection(format!(
                "Database file does not exist: {}",
                expanded_path
            )));
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        Self::open_with_flags(&expanded_path, flags)
    }

    fn open_with_flags(path: &str, flags: OpenFlags) -> Result<Self> {
        let conn = RusqliteConnection::open_with_flags(path, flags).map_err(|e| {
            SalvageError::Connection(format!(
                "Failed to open SQLite database at '{}': {}",
                path, e
            ))
        })?;

        tracing::info!(path = %path, "SQLite database connection established");
        Ok(Self::wrap(conn))
    }

    fn wrap(conn: RusqliteConnection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            closed: AtomicBool::new(false),
        }
    }

    /// Expand path to handle ~ (home directory) and relative paths
    fn expand_path(path: &str) -> Result<String> {
        if path == ":memory:" || path.starts_with("file:") {
            return Ok(path.to_string());
        }

        let expanded = if let Some(rest) = path.strip_prefix("~/") {
            match dirs::home_dir() {
                Some(home) => home.join(rest).to_string_lossy().to_string(),
                None => {
                    return Err(SalvageError::Configuration(
                        "Unable to determine HOME directory".into(),
                    ));
                }
            }
        } else if path.starts_with('~') {
            return Err(SalvageError::Configuration(
                "User-specific home directories (~user) are not supported".into(),
            ));
        } else {
            path.to_string()
        };

        let path_buf = std::path::PathBuf::from(&expanded);
        let result = if path_buf.is_relative() {
            std::env::current_dir()
                .map_err(SalvageError::Io)?
                .join(path_buf)
                .to_string_lossy()
                .to_string()
        } else {
            expanded
        };

        Ok(result)
    }

    /// Execute several `;`-separated statements in one call
    pub async fn execute_batch(&self, sql: &str) -> Result<()> {
        self.ensure_open()?;
        tracing::debug!("executing SQL batch");
        let conn = self.conn.lock();
        conn.execute_batch(sql)
            .map_err(|e| SalvageError::Query(format!("Failed to execute batch: {}", e)))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SalvageError::Connection("Connection is closed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn driver_name(&self) -> &str {
        "sqlite"
    }

    fn dialect_id(&self) -> Option<&'static str> {
        Some("sqlite")
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.ensure_open()?;
        let conn = self.conn.lock();
        let rusqlite_params = values_to_rusqlite(params);

        let affected = conn
            .execute(sql, params_from_iter(rusqlite_params.iter()))
            .map_err(|e| SalvageError::Query(format!("Failed to execute statement: {}", e)))?;

        tracing::debug!(affected_rows = affected, "statement executed successfully");
        Ok(StatementResult {
            affected_rows: affected as u64,
        })
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.ensure_open()?;
        let start_time = std::time::Instant::now();

        let conn = self.conn.lock();
        let rusqlite_params = values_to_rusqlite(params);

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| SalvageError::Query(format!("Failed to prepare query: {}", e)))?;

        // decl_type is the type from CREATE TABLE; expressions have none
        let columns: Vec<ColumnMeta> = stmt
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| ColumnMeta {
                name: col.name().to_string(),
                data_type: col.decl_type().unwrap_or("DYNAMIC").to_string(),
                ordinal: idx,
            })
            .collect();

        let mut rows = Vec::new();
        let mut query_rows = stmt
            .query(params_from_iter(rusqlite_params.iter()))
            .map_err(|e| SalvageError::Query(format!("Failed to execute query: {}", e)))?;

        while let Some(row) = query_rows
            .next()
            .map_err(|e| SalvageError::Query(format!("Failed to fetch row: {}", e)))?
        {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(rusqlite_to_value(row, i)?);
            }
            rows.push(Row::new(values));
        }

        let execution_time_ms = start_time.elapsed().as_millis() as u64;
        tracing::debug!(
            row_count = rows.len(),
            execution_time_ms = execution_time_ms,
            "query executed successfully"
        );
        Ok(QueryResult {
            columns,
            rows,
            execution_time_ms,
        })
    }

    async fn close(&self) -> Result<()> {
        tracing::info!("closing SQLite connection");
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Convert our Value types to rusqlite-compatible types
fn values_to_rusqlite(values: &[Value]) -> Vec<rusqlite::types::Value> {
    values.iter().map(value_to_rusqlite).collect()
}

fn value_to_rusqlite(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Bool(b) => rusqlite::types::Value::Integer(if *b { 1 } else { 0 }),
        Value::Int32(i) => rusqlite::types::Value::Integer(*i as i64),
        Value::Int64(i) => rusqlite::types::Value::Integer(*i),
        Value::Float64(f) => rusqlite::types::Value::Real(*f),
        Value::Decimal(d) => rusqlite::types::Value::Text(d.clone()),
        Value::String(s) => rusqlite::types::Value::Text(s.clone()),
        Value::Bytes(b) => rusqlite::types::Value::Blob(b.clone()),
        Value::Date(d) => rusqlite::types::Value::Text(d.to_string()),
        Value::Time(t) => rusqlite::types::Value::Text(t.to_string()),
        Value::DateTime(dt) => rusqlite::types::Value::Text(dt.to_string()),
        Value::DateTimeUtc(dt) => rusqlite::types::Value::Text(dt.to_rfc3339()),
    }
}

/// Convert rusqlite row value to our Value type
fn rusqlite_to_value(row: &rusqlite::Row, idx: usize) -> Result<Value> {
    use rusqlite::types::ValueRef;

    let value_ref = row
        .get_ref(idx)
        .map_err(|e| SalvageError::Query(e.to_string()))?;

    let value = match value_ref {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(s) => Value::String(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    };

    Ok(value)
}
