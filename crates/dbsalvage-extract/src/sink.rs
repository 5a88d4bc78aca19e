//! Output artifacts
//!
//! Pages are written through a `PageSink`. The CSV implementation writes one
//! file per table column group:
//!
//! - `<table>.csv` for group 0
//! - `<table>_cont<i>.csv` for group `i > 0`
//! - `_SCHEMA_COLUMNS.csv` for the catalog column listing
//! - `_FAILED_TABLES.csv` for the failure ledger
//!
//! Table names are used verbatim in file names except for `/`, `\` and `%`,
//! which are written as `%2F`, `%5C` and `%25`.
//!
//! Only a `Create` write emits the header row.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use dbsalvage_core::{Ident, Value};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::{ExtractError, Result, RowPage};

pub const SCHEMA_COLUMNS_FILE: &str = "_SCHEMA_COLUMNS.csv";
pub const FAILED_TABLES_FILE: &str = "_FAILED_TABLES.csv";

/// What a page belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// Rows of one column group of a table
    TableGroup { table: Ident, group: usize },
    /// The catalog's column listing
    SchemaColumns,
    /// The failure ledger
    FailedTables,
}

impl Artifact {
    pub fn table_group(table: &Ident, group: usize) -> Self {
        Artifact::TableGroup {
            table: table.clone(),
            group,
        }
    }

    /// File name used by directory-based sinks
    pub fn file_name(&self) -> String {
        match self {
            Artifact::TableGroup { table, group: 0 } => format!("{}.csv", file_stem(table)),
            Artifact::TableGroup { table, group } => {
                format!("{}_cont{}.csv", file_stem(table), group)
            }
            Artifact::SchemaColumns => SCHEMA_COLUMNS_FILE.to_string(),
            Artifact::FailedTables => FAILED_TABLES_FILE.to_string(),
        }
    }
}

// Path separators are percent-escaped, and so is '%' itself, so distinct
// table names never share a file
fn file_stem(table: &Ident) -> String {
    let mut stem = String::with_capacity(table.as_str().len());
    for c in table.as_str().chars() {
        match c {
            '%' => stem.push_str("%25"),
            '/' => stem.push_str("%2F"),
            '\\' => stem.push_str("%5C"),
            c => stem.push(c),
        }
    }
    stem
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Truncate the artifact and write the header row first
    Create,
    /// Add rows to the end, no header
    Append,
}

/// Destination for exported pages
pub trait PageSink: Send + Sync {
    /// Remove every artifact of a previous run. A missing location is fine.
    fn reset(&self) -> Result<()>;

    fn write(&self, artifact: &Artifact, page: &RowPage, mode: WriteMode) -> Result<()>;
}

/// CSV dialect
#[derive(Debug, Clone)]
pub struct CsvOptions {
    pub delimiter: char,
    pub quote: char,
    pub record_delimiter: &'static str,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote: '"',
            record_delimiter: "\n",
        }
    }
}

impl CsvOptions {
    /// Quote a field only if it contains the delimiter, the quote or a line
    /// break. Embedded quotes are doubled.
    fn qualify(&self, value: &str) -> String {
        let needs_quotes = value
            .chars()
            .any(|c| c == self.delimiter || c == self.quote || c == '\n' || c == '\r');
        if !needs_quotes {
            return value.to_string();
        }
        let q = self.quote;
        let escaped = value.replace(q, &format!("{q}{q}"));
        format!("{q}{escaped}{q}")
    }

    fn render(&self, value: &Value) -> String {
        match value {
            Value::Null => String::new(),
            Value::String(s) => self.qualify(s),
            Value::Bytes(b) => BASE64.encode(b),
            other => self.qualify(&other.to_string()),
        }
    }

    fn write_record<W: Write>(
        &self,
        out: &mut W,
        fields: impl Iterator<Item = String>,
    ) -> std::io::Result<()> {
        let line = fields.collect::<Vec<_>>().join(&self.delimiter.to_string());
        out.write_all(line.as_bytes())?;
        out.write_all(self.record_delimiter.as_bytes())
    }
}

/// Writes every artifact as a CSV file in one directory
#[derive(Debug, Clone)]
pub struct CsvDirectorySink {
    dir: PathBuf,
    options: CsvOptions,
}

impl CsvDirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            options: CsvOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CsvOptions) -> Self {
        self.options = options;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, artifact: &Artifact) -> PathBuf {
        self.dir.join(artifact.file_name())
    }
}

impl PageSink for CsvDirectorySink {
    fn reset(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => tracing::info!(dir = %self.dir.display(), "cleared output directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ExtractError::io(&self.dir, e)),
        }
        std::fs::create_dir_all(&self.dir).map_err(|e| ExtractError::io(&self.dir, e))
    }

    fn write(&self, artifact: &Artifact, page: &RowPage, mode: WriteMode) -> Result<()> {
        let path = self.path_for(artifact);
        let io_err = |e| ExtractError::io(&path, e);

        std::fs::create_dir_all(&self.dir).map_err(|e| ExtractError::io(&self.dir, e))?;
        let mut open = OpenOptions::new();
        match mode {
            WriteMode::Create => open.write(true).create(true).truncate(true),
            WriteMode::Append => open.append(true).create(true),
        };
        let file = open.open(&path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);

        if mode == WriteMode::Create {
            self.options
                .write_record(
                    &mut writer,
                    page.columns.iter().map(|c| self.options.qualify(c)),
                )
                .map_err(io_err)?;
        }
        for row in &page.rows {
            self.options
                .write_record(&mut writer, row.iter().map(|v| self.options.render(v)))
                .map_err(io_err)?;
        }
        writer.flush().map_err(io_err)?;

        tracing::debug!(
            path = %path.display(),
            rows = page.len(),
            ?mode,
            "page written"
        );
        Ok(())
    }
}
