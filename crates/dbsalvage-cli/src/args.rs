//! Command line arguments
//!
//! Every run setting can come from the config file, a `DBSALVAGE_*`
//! environment variable or a flag. Flags and environment variables win over
//! the file.

use clap::{Args, Parser, Subcommand};
use dbsalvage_extract::{ExtractConfig, TableSelection};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dbsalvage")]
#[command(about = "Export every readable row of a damaged database to CSV")]
#[command(version)]
pub struct Cli {
    /// TOML config file
    #[arg(short, long, global = true, env = "DBSALVAGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also write JSON logs, to the given directory or the default log location
    #[arg(long, global = true, num_args = 0..=1, env = "DBSALVAGE_LOG_DIR")]
    pub log_dir: Option<Option<PathBuf>>,

    /// More console output (-v debug, -vv trace). RUST_LOG overrides this.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(flatten)]
    pub overrides: ConfigOverrides,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export the selected tables
    Export,
    /// List the user tables of the database
    Tables,
    /// Find the columns of one table that cannot be read
    Probe {
        /// Table to probe
        table: String,
    },
}

#[derive(Args, Debug, Default)]
pub struct ConfigOverrides {
    /// Source database file
    #[arg(short, long, global = true, env = "DBSALVAGE_DATABASE")]
    pub database: Option<PathBuf>,

    #[arg(long, global = true, env = "DBSALVAGE_USER")]
    pub user: Option<String>,

    #[arg(long, global = true, env = "DBSALVAGE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[arg(long, global = true, env = "DBSALVAGE_CHARSET")]
    pub charset: Option<String>,

    /// `all` or a `;`-separated list of table names
    #[arg(short, long, global = true, env = "DBSALVAGE_TABLES")]
    pub tables: Option<String>,

    /// Rows per page
    #[arg(long, global = true, env = "DBSALVAGE_CHUNK_SIZE")]
    pub chunk_size: Option<u64>,

    /// Columns per column group
    #[arg(long, global = true, env = "DBSALVAGE_MAX_COLUMNS")]
    pub max_columns: Option<usize>,

    /// Row offset to resume the first selected table at
    #[arg(long, global = true, env = "DBSALVAGE_RESUME_OFFSET")]
    pub resume_offset: Option<u64>,

    /// Read each column group with a single query
    #[arg(long, global = true, env = "DBSALVAGE_NO_CHUNKS")]
    pub no_chunks: bool,

    #[arg(long, global = true, env = "DBSALVAGE_MAX_ATTEMPTS")]
    pub max_attempts: Option<u32>,

    /// Seconds to wait before each connection attempt
    #[arg(long, global = true, env = "DBSALVAGE_WARMUP_SECS")]
    pub warmup_secs: Option<u64>,

    #[arg(short, long, global = true, env = "DBSALVAGE_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Command run before each connection attempt
    #[arg(long, global = true, env = "DBSALVAGE_SERVER_START_COMMAND")]
    pub server_start_command: Option<String>,

    #[arg(long, global = true, env = "DBSALVAGE_DRIVER")]
    pub driver: Option<String>,

    /// Rows read per column while probing
    #[arg(long, global = true, env = "DBSALVAGE_PROBE_SAMPLE_SIZE")]
    pub probe_sample_size: Option<u64>,
}

impl ConfigOverrides {
    /// Overwrite the fields of `config` that were given
    pub fn apply(self, config: &mut ExtractConfig) {
        if let Some(database) = self.database {
            config.database = Some(database);
        }
        if let Some(user) = self.user {
            config.user = user;
        }
        if let Some(password) = self.password {
            config.password = password;
        }
        if let Some(charset) = self.charset {
            config.charset = charset;
        }
        if let Some(tables) = self.tables {
            config.tables = TableSelection::parse(&tables);
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(max_columns) = self.max_columns {
            config.max_columns = max_columns;
        }
        if let Some(resume_offset) = self.resume_offset {
            config.resume_offset = resume_offset;
        }
        if self.no_chunks {
            config.no_chunks = true;
        }
        if let Some(max_attempts) = self.max_attempts {
            config.max_attempts = max_attempts;
        }
        if let Some(warmup_secs) = self.warmup_secs {
            config.warmup_secs = warmup_secs;
        }
        if let Some(output_dir) = self.output_dir {
            config.output_dir = output_dir;
        }
        if let Some(command) = self.server_start_command {
            config.server_start_command = Some(command);
        }
        if let Some(driver) = self.driver {
            config.driver = driver;
        }
        if let Some(sample) = self.probe_sample_size {
            config.probe_sample_size = Some(sample);
        }
    }
}
