//! SQLite database driver implementation

mod connection;
mod dialect;
mod driver;

pub use connection::SqliteConnection;
pub use dialect::SqliteExportDialect;
pub use driver::SqliteDriver;
