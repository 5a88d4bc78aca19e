//! dbsalvage core - shared abstractions for the extraction engine
//!
//! This crate defines the seams every other dbsalvage crate builds on:
//!
//! - `DatabaseDriver` - opens connections from a `ConnectionConfig`
//! - `Connection` - executes statements over a live database session
//! - `ExportDialect` - renders catalog and paging SQL for a database family
//! - `Ident` - an identifier validated once at discovery time
//! - Common types like `Value`, `Row` and `QueryResult`

mod connection;
mod dialect;
mod driver;
mod error;
mod identifier;
mod types;

pub use connection::*;
pub use dialect::*;
pub use driver::*;
pub use error::*;
pub use identifier::*;
pub use types::*;
