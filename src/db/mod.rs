//! Write-behind persistence.
//!
//! The in-memory store stays authoritative; PostgreSQL is a replica
//! other processes can read. Sync failures never affect indexing.

mod postgres;
mod sync;

pub use postgres::PostgresClient;
pub use sync::SyncLayer;
