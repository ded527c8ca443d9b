mod config;

pub use config::{IndexerSettings, PostgresSettings, Settings};
