pub mod abis;
pub mod chain;
pub mod config;
pub mod data;
pub mod db;
pub mod indexer;
pub mod store;
pub mod utils;

pub use chain::ChainClient;
pub use config::Settings;
pub use data::EthPriceFetcher;
pub use db::{PostgresClient, SyncLayer};
pub use store::{data_store, DataStore};
