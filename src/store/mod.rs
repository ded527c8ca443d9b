mod models;
#[allow(clippy::module_inception)]
mod store;

pub use models::{Candle, IndexerStats, Pool, PricePoint, SwapSide, Timeframe, Token, Trade};
pub use store::DataStore;

use once_cell::sync::OnceCell;

static DATA_STORE: OnceCell<DataStore> = OnceCell::new();

/// Process-wide store singleton.
///
/// The store must survive re-entrant initialization: a second caller
/// attaches to the existing instance instead of creating a new one.
pub fn data_store() -> &'static DataStore {
    DATA_STORE.get_or_init(DataStore::new)
}
