mod eth_price;

pub use eth_price::EthPriceFetcher;
