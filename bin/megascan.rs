use std::sync::Arc;
use std::time::Instant;

use alloy::primitives::Address;
use anyhow::Context;
use chrono::Utc;
use jemallocator::Jemalloc;
use log::{info, warn, LevelFilter};
use simple_logger::SimpleLogger;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use megascan::indexer::{LivePoller, PoolDiscovery, PoolHydrator, PoolRefresher, SwapBackfiller};
use megascan::{data_store, ChainClient, EthPriceFetcher, PostgresClient, Settings, SyncLayer};

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .unwrap();

    // Load configuration
    let settings =
        Settings::new().context("Failed to load config.yaml. Please ensure it exists and is valid")?;

    let factory: Address = settings
        .indexer
        .factory_address
        .parse()
        .context("Invalid factory address in config")?;
    let multicall3: Address = settings
        .indexer
        .multicall3_address
        .parse()
        .context("Invalid multicall3 address in config")?;
    settings
        .indexer
        .weth_address
        .parse::<Address>()
        .context("Invalid WETH address in config")?;

    let chain = Arc::new(
        ChainClient::new(&settings.indexer.rpc_url, multicall3)
            .context("Failed to create chain client")?,
    );
    let eth_price = Arc::new(EthPriceFetcher::new());

    let store = data_store();
    store.set_started_at(Utc::now().timestamp());

    info!("Starting Megascan indexer");
    let started = Instant::now();

    // Phase 1: discover every pool the factory has created
    let discovery = PoolDiscovery::new(chain.clone(), factory, &settings.indexer);
    let records = discovery.run(store).await.context("Pool discovery failed")?;
    if records.is_empty() {
        warn!("No pools discovered; the indexer will idle until new pools appear");
    }

    // Phase 2: token metadata and pool state
    let hydrator = PoolHydrator::new(chain.clone(), &settings.indexer);
    hydrator
        .hydrate(store, &eth_price, &records)
        .await
        .context("Pool hydration failed")?;

    // Phase 3: recent swap history
    let backfiller = SwapBackfiller::new(chain.clone(), &settings.indexer);
    backfiller
        .run(store, &records)
        .await
        .context("Swap backfill failed")?;

    store.mark_ready();
    info!("Indexer ready in {:.1}s", started.elapsed().as_secs_f64());

    // Ongoing work: live polling, periodic refresh, optional db sync
    let poller = LivePoller::new(chain.clone(), eth_price.clone(), factory, &settings.indexer);
    tokio::spawn(async move { poller.run(store).await });

    let refresher = PoolRefresher::new(chain.clone(), eth_price.clone(), &settings.indexer);
    tokio::spawn(async move { refresher.run(store).await });

    if let Some(pg_settings) = settings.postgres.clone() {
        let db = PostgresClient::new(pg_settings.clone())
            .await
            .context("Failed to connect to PostgreSQL")?;
        db.migrate().await.context("PostgreSQL migration failed")?;

        let sync = SyncLayer::new(db, &pg_settings);
        tokio::spawn(async move { sync.run(store).await });
    } else {
        info!("No postgres section in config; running memory-only");
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received, exiting");
    Ok(())
}
