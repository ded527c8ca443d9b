//! The indexing pipeline.
//!
//! Startup phases run in order: discovery, hydration, backfill. Once the
//! store is marked ready the live poller and periodic refresher run
//! forever on independent fixed-interval timers.

mod backfill;
mod discovery;
mod hydration;
mod poller;
mod refresher;
mod swaps;

pub use backfill::SwapBackfiller;
pub use discovery::{PoolCreatedRecord, PoolDiscovery};
pub use hydration::PoolHydrator;
pub use poller::LivePoller;
pub use refresher::PoolRefresher;

/// Individual errors logged per pass before switching to counting only.
pub(crate) const MAX_LOGGED_ERRORS_PER_PASS: usize = 3;
