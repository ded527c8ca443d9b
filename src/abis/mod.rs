pub mod erc20;
pub mod kumbaya;
pub mod multicall;

pub use erc20::IERC20;
pub use kumbaya::{IKumbayaPool, PoolCreated, Swap};
pub use multicall::{Call3, IMulticall3, McResult};
