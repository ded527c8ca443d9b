mod client;

pub use client::{CallRequest, ChainClient};
