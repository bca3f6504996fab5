//! Live EVM gateway: an alloy provider behind the blocking `ChainGateway`.

mod client;
mod contracts;

pub use client::EvmClient;
