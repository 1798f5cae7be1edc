//! Port definitions (hexagonal architecture)
//!
//! Ports define the capabilities the engine needs from its host. The core
//! depends only on these traits, not on concrete implementations.

mod balance_provider;
mod indicator_sink;
mod key_value_store;

pub use balance_provider::{BalanceInfo, BalanceProvider, BalanceResponse};
pub use indicator_sink::IndicatorSink;
pub use key_value_store::{keys, KeyValueStore, StoreMap};
