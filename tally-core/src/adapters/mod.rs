//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - JSON file (and in-memory) storage for the KeyValueStore port
//! - DeepSeek HTTP client for the BalanceProvider port
//! - tracing and in-memory surfaces for the IndicatorSink port

pub mod deepseek;
pub mod file_store;
pub mod indicator;
pub mod memory_store;

#[cfg(test)]
pub mod deepseek_mock;
