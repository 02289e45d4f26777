//! B52 Bridge Node - Library interface
//!
//! Re-exports internal modules for use by the binary and integration tests.

pub mod app;
pub mod bounded_cache;
pub mod client;
pub mod config;
pub mod evm_client;
pub mod relayer;
pub mod server;
