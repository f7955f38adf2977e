//! Oracle feeder library
//!
//! Fetches spot and future prices from exchanges and publishes them in pages
//! to an on-chain price oracle.

pub mod config;
pub mod entry;
pub mod error;
pub mod http;
pub mod oracle;
pub mod orchestrator;
pub mod sources;
pub mod types;
