//! Proxy module for loading the proxy pool handed to workers
//!
//! This module provides functionality for:
//! - Parsing `host:port` lines into endpoints
//! - Deduplicating endpoints while keeping first-seen order

pub mod loader;
pub mod models;

pub use loader::{ProxyLineError, ProxyLoader};
pub use models::{LoadReport, ProxyEndpoint};
