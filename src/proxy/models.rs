//! Proxy data models

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single proxy endpoint handed to scan workers
///
/// Equality and hashing are structural over `(host, port)`, so a set of
/// endpoints never holds the same address twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyEndpoint {
    pub host: String,
    pub port: u16,
}

impl ProxyEndpoint {
    /// Create a new endpoint, normalizing the host to lowercase
    pub fn new(host: impl AsRef<str>, port: u16) -> Self {
        Self {
            host: host.as_ref().to_lowercase(),
            port,
        }
    }

    /// Get the endpoint in HOST:PORT format
    pub fn to_simple_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Counters collected while loading a proxy source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Unique endpoints kept
    pub accepted: usize,
    /// Lines that repeated an already loaded endpoint
    pub duplicates: usize,
    /// Lines that could not be parsed
    pub malformed: usize,
}
