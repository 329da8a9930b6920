//! Proxy loader for reading `host:port` lists into deduplicated endpoints

use crate::proxy::models::{LoadReport, ProxyEndpoint};
use crate::Result;
use anyhow::Context;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Reason a single proxy line was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProxyLineError {
    #[error("missing ':' separator")]
    MissingSeparator,
    #[error("empty host")]
    EmptyHost,
    #[error("invalid port '{0}'")]
    InvalidPort(String),
}

/// Loader turning line-oriented proxy sources into endpoint lists
pub struct ProxyLoader;

impl ProxyLoader {
    /// Parse a single `host:port` line
    ///
    /// Trailing whitespace is stripped and the line is split on the first
    /// `:`. Returns `Ok(None)` for blank lines.
    pub fn parse_line(line: &str) -> std::result::Result<Option<ProxyEndpoint>, ProxyLineError> {
        let line = line.trim_end();
        if line.trim_start().is_empty() {
            return Ok(None);
        }

        let (host, port) = line
            .split_once(':')
            .ok_or(ProxyLineError::MissingSeparator)?;
        if host.is_empty() {
            return Err(ProxyLineError::EmptyHost);
        }
        let port: u16 = port
            .parse()
            .map_err(|_| ProxyLineError::InvalidPort(port.to_string()))?;

        Ok(Some(ProxyEndpoint::new(host, port)))
    }

    /// Load proxies from any buffered reader
    ///
    /// Malformed lines are logged and skipped. Duplicates keep their first
    /// position.
    pub fn load_reader<R: BufRead>(reader: R) -> Result<(Vec<ProxyEndpoint>, LoadReport)> {
        let mut seen = HashSet::new();
        let mut proxies = Vec::new();
        let mut report = LoadReport::default();

        for (lineno, line) in reader.split(b'\n').enumerate() {
            let line = line.context("failed to read proxy source")?;
            let line = match String::from_utf8(line) {
                Ok(line) => line,
                Err(e) => {
                    report.malformed += 1;
                    warn!(line = lineno + 1, error = %e, "Skipping proxy line that is not UTF-8");
                    continue;
                }
            };
            match Self::parse_line(&line) {
                Ok(Some(proxy)) => {
                    if seen.insert(proxy.clone()) {
                        proxies.push(proxy);
                    } else {
                        report.duplicates += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    report.malformed += 1;
                    warn!(line = lineno + 1, content = %line.trim_end(), error = %e, "Skipping malformed proxy");
                }
            }
        }

        report.accepted = proxies.len();
        Ok((proxies, report))
    }

    /// Load proxies from a string (multiple lines)
    pub fn load_str(content: &str) -> (Vec<ProxyEndpoint>, LoadReport) {
        // Reading from memory cannot fail.
        Self::load_reader(Cursor::new(content)).unwrap_or_default()
    }

    /// Load proxies from a file along with the load counters
    pub fn load_file_with_report<P: AsRef<Path>>(
        path: P,
    ) -> Result<(Vec<ProxyEndpoint>, LoadReport)> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open proxy file {}", path.display()))?;
        let (proxies, report) = Self::load_reader(BufReader::new(file))?;

        info!(
            path = %path.display(),
            accepted = report.accepted,
            duplicates = report.duplicates,
            malformed = report.malformed,
            "Loaded proxies"
        );
        Ok((proxies, report))
    }

    /// Load proxies from a file
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Vec<ProxyEndpoint>> {
        Self::load_file_with_report(path).map(|(proxies, _)| proxies)
    }

    /// Load proxies from an optional file; no file means no proxies
    pub fn load_optional<P: AsRef<Path>>(path: Option<P>) -> Result<Vec<ProxyEndpoint>> {
        match path {
            Some(path) => Self::load_file(path),
            None => Ok(Vec::new()),
        }
    }
}
