//! Per-worker configuration bundle

use crate::config::ControllerConfig;
use crate::partition::{slice_list, slice_range, IdRange};
use crate::proxy::ProxyEndpoint;
use serde::{Deserialize, Serialize};

/// Everything a worker needs to run its share of the scan
///
/// Built once per worker before launch and moved into it; serialized as JSON
/// when the worker is an external process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub index: usize,
    pub name: String,
    pub thread_count: usize,
    pub proxies: Vec<ProxyEndpoint>,
    /// One sub-range per configured range, in configuration order
    pub ranges: Vec<IdRange>,
    pub cut_off: Option<u64>,
    pub chunk_size: u64,
    pub webhook_url: Option<String>,
    pub timeout_secs: f64,
}

impl WorkerConfig {
    /// Slice the shared inputs for worker `index`
    pub fn for_index(config: &ControllerConfig, proxies: &[ProxyEndpoint], index: usize) -> Self {
        Self {
            index,
            name: worker_name(index),
            thread_count: config.threads,
            proxies: slice_list(proxies, index, config.workers).to_vec(),
            ranges: config
                .range
                .iter()
                .map(|range| slice_range(range, index, config.workers))
                .collect(),
            cut_off: config.cut_off,
            chunk_size: config.chunk_size,
            webhook_url: config.webhook_url.clone(),
            timeout_secs: config.timeout.as_secs_f64(),
        }
    }

    /// Total number of ids this worker is responsible for
    pub fn id_count(&self) -> u64 {
        self.ranges.iter().map(IdRange::len).sum()
    }
}

pub fn worker_name(index: usize) -> String {
    format!("Worker-{index}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn proxies(n: usize) -> Vec<ProxyEndpoint> {
        (0..n).map(|i| ProxyEndpoint::new(format!("10.0.0.{i}"), 8080)).collect()
    }

    #[test]
    fn test_bundle_carries_pass_through_settings() {
        let config = ControllerConfig::new()
            .with_workers(2)
            .with_threads(16)
            .with_cut_off(42)
            .with_chunk_size(7)
            .with_webhook_url("http://hook".to_string())
            .with_timeout(Duration::from_millis(2500));

        let bundle = WorkerConfig::for_index(&config, &proxies(4), 1);
        assert_eq!(bundle.name, "Worker-1");
        assert_eq!(bundle.thread_count, 16);
        assert_eq!(bundle.cut_off, Some(42));
        assert_eq!(bundle.chunk_size, 7);
        assert_eq!(bundle.webhook_url.as_deref(), Some("http://hook"));
        assert_eq!(bundle.timeout_secs, 2.5);
        assert_eq!(bundle.proxies, proxies(4)[2..].to_vec());
    }

    #[test]
    fn test_bundle_has_one_sub_range_per_range() {
        let config = ControllerConfig::new().with_workers(3).with_ranges(vec![
            IdRange::new(0, 30).unwrap(),
            IdRange::new(100, 103).unwrap(),
            IdRange::new(7, 7).unwrap(),
        ]);

        let bundles: Vec<_> = (0..3).map(|i| WorkerConfig::for_index(&config, &[], i)).collect();
        for bundle in &bundles {
            assert_eq!(bundle.ranges.len(), 3);
            assert!(bundle.proxies.is_empty());
        }
        assert_eq!(bundles[2].ranges[0], IdRange { start: 20, end: 30 });
        assert_eq!(bundles[1].ranges[1], IdRange { start: 101, end: 102 });
        let total: u64 = bundles.iter().map(WorkerConfig::id_count).sum();
        assert_eq!(total, 33);
    }

    #[test]
    fn test_bundle_json_shape() {
        let config = ControllerConfig::new().with_workers(1);
        let bundle = WorkerConfig::for_index(&config, &proxies(1), 0);
        let json = serde_json::to_value(&bundle).unwrap();

        assert_eq!(json["name"], "Worker-0");
        assert_eq!(json["proxies"][0]["host"], "10.0.0.0");
        assert_eq!(json["timeout_secs"], 10.0);
        let back: WorkerConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, bundle);
    }
}
