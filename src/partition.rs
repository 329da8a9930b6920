//! Deterministic partitioning of proxies and ID ranges across workers
//!
//! Every worker index receives one contiguous block. The first `len % count`
//! workers get one extra element, so concatenating the slices in index order
//! reproduces the input exactly.

use crate::proxy::ProxyEndpoint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use thiserror::Error;

/// Half-open interval `[start, end)` of scan identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdRange {
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeParseError {
    #[error("invalid range bound '{0}'")]
    InvalidBound(String),
    #[error("range start {start} is past its end {end}")]
    Inverted { start: u64, end: u64 },
}

impl IdRange {
    pub fn new(start: u64, end: u64) -> Result<Self, RangeParseError> {
        if start > end {
            return Err(RangeParseError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: u64) -> bool {
        self.start <= id && id < self.end
    }
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for IdRange {
    type Err = RangeParseError;

    /// Accepts `start-end` (end exclusive) or a single id `n`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bound = |v: &str| {
            v.trim()
                .parse::<u64>()
                .map_err(|_| RangeParseError::InvalidBound(v.trim().to_string()))
        };

        match s.split_once('-') {
            Some((start, end)) => Self::new(bound(start)?, bound(end)?),
            None => {
                let id = bound(s)?;
                let end = id
                    .checked_add(1)
                    .ok_or_else(|| RangeParseError::InvalidBound(s.trim().to_string()))?;
                Self::new(id, end)
            }
        }
    }
}

/// Bounds of worker `index`'s block within a sequence of `len` elements
///
/// Returns an empty range when `count` is zero or `index` is out of bounds.
pub fn slice_bounds(len: u64, index: usize, count: usize) -> Range<u64> {
    if count == 0 || index >= count {
        return len..len;
    }
    let (index, count) = (index as u64, count as u64);
    let base = len / count;
    let extra = len % count;

    let start = index * base + index.min(extra);
    let size = base + u64::from(index < extra);
    start..start + size
}

/// Worker `index`'s contiguous block of `items`
pub fn slice_list<T>(items: &[T], index: usize, count: usize) -> &[T] {
    let bounds = slice_bounds(items.len() as u64, index, count);
    &items[bounds.start as usize..bounds.end as usize]
}

/// Worker `index`'s contiguous sub-interval of `range`
pub fn slice_range(range: &IdRange, index: usize, count: usize) -> IdRange {
    let bounds = slice_bounds(range.len(), index, count);
    IdRange {
        start: range.start + bounds.start,
        end: range.start + bounds.end,
    }
}

/// One worker's share of the workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerSlice {
    pub index: usize,
    pub proxies: Vec<ProxyEndpoint>,
    pub ranges: Vec<IdRange>,
}

/// Compute every worker's slice up front
pub fn plan(proxies: &[ProxyEndpoint], ranges: &[IdRange], count: usize) -> Vec<WorkerSlice> {
    (0..count)
        .map(|index| WorkerSlice {
            index,
            proxies: slice_list(proxies, index, count).to_vec(),
            ranges: ranges
                .iter()
                .map(|range| slice_range(range, index, count))
                .collect(),
        })
        .collect()
}
