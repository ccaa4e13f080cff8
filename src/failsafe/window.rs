//! Per-second outcome buckets with a sorted key index
//!
//! Buckets live in a map keyed by Unix seconds. A parallel `keys` vector holds
//! exactly the map's keys, strictly ascending, so that expiry is a prefix cut
//! and insertion is a single binary search.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Outcome category of a guarded call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
#[repr(i64)]
pub enum MetricKind {
    /// Operation returned `Ok`
    Success = 1,
    /// Operation returned `Err`
    Error = 2,
    /// Operation timed out
    Timeout = 3,
    /// Operation was rejected before running
    Rejection = 4,
}

impl MetricKind {
    /// All kinds in ordinal order
    pub const ALL: [Self; 4] = [Self::Success, Self::Error, Self::Timeout, Self::Rejection];

    /// Lowercase label for logs and metrics
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Timeout => "timeout",
            Self::Rejection => "rejection",
        }
    }
}

impl TryFrom<i64> for MetricKind {
    type Error = Error;

    fn try_from(ordinal: i64) -> Result<Self, Error> {
        match ordinal {
            1 => Ok(MetricKind::Success),
            2 => Ok(MetricKind::Error),
            3 => Ok(MetricKind::Timeout),
            4 => Ok(MetricKind::Rejection),
            other => Err(Error::InvalidMetricKind(other)),
        }
    }
}

impl From<MetricKind> for i64 {
    fn from(kind: MetricKind) -> Self {
        kind as i64
    }
}

/// Outcome counts for one second
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricBucket {
    /// Successful calls
    pub success: u64,
    /// Failed calls
    pub error: u64,
    /// Timed out calls
    pub timeout: u64,
    /// Rejected calls
    pub rejection: u64,
}

impl MetricBucket {
    /// Count for one kind
    #[must_use]
    pub const fn get(&self, kind: MetricKind) -> u64 {
        match kind {
            MetricKind::Success => self.success,
            MetricKind::Error => self.error,
            MetricKind::Timeout => self.timeout,
            MetricKind::Rejection => self.rejection,
        }
    }

    /// Add one to the count for `kind`
    pub fn increment(&mut self, kind: MetricKind) {
        let slot = match kind {
            MetricKind::Success => &mut self.success,
            MetricKind::Error => &mut self.error,
            MetricKind::Timeout => &mut self.timeout,
            MetricKind::Rejection => &mut self.rejection,
        };
        *slot = slot.saturating_add(1);
    }

    /// Sum of all kinds
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.success
            .saturating_add(self.error)
            .saturating_add(self.timeout)
            .saturating_add(self.rejection)
    }

    fn merge(&mut self, other: &Self) {
        self.success = self.success.saturating_add(other.success);
        self.error = self.error.saturating_add(other.error);
        self.timeout = self.timeout.saturating_add(other.timeout);
        self.rejection = self.rejection.saturating_add(other.rejection);
    }
}

/// Read-only view of a window, handed to health predicates
#[derive(Debug, Clone, Copy)]
pub struct MetricSnapshot<'a> {
    buckets: &'a HashMap<i64, MetricBucket>,
    keys: &'a [i64],
}

impl<'a> MetricSnapshot<'a> {
    /// Bucket keys in ascending order
    #[must_use]
    pub fn keys(&self) -> &'a [i64] {
        self.keys
    }

    /// Bucket for one second, if any outcome was recorded then
    #[must_use]
    pub fn bucket(&self, key: i64) -> Option<&'a MetricBucket> {
        self.buckets.get(&key)
    }

    /// Buckets in key order
    pub fn iter(&self) -> impl Iterator<Item = (i64, &'a MetricBucket)> + 'a {
        let buckets = self.buckets;
        let keys = self.keys;
        keys.iter()
            .filter_map(move |key| buckets.get(key).map(|bucket| (*key, bucket)))
    }

    /// Counts summed over every bucket
    #[must_use]
    pub fn totals(&self) -> MetricBucket {
        self.iter().fold(MetricBucket::default(), |mut acc, (_, bucket)| {
            acc.merge(bucket);
            acc
        })
    }

    /// Whether the window holds no buckets
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Time-bucketed outcome store
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MetricWindow {
    buckets: HashMap<i64, MetricBucket>,
    /// Always sorted ascending, no duplicates, same set as `buckets.keys()`
    keys: Vec<i64>,
}

impl MetricWindow {
    /// Create an empty window
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one outcome in the bucket for `key`
    ///
    /// Accepts a [`MetricKind`] or a raw ordinal; an invalid ordinal is
    /// rejected before anything is touched.
    pub fn insert<K>(&mut self, key: i64, kind: K) -> crate::Result<()>
    where
        K: TryInto<MetricKind>,
        Error: From<K::Error>,
    {
        let kind = kind.try_into()?;

        let bucket = self.buckets.entry(key).or_insert_with(|| {
            let index = upper_bound(&self.keys, key);
            self.keys.insert(index, key);
            MetricBucket::default()
        });
        bucket.increment(kind);

        Ok(())
    }

    /// Drop every bucket whose key is `<= cutoff`
    pub fn evict_older_than(&mut self, cutoff: i64) {
        let split = upper_bound(&self.keys, cutoff);
        for key in self.keys.drain(..split) {
            self.buckets.remove(&key);
        }
    }

    /// Borrowed view for aggregation
    #[must_use]
    pub fn snapshot(&self) -> MetricSnapshot<'_> {
        MetricSnapshot {
            buckets: &self.buckets,
            keys: &self.keys,
        }
    }

    /// Number of buckets held
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no buckets are held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Remove everything
    pub fn clear(&mut self) {
        self.buckets.clear();
        self.keys.clear();
    }
}

/// Index of the first element greater than `target`
///
/// Everything before the returned index is `<= target`, everything from it on
/// is `> target`. `keys` must be sorted ascending.
#[must_use]
pub fn upper_bound(keys: &[i64], target: i64) -> usize {
    keys.partition_point(|&k| k <= target)
}
