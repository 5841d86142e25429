//! Core types shared by the cache manager and its storage.

use chrono::{DateTime, Duration, Utc};

use crate::fbr::types::ReferenceEntry;

/// How long a fetched record stays valid.
pub const CACHE_TTL_HOURS: i64 = 24;

/// A payload together with the instant it was fetched.
///
/// Both halves are always written together; a record is never partially
/// updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
  pub payload: Vec<ReferenceEntry>,
  pub fetched_at: DateTime<Utc>,
}

impl CacheRecord {
  pub fn new(payload: Vec<ReferenceEntry>, fetched_at: DateTime<Utc>) -> Self {
    Self {
      payload,
      fetched_at,
    }
  }

  /// Validity is derived at read time: `now - fetched_at < ttl`.
  pub fn is_valid(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
    now - self.fetched_at < ttl
  }
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was fetched (absent for rule-generated data)
  pub fetched_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  pub fn from_network(data: T, fetched_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      fetched_at: Some(fetched_at),
    }
  }

  pub fn from_cache(data: T, fetched_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::CacheFresh,
      fetched_at: Some(fetched_at),
    }
  }

  /// Remote failed and an older payload was served instead.
  pub fn stale(data: T, fetched_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Stale,
      fetched_at: Some(fetched_at),
    }
  }

  /// Remote failed with nothing cached; compiled-in data was served.
  pub fn fallback(data: T, fetched_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Fallback,
      fetched_at: Some(fetched_at),
    }
  }

  /// Produced by a business rule without consulting cache or network.
  pub fn from_rule(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Rule,
      fetched_at: None,
    }
  }
}

/// Indicates where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still within the TTL
  CacheFresh,
  /// Network failed, serving an older payload
  Stale,
  /// Network failed with nothing cached, serving the fallback table
  Fallback,
  /// Short-circuited by a business rule
  Rule,
}

impl CacheSource {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Network => "network",
      Self::CacheFresh => "cache",
      Self::Stale => "stale",
      Self::Fallback => "fallback",
      Self::Rule => "rule",
    }
  }
}

/// Read-only snapshot of one or more cache slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStatus {
  /// At least one slot holds a record
  pub present: bool,
  /// Total number of cached entries
  pub size: usize,
  /// Every present slot is within the TTL (false when nothing is present)
  pub valid: bool,
  /// Most recent fetch across the inspected slots
  pub last_fetched_at: Option<DateTime<Utc>>,
  /// Number of slots inspected that hold a record
  pub slots: usize,
}

impl CacheStatus {
  /// Fold one record into the snapshot.
  pub(crate) fn add(&mut self, record: &CacheRecord, now: DateTime<Utc>, ttl: Duration) {
    let record_valid = record.is_valid(now, ttl);
    self.valid = if self.present {
      self.valid && record_valid
    } else {
      record_valid
    };
    self.present = true;
    self.size += record.payload.len();
    self.slots += 1;
    self.last_fetched_at = match self.last_fetched_at {
      Some(prev) if prev >= record.fetched_at => Some(prev),
      _ => Some(record.fetched_at),
    };
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(hours_ago: i64, len: usize) -> CacheRecord {
    let payload = (0..len)
      .map(|i| ReferenceEntry::new(i.to_string(), "entry"))
      .collect();
    CacheRecord::new(payload, Utc::now() - Duration::hours(hours_ago))
  }

  #[test]
  fn test_record_validity_boundary() {
    let now = Utc::now();
    let ttl = Duration::hours(CACHE_TTL_HOURS);
    let fresh = CacheRecord::new(vec![], now - Duration::hours(23));
    let expired = CacheRecord::new(vec![], now - ttl);

    assert!(fresh.is_valid(now, ttl));
    assert!(!expired.is_valid(now, ttl));
  }

  #[test]
  fn test_status_aggregates_records() {
    let now = Utc::now();
    let ttl = Duration::hours(CACHE_TTL_HOURS);
    let mut status = CacheStatus::default();
    assert!(!status.present);
    assert!(!status.valid);

    let newer = record(1, 3);
    status.add(&newer, now, ttl);
    assert!(status.valid);

    status.add(&record(30, 2), now, ttl);
    assert!(status.present);
    assert!(!status.valid);
    assert_eq!(status.size, 5);
    assert_eq!(status.slots, 2);
    assert_eq!(status.last_fetched_at, Some(newer.fetched_at));
  }
}
