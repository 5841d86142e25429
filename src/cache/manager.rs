//! Cache manager that orchestrates caching logic with network fetching.

use chrono::{Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use super::retry::RetryPolicy;
use super::storage::RecordStore;
use super::traits::{CacheRecord, CacheResult, CacheStatus, CACHE_TTL_HOURS};
use crate::fbr::client::RemoteFetch;
use crate::fbr::error::FetchError;
use crate::fbr::fallback::FallbackTable;
use crate::fbr::types::{Environment, ReferenceEntry, ReferenceKind, SlotKey};
use crate::rules;

type Lookup = CacheResult<Vec<ReferenceEntry>>;

/// A fetch shared by every caller that asks for the same slot while it runs.
type PendingLookup = Shared<BoxFuture<'static, Lookup>>;

/// Options for a keyed lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct LookupOptions<'a> {
  /// Ignore any cached record and go to the network
  pub force_refresh: bool,
  /// Tax rate of the invoice line the lookup is for (e.g. "18%", "1.00/bill")
  pub rate: Option<&'a str>,
}

impl<'a> LookupOptions<'a> {
  pub fn with_rate(rate: &'a str) -> Self {
    Self {
      force_refresh: false,
      rate: Some(rate),
    }
  }
}

/// Serves reference data with as few gateway calls as possible.
///
/// Every lookup checks, in order: a fetch already in flight for the same slot,
/// a valid record in memory, a valid record in persistent storage, and finally
/// the gateway. Gateway failures are never surfaced to the caller; an older
/// payload or the compiled-in fallback table is returned instead.
///
/// Cloning is cheap and every clone shares the same state.
pub struct CacheManager<F: RemoteFetch> {
  inner: Arc<Inner<F>>,
}

struct Inner<F> {
  fetcher: F,
  store: RecordStore,
  fallback: FallbackTable,
  ttl: Duration,
  retry: RetryPolicy,
  memory: Mutex<HashMap<SlotKey, CacheRecord>>,
  in_flight: Mutex<HashMap<SlotKey, PendingLookup>>,
}

/// Builds a [`CacheManager`].
pub struct CacheManagerBuilder<F> {
  fetcher: F,
  store: RecordStore,
  fallback: FallbackTable,
  ttl: Duration,
  retry: RetryPolicy,
}

impl<F: RemoteFetch> CacheManagerBuilder<F> {
  /// Set how long fetched records stay valid.
  pub fn ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  /// Retry policy for keyed lookups.
  pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn fallback(mut self, fallback: FallbackTable) -> Self {
    self.fallback = fallback;
    self
  }

  pub fn build(self) -> CacheManager<F> {
    CacheManager {
      inner: Arc::new(Inner {
        fetcher: self.fetcher,
        store: self.store,
        fallback: self.fallback,
        ttl: self.ttl,
        retry: self.retry,
        memory: Mutex::new(HashMap::new()),
        in_flight: Mutex::new(HashMap::new()),
      }),
    }
  }
}

impl<F: RemoteFetch> CacheManager<F> {
  /// Create a manager with the default TTL, retry policy and fallback table.
  pub fn new(fetcher: F, store: RecordStore) -> Self {
    Self::builder(fetcher, store).build()
  }

  pub fn builder(fetcher: F, store: RecordStore) -> CacheManagerBuilder<F> {
    CacheManagerBuilder {
      fetcher,
      store,
      fallback: FallbackTable::new(),
      ttl: Duration::hours(CACHE_TTL_HOURS),
      retry: RetryPolicy::default(),
    }
  }

  pub fn ttl(&self) -> Duration {
    self.inner.ttl
  }

  /// Whole reference table for `kind`.
  pub async fn get_all(
    &self,
    kind: ReferenceKind,
    environment: Environment,
    force_refresh: bool,
  ) -> Vec<ReferenceEntry> {
    self
      .get_all_detailed(kind, environment, force_refresh)
      .await
      .data
  }

  /// [`get_all`](Self::get_all), also reporting where the data came from.
  pub async fn get_all_detailed(
    &self,
    kind: ReferenceKind,
    environment: Environment,
    force_refresh: bool,
  ) -> Lookup {
    if kind.is_keyed() {
      warn!(%kind, "Whole-table lookup for a keyed kind; serving default entries");
      return CacheResult::fallback(self.inner.fallback.table(kind), Utc::now());
    }

    self
      .lookup(SlotKey::table(kind), environment, force_refresh)
      .await
  }

  /// Entries of a keyed kind for one key (e.g. the units valid for one HS code).
  ///
  /// For [`ReferenceKind::Uom`] only, a `rate` containing `/bill` returns the
  /// single bill-of-lading unit without any lookup. Other kinds ignore the rate.
  pub async fn get_one(
    &self,
    kind: ReferenceKind,
    key: &str,
    environment: Environment,
    options: LookupOptions<'_>,
  ) -> Vec<ReferenceEntry> {
    self
      .get_one_detailed(kind, key, environment, options)
      .await
      .data
  }

  /// [`get_one`](Self::get_one), also reporting where the data came from.
  pub async fn get_one_detailed(
    &self,
    kind: ReferenceKind,
    key: &str,
    environment: Environment,
    options: LookupOptions<'_>,
  ) -> Lookup {
    // TODO: move this into the invoice line validation once rates are typed
    if kind == ReferenceKind::Uom && options.rate.is_some_and(rules::is_bill_of_lading_rate) {
      debug!(key, rate = ?options.rate, "Bill of lading rate; skipping unit lookup");
      return CacheResult::from_rule(vec![rules::bill_of_lading_entry()]);
    }

    if !kind.is_keyed() {
      warn!(%kind, key, "Keyed lookup for a whole-table kind; ignoring key");
      return self
        .lookup(SlotKey::table(kind), environment, options.force_refresh)
        .await;
    }

    let key = key.trim();
    if key.is_empty() {
      warn!(%kind, "Empty lookup key; serving default entries");
      return CacheResult::fallback(self.inner.fallback.table(kind), Utc::now());
    }

    self
      .lookup(SlotKey::keyed(kind, key), environment, options.force_refresh)
      .await
  }

  /// Filter the cached table for `kind` without touching the network.
  ///
  /// Matches `term` case-insensitively against key and description. Entries
  /// whose key starts with the term come first; otherwise the cached order is
  /// kept. Terms shorter than two characters match nothing.
  pub fn search_local(&self, kind: ReferenceKind, term: &str, limit: usize) -> Vec<ReferenceEntry> {
    let needle = term.trim().to_lowercase();
    if needle.chars().count() < 2 || limit == 0 {
      return Vec::new();
    }

    let slot = SlotKey::table(kind);
    let memory = lock(&self.inner.memory);
    let peeked;
    let entries = match memory.get(&slot) {
      Some(record) => &record.payload,
      None => {
        peeked = self.inner.store.peek_record(&slot);
        match &peeked {
          Some(record) => &record.payload,
          None => return Vec::new(),
        }
      }
    };

    let mut matches: Vec<(bool, &ReferenceEntry)> = entries
      .iter()
      .filter_map(|entry| {
        let key = entry.key.to_lowercase();
        if key.starts_with(&needle) {
          Some((true, entry))
        } else if key.contains(&needle) || entry.description.to_lowercase().contains(&needle) {
          Some((false, entry))
        } else {
          None
        }
      })
      .collect();

    // sort_by_key is stable, so ties keep their cached order
    matches.sort_by_key(|(key_prefix, _)| !*key_prefix);

    matches
      .into_iter()
      .take(limit)
      .map(|(_, entry)| entry.clone())
      .collect()
  }

  /// Drop cached records for `kind` (every slot of it), or for every kind.
  ///
  /// A fetch already in flight is not cancelled and will store its result.
  pub fn clear(&self, kind: Option<ReferenceKind>) {
    let kinds = kinds(kind);

    lock(&self.inner.memory).retain(|slot, _| !kinds.contains(&slot.kind));

    for kind in kinds {
      match self.inner.store.delete_kind(kind) {
        Ok(0) => {}
        Ok(removed) => info!(%kind, removed_keys = removed, "Cleared cached reference data"),
        Err(e) => warn!(%kind, error = %e, "Failed to clear persisted reference data"),
      }
    }
  }

  /// Describe what is cached for `kind`, or for everything.
  ///
  /// Never fetches and never modifies memory or storage.
  pub fn status(&self, kind: Option<ReferenceKind>) -> CacheStatus {
    let now = Utc::now();
    let memory = lock(&self.inner.memory);
    let mut status = CacheStatus::default();

    for kind in kinds(kind) {
      let mut slots: HashSet<SlotKey> = memory.keys().filter(|s| s.kind == kind).cloned().collect();
      match self.inner.store.slots(kind) {
        Ok(persisted) => slots.extend(persisted),
        Err(e) => warn!(%kind, error = %e, "Failed to list persisted reference data"),
      }

      for slot in slots {
        let record = match memory.get(&slot) {
          Some(record) => Some(record.clone()),
          None => self.inner.store.peek_record(&slot),
        };
        if let Some(record) = record {
          status.add(&record, now, self.inner.ttl);
        }
      }
    }

    status
  }

  async fn lookup(&self, slot: SlotKey, environment: Environment, force_refresh: bool) -> Lookup {
    let pending = {
      let mut in_flight = lock(&self.inner.in_flight);

      if let Some(pending) = in_flight.get(&slot) {
        debug!(slot = %slot, "Joining in-flight fetch");
        pending.clone()
      } else {
        if !force_refresh {
          if let Some(record) = self.inner.fresh_record(&slot) {
            return CacheResult::from_cache(record.payload, record.fetched_at);
          }
        }

        let pending = spawn_resolve(Arc::clone(&self.inner), slot.clone(), environment);
        in_flight.insert(slot, pending.clone());
        pending
      }
    };

    pending.await
  }
}

impl<F: RemoteFetch> Clone for CacheManager<F> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

/// Run [`resolve`] as its own task so the fetch settles even when every caller
/// waiting on it is dropped.
fn spawn_resolve<F: RemoteFetch>(
  inner: Arc<Inner<F>>,
  slot: SlotKey,
  environment: Environment,
) -> PendingLookup {
  let task = tokio::spawn(resolve(Arc::clone(&inner), slot.clone(), environment));

  async move {
    match task.await {
      Ok(result) => result,
      Err(e) => {
        warn!(slot = %slot, error = %e, "Reference data fetch task failed; serving fallback data");
        lock(&inner.in_flight).remove(&slot);
        CacheResult::fallback(inner.fallback_payload(&slot), Utc::now())
      }
    }
  }
  .boxed()
  .shared()
}

/// Fetch `slot` from the gateway and settle it: store the result, or recover
/// from the failure. Removes the slot's in-flight marker either way.
async fn resolve<F: RemoteFetch>(
  inner: Arc<Inner<F>>,
  slot: SlotKey,
  environment: Environment,
) -> Lookup {
  let result = match inner.fetch_with_retry(&slot, environment).await {
    Ok(entries) => {
      let record = CacheRecord::new(entries, Utc::now());
      inner.remember(&slot, &record);
      info!(slot = %slot, count = record.payload.len(), "Fetched reference data");
      CacheResult::from_network(record.payload, record.fetched_at)
    }
    Err(error) => inner.recover(&slot, error),
  };

  lock(&inner.in_flight).remove(&slot);
  result
}

impl<F: RemoteFetch> Inner<F> {
  /// Keyed lookups retry transient failures; whole tables get one attempt.
  async fn fetch_with_retry(
    &self,
    slot: &SlotKey,
    environment: Environment,
  ) -> Result<Vec<ReferenceEntry>, FetchError> {
    let max_attempts = if slot.kind.is_keyed() {
      self.retry.max_attempts()
    } else {
      1
    };

    let mut attempt = 1;
    loop {
      match self.fetcher.fetch(slot, environment).await {
        Ok(entries) => return Ok(entries),
        Err(error) if error.is_transient() && attempt < max_attempts => {
          let delay = self.retry.delay_after(attempt);
          debug!(slot = %slot, attempt, ?delay, %error, "Retrying reference data fetch");
          if !delay.is_zero() {
            tokio::time::sleep(delay).await;
          }
          attempt += 1;
        }
        Err(error) => return Err(error),
      }
    }
  }

  /// Serve an older payload if one exists, else the fallback table (which is
  /// then stored like a fetched record).
  fn recover(&self, slot: &SlotKey, error: FetchError) -> Lookup {
    if let Some(previous) = self.cached_record(slot) {
      warn!(slot = %slot, %error, fetched_at = %previous.fetched_at, "Fetch failed; serving previous data");
      return CacheResult::stale(previous.payload, previous.fetched_at);
    }

    warn!(slot = %slot, %error, "Fetch failed; serving fallback data");
    let record = CacheRecord::new(self.fallback_payload(slot), Utc::now());
    self.remember(slot, &record);
    CacheResult::fallback(record.payload, record.fetched_at)
  }

  fn fallback_payload(&self, slot: &SlotKey) -> Vec<ReferenceEntry> {
    match &slot.key {
      Some(key) => self.fallback.for_key(slot.kind, key),
      None => self.fallback.table(slot.kind),
    }
  }

  /// A record within the TTL from memory or storage. Expired records read from
  /// storage are still kept in memory for [`recover`](Self::recover).
  fn fresh_record(&self, slot: &SlotKey) -> Option<CacheRecord> {
    let now = Utc::now();
    let record = self.cached_record(slot)?;
    record.is_valid(now, self.ttl).then_some(record)
  }

  /// A record of any age, loading it into memory from storage if needed.
  fn cached_record(&self, slot: &SlotKey) -> Option<CacheRecord> {
    let mut memory = lock(&self.memory);
    if let Some(record) = memory.get(slot) {
      return Some(record.clone());
    }

    let record = self.store.read_record(slot)?;
    memory.insert(slot.clone(), record.clone());
    Some(record)
  }

  fn remember(&self, slot: &SlotKey, record: &CacheRecord) {
    lock(&self.memory).insert(slot.clone(), record.clone());

    if let Err(e) = self.store.write_record(slot, record) {
      warn!(slot = %slot, error = %e, "Failed to persist reference data");
    }
  }
}

fn kinds(kind: Option<ReferenceKind>) -> Vec<ReferenceKind> {
  match kind {
    Some(kind) => vec![kind],
    None => ReferenceKind::ALL.to_vec(),
  }
}

// A panic while holding one of these maps leaves them consistent, so poisoning
// is ignored.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
