//! Key/value storage backends and the record adapter the cache manager uses.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::traits::CacheRecord;
use crate::fbr::types::{ReferenceEntry, ReferenceKind, SlotKey};

/// Durable string key/value storage.
pub trait KeyValueStorage: Send + Sync {
  /// Read a value.
  fn get_item(&self, key: &str) -> Result<Option<String>>;

  /// Write a value, replacing any previous one.
  fn set_item(&self, key: &str, value: &str) -> Result<()>;

  /// Write several values as one logical operation.
  ///
  /// The default writes them one by one; backends that can do better override it.
  fn set_items(&self, items: &[(&str, &str)]) -> Result<()> {
    for (key, value) in items {
      self.set_item(key, value)?;
    }
    Ok(())
  }

  /// Delete a value. Deleting a missing key is not an error.
  fn remove_item(&self, key: &str) -> Result<()>;

  /// All keys starting with `prefix`, in lexical order.
  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Storage that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
  items: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl KeyValueStorage for MemoryStorage {
  fn get_item(&self, key: &str) -> Result<Option<String>> {
    let items = self
      .items
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(items.get(key).cloned())
  }

  fn set_item(&self, key: &str, value: &str) -> Result<()> {
    let mut items = self
      .items
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    items.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove_item(&self, key: &str) -> Result<()> {
    let mut items = self
      .items
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    items.remove(key);
    Ok(())
  }

  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
    let items = self
      .items
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(
      items
        .range(prefix.to_string()..)
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, _)| k.clone())
        .collect(),
    )
  }
}

/// SQLite-based key/value storage.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the store at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;
    Self::open_at(&path)
  }

  /// Open (or create) the store at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// A throwaway in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("fbr-refdata").join("cache.db"))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

impl KeyValueStorage for SqliteStorage {
  fn get_item(&self, key: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read {}: {}", key, e))
  }

  fn set_item(&self, key: &str, value: &str) -> Result<()> {
    self.set_items(&[(key, value)])
  }

  fn set_items(&self, items: &[(&str, &str)]) -> Result<()> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    for (key, value) in items {
      tx.execute(
        "INSERT OR REPLACE INTO kv_store (key, value) VALUES (?, ?)",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write {}: {}", key, e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn remove_item(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM kv_store WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to delete {}: {}", key, e))?;

    Ok(())
  }

  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    // substr instead of LIKE: '_' is a LIKE wildcard and appears in every key
    let mut stmt = conn
      .prepare(
        "SELECT key FROM kv_store WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
      )
      .map_err(|e| eyre!("Failed to prepare key scan: {}", e))?;

    let keys = stmt
      .query_map(params![prefix], |row| row.get(0))
      .map_err(|e| eyre!("Failed to scan keys: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read key: {}", e))?;

    Ok(keys)
  }
}

/// Stores cache records on top of a [`KeyValueStorage`].
///
/// Each record occupies two keys: `<slot>_cache` holds the payload as JSON
/// and `<slot>_cache_timestamp` the fetch time in milliseconds since epoch.
#[derive(Clone)]
pub struct RecordStore {
  backend: Arc<dyn KeyValueStorage>,
  prefix: String,
}

impl RecordStore {
  pub fn new(backend: Arc<dyn KeyValueStorage>, prefix: impl Into<String>) -> Self {
    Self {
      backend,
      prefix: prefix.into(),
    }
  }

  pub fn prefix(&self) -> &str {
    &self.prefix
  }

  /// Read a record. Corrupt or half-written records are logged, deleted and
  /// reported as absent.
  pub fn read_record(&self, slot: &SlotKey) -> Option<CacheRecord> {
    match self.load(slot) {
      Ok(record) => record,
      Err(reason) => {
        warn!(slot = %slot, %reason, "Discarding unreadable cache record");
        if let Err(e) = self.delete_record(slot) {
          warn!(slot = %slot, error = %e, "Failed to delete unreadable cache record");
        }
        None
      }
    }
  }

  /// Like [`read_record`](Self::read_record) but never modifies storage.
  pub fn peek_record(&self, slot: &SlotKey) -> Option<CacheRecord> {
    self.load(slot).unwrap_or_else(|reason| {
      debug!(slot = %slot, %reason, "Ignoring unreadable cache record");
      None
    })
  }

  /// Write payload and timestamp together.
  pub fn write_record(&self, slot: &SlotKey, record: &CacheRecord) -> Result<()> {
    let key = slot.storage_key(&self.prefix);
    let timestamp_key = timestamp_key(&key);
    let payload = serde_json::to_string(&record.payload)
      .map_err(|e| eyre!("Failed to serialize cache payload: {}", e))?;
    let timestamp = record.fetched_at.timestamp_millis().to_string();

    self
      .backend
      .set_items(&[(key.as_str(), payload.as_str()), (timestamp_key.as_str(), timestamp.as_str())])
  }

  pub fn delete_record(&self, slot: &SlotKey) -> Result<()> {
    let key = slot.storage_key(&self.prefix);
    self.backend.remove_item(&key)?;
    self.backend.remove_item(&timestamp_key(&key))
  }

  /// Every persisted slot of `kind`.
  pub fn slots(&self, kind: ReferenceKind) -> Result<Vec<SlotKey>> {
    if !kind.is_keyed() {
      let slot = SlotKey::table(kind);
      let present = self.backend.get_item(&slot.storage_key(&self.prefix))?.is_some();
      return Ok(if present { vec![slot] } else { Vec::new() });
    }

    let kind_prefix = format!("{}_{}_", self.prefix, kind.slug());
    let keys = self.backend.keys_with_prefix(&kind_prefix)?;

    Ok(
      keys
        .iter()
        .filter_map(|k| k.strip_prefix(&kind_prefix)?.strip_suffix("_cache"))
        .map(|key| SlotKey::keyed(kind, key))
        .collect(),
    )
  }

  /// Delete every payload and timestamp key of `kind`, including halves of
  /// records whose other key is missing. Returns the number of keys removed.
  pub fn delete_kind(&self, kind: ReferenceKind) -> Result<usize> {
    let keys: Vec<String> = if kind.is_keyed() {
      let kind_prefix = format!("{}_{}_", self.prefix, kind.slug());
      self
        .backend
        .keys_with_prefix(&kind_prefix)?
        .into_iter()
        .filter(|k| k.ends_with("_cache") || k.ends_with("_cache_timestamp"))
        .collect()
    } else {
      let key = SlotKey::table(kind).storage_key(&self.prefix);
      let timestamp_key = timestamp_key(&key);
      let mut present = Vec::new();
      for k in [key, timestamp_key] {
        if self.backend.get_item(&k)?.is_some() {
          present.push(k);
        }
      }
      present
    };

    for key in &keys {
      self.backend.remove_item(key)?;
    }
    Ok(keys.len())
  }

  fn load(&self, slot: &SlotKey) -> std::result::Result<Option<CacheRecord>, String> {
    let key = slot.storage_key(&self.prefix);
    let payload = self.backend.get_item(&key).map_err(|e| e.to_string())?;
    let timestamp = self
      .backend
      .get_item(&timestamp_key(&key))
      .map_err(|e| e.to_string())?;

    match (payload, timestamp) {
      (None, None) => Ok(None),
      (Some(payload), Some(timestamp)) => decode_record(&payload, &timestamp).map(Some),
      (Some(_), None) => Err("payload without timestamp".to_string()),
      (None, Some(_)) => Err("timestamp without payload".to_string()),
    }
  }
}

fn timestamp_key(storage_key: &str) -> String {
  format!("{}_timestamp", storage_key)
}

fn decode_record(payload: &str, timestamp: &str) -> std::result::Result<CacheRecord, String> {
  let entries: Vec<ReferenceEntry> =
    serde_json::from_str(payload).map_err(|e| format!("corrupt payload: {}", e))?;

  let millis: i64 = timestamp
    .trim()
    .parse()
    .map_err(|e| format!("corrupt timestamp '{}': {}", timestamp, e))?;

  let fetched_at: DateTime<Utc> = DateTime::from_timestamp_millis(millis)
    .ok_or_else(|| format!("timestamp out of range: {}", millis))?;

  Ok(CacheRecord::new(entries, fetched_at))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn entries() -> Vec<ReferenceEntry> {
    vec![
      ReferenceEntry::new("0101.2100", "Pure-bred breeding horses"),
      ReferenceEntry::new("1001.1100", "Durum wheat seed"),
    ]
  }

  fn memory_store() -> (Arc<MemoryStorage>, RecordStore) {
    let backend = Arc::new(MemoryStorage::new());
    let store = RecordStore::new(backend.clone(), "fbr");
    (backend, store)
  }

  #[test]
  fn test_record_survives_write_and_read() {
    let (backend, store) = memory_store();
    let slot = SlotKey::table(ReferenceKind::HsCodes);
    let fetched_at = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
    let record = CacheRecord::new(entries(), fetched_at);

    store.write_record(&slot, &record).unwrap();

    assert_eq!(
      backend.get_item("fbr_hs_codes_cache_timestamp").unwrap(),
      Some("1700000000123".to_string())
    );
    assert_eq!(store.read_record(&slot), Some(record));
  }

  #[test]
  fn test_corrupt_payload_is_cleared() {
    let (backend, store) = memory_store();
    backend.set_item("fbr_hs_codes_cache", "{not json").unwrap();
    backend
      .set_item("fbr_hs_codes_cache_timestamp", "1700000000000")
      .unwrap();

    let slot = SlotKey::table(ReferenceKind::HsCodes);
    assert_eq!(store.read_record(&slot), None);
    assert_eq!(backend.get_item("fbr_hs_codes_cache").unwrap(), None);
    assert_eq!(backend.get_item("fbr_hs_codes_cache_timestamp").unwrap(), None);
  }

  #[test]
  fn test_half_written_record_is_absent() {
    let (backend, store) = memory_store();
    backend.set_item("fbr_provinces_cache", "[]").unwrap();

    let slot = SlotKey::table(ReferenceKind::Provinces);
    assert_eq!(store.read_record(&slot), None);
    assert!(backend.keys_with_prefix("fbr_").unwrap().is_empty());
  }

  #[test]
  fn test_peek_does_not_repair() {
    let (backend, store) = memory_store();
    backend.set_item("fbr_units_cache", "garbage").unwrap();
    backend.set_item("fbr_units_cache_timestamp", "nope").unwrap();

    assert_eq!(store.peek_record(&SlotKey::table(ReferenceKind::Units)), None);
    assert_eq!(
      backend.get_item("fbr_units_cache").unwrap(),
      Some("garbage".to_string())
    );
  }

  #[test]
  fn test_keyed_slots_are_listed_and_deleted() {
    let (_backend, store) = memory_store();
    let record = CacheRecord::new(entries(), Utc::now());
    store
      .write_record(&SlotKey::keyed(ReferenceKind::Uom, "0101.2100"), &record)
      .unwrap();
    store
      .write_record(&SlotKey::keyed(ReferenceKind::Uom, "2523.2900"), &record)
      .unwrap();
    store
      .write_record(&SlotKey::table(ReferenceKind::Units), &record)
      .unwrap();

    let slots = store.slots(ReferenceKind::Uom).unwrap();
    assert_eq!(
      slots,
      vec![
        SlotKey::keyed(ReferenceKind::Uom, "0101.2100"),
        SlotKey::keyed(ReferenceKind::Uom, "2523.2900"),
      ]
    );

    // Payload and timestamp for each slot
    assert_eq!(store.delete_kind(ReferenceKind::Uom).unwrap(), 4);
    assert!(store.slots(ReferenceKind::Uom).unwrap().is_empty());
    assert_eq!(store.slots(ReferenceKind::Units).unwrap().len(), 1);
  }

  #[test]
  fn test_delete_kind_removes_half_written_records() {
    let (backend, store) = memory_store();
    backend.set_item("fbr_uom_0101.2100_cache_timestamp", "1").unwrap();
    backend.set_item("fbr_uom_2523.2900_cache", "[]").unwrap();
    backend.set_item("fbr_hs_codes_cache_timestamp", "1").unwrap();
    backend.set_item("fbr_provinces_cache", "[]").unwrap();

    assert_eq!(store.delete_kind(ReferenceKind::Uom).unwrap(), 2);
    assert_eq!(store.delete_kind(ReferenceKind::HsCodes).unwrap(), 1);
    assert_eq!(store.delete_kind(ReferenceKind::Units).unwrap(), 0);
    assert_eq!(
      backend.keys_with_prefix("fbr_").unwrap(),
      vec!["fbr_provinces_cache".to_string()]
    );

    assert_eq!(store.delete_kind(ReferenceKind::Provinces).unwrap(), 1);
    assert!(backend.keys_with_prefix("fbr_").unwrap().is_empty());
  }

  #[test]
  fn test_sqlite_prefix_scan_treats_underscore_literally() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.set_item("fbr_uom_a_cache", "[]").unwrap();
    storage.set_item("fbrXuom_b_cache", "[]").unwrap();
    storage.set_item("fbr_units_cache", "[]").unwrap();

    assert_eq!(
      storage.keys_with_prefix("fbr_uom_").unwrap(),
      vec!["fbr_uom_a_cache".to_string()]
    );
  }

  #[test]
  fn test_sqlite_round_trips_items() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage
      .set_items(&[("fbr_a_cache", "[]"), ("fbr_a_cache_timestamp", "1")])
      .unwrap();
    assert_eq!(storage.get_item("fbr_a_cache").unwrap(), Some("[]".to_string()));

    storage.remove_item("fbr_a_cache").unwrap();
    storage.remove_item("fbr_a_cache").unwrap();
    assert_eq!(storage.get_item("fbr_a_cache").unwrap(), None);
    assert_eq!(
      storage.keys_with_prefix("fbr_").unwrap(),
      vec!["fbr_a_cache_timestamp".to_string()]
    );
  }
}
