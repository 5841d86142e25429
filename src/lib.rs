//! Reference data for FBR digital invoicing.
//!
//! Item-entry forms need HS codes, units of measure and provinces from the
//! gateway. [`cache::CacheManager`] serves them from memory or local storage
//! where possible and never fails: gateway outages fall back to older data or
//! to compiled-in tables.
//!
//! ```ignore
//! let config = Config::load(None)?;
//! let cache = fbr_refdata::open_cache(&config)?;
//!
//! let codes = cache.get_all(ReferenceKind::HsCodes, Environment::Sandbox, false).await;
//! let units = cache
//!   .get_one(ReferenceKind::Uom, "0101.2100", Environment::Sandbox, LookupOptions::with_rate("18%"))
//!   .await;
//! ```

pub mod cache;
pub mod config;
pub mod fbr;
pub mod logging;
pub mod rules;

use color_eyre::Result;
use std::sync::Arc;

use cache::{CacheManager, KeyValueStorage, RecordStore, SqliteStorage};
use config::Config;
use fbr::credentials::EnvTokenProvider;
use fbr::FbrClient;

/// Build the application's cache manager: SQLite storage, the gateway client
/// with tokens from the environment, and the retry policy from `config`.
pub fn open_cache(config: &Config) -> Result<CacheManager<FbrClient>> {
  let storage: Arc<dyn KeyValueStorage> = match &config.cache.path {
    Some(path) => Arc::new(SqliteStorage::open_at(path)?),
    None => Arc::new(SqliteStorage::open()?),
  };
  let store = RecordStore::new(storage, config.cache.prefix.clone());
  let client = FbrClient::new(&config.fbr, Arc::new(EnvTokenProvider))?;

  Ok(
    CacheManager::builder(client, store)
      .retry_policy(config.retry.policy())
      .build(),
  )
}
