use color_eyre::{eyre::eyre, Result};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::FbrConfig;
use crate::fbr::api_types::parse_entries;
use crate::fbr::credentials::{fingerprint, TokenProvider};
use crate::fbr::error::FetchError;
use crate::fbr::types::{Environment, ReferenceEntry, ReferenceKind, SlotKey};

/// Annexure the gateway uses for sales-tax unit mappings.
const SALES_TAX_ANNEXURE: &str = "3";

/// Fetches one reference slot from a remote source.
pub trait RemoteFetch: Send + Sync + 'static {
  fn fetch(
    &self,
    slot: &SlotKey,
    environment: Environment,
  ) -> impl Future<Output = Result<Vec<ReferenceEntry>, FetchError>> + Send;
}

/// Gateway API client
#[derive(Clone)]
pub struct FbrClient {
  http: reqwest::Client,
  base_url: Url,
  tokens: Arc<dyn TokenProvider>,
}

impl FbrClient {
  pub fn new(config: &FbrConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
    let mut base_url = Url::parse(&config.base_url)
      .map_err(|e| eyre!("Invalid gateway URL {}: {}", config.base_url, e))?;

    // Url::join replaces the last segment unless the base ends with '/'
    if !base_url.path().ends_with('/') {
      let path = format!("{}/", base_url.path());
      base_url.set_path(&path);
    }

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      tokens,
    })
  }

  /// URL serving `slot`.
  pub fn endpoint(&self, slot: &SlotKey) -> Result<Url, FetchError> {
    let path = match slot.kind {
      ReferenceKind::HsCodes => "pdi/v1/itemdesccode",
      ReferenceKind::Provinces => "pdi/v1/provinces",
      ReferenceKind::Units => "pdi/v1/uom",
      ReferenceKind::Uom => "pdi/v2/HS_UOM",
    };

    let mut url = self
      .base_url
      .join(path)
      .map_err(|e| FetchError::RemoteUnavailable(format!("invalid endpoint {}: {}", path, e)))?;

    if slot.kind.is_keyed() {
      url
        .query_pairs_mut()
        .append_pair("hs_code", slot.key.as_deref().unwrap_or_default())
        .append_pair("annexure_id", SALES_TAX_ANNEXURE);
    }

    Ok(url)
  }
}

impl RemoteFetch for FbrClient {
  async fn fetch(
    &self,
    slot: &SlotKey,
    environment: Environment,
  ) -> Result<Vec<ReferenceEntry>, FetchError> {
    let token = self
      .tokens
      .token(environment)
      .ok_or(FetchError::MissingCredential(environment))?;

    let url = self.endpoint(slot)?;
    debug!(
      slot = %slot,
      %environment,
      token = %fingerprint(&token),
      %url,
      "Fetching reference data"
    );

    let response = self
      .http
      .get(url)
      .header(AUTHORIZATION, format!("Bearer {}", token))
      .header(ACCEPT, "application/json")
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      warn!(slot = %slot, %status, "Gateway rejected reference data request");
      return Err(FetchError::RemoteUnavailable(format!(
        "gateway returned {}",
        status
      )));
    }

    let body = response.text().await?;
    parse_entries(slot.kind, &body)
  }
}
