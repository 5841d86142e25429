use thiserror::Error;

use super::types::Environment;

/// Why a remote reference-data fetch produced no entries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
  /// Network failure, timeout or non-2xx status.
  #[error("Gateway unavailable: {0}")]
  RemoteUnavailable(String),

  /// 2xx response whose body is not a list of entries.
  #[error("Malformed gateway response: {0}")]
  MalformedResponse(String),

  /// No token configured for the environment; nothing was sent.
  #[error("No API token configured for {0}")]
  MissingCredential(Environment),
}

impl FetchError {
  /// Whether another attempt could plausibly succeed.
  pub fn is_transient(&self) -> bool {
    matches!(self, Self::RemoteUnavailable(_))
  }
}

impl From<reqwest::Error> for FetchError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_decode() {
      Self::MalformedResponse(e.to_string())
    } else {
      Self::RemoteUnavailable(e.to_string())
    }
  }
}
