//! Gateway API tokens per environment.

use sha2::{Digest, Sha256};
use std::collections::HashMap;

use super::types::Environment;

/// Token shared by both environments when no specific one is set.
pub const TOKEN_ENV: &str = "FBR_TOKEN";

/// Source of bearer tokens for the gateway.
pub trait TokenProvider: Send + Sync {
  /// Token for `environment`, or `None` when none is configured.
  fn token(&self, environment: Environment) -> Option<String>;
}

/// Reads tokens from environment variables.
///
/// Checks `FBR_SANDBOX_TOKEN` / `FBR_PRODUCTION_TOKEN` first, then `FBR_TOKEN`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvTokenProvider;

impl EnvTokenProvider {
  pub fn variable_for(environment: Environment) -> &'static str {
    match environment {
      Environment::Sandbox => "FBR_SANDBOX_TOKEN",
      Environment::Production => "FBR_PRODUCTION_TOKEN",
    }
  }
}

impl TokenProvider for EnvTokenProvider {
  fn token(&self, environment: Environment) -> Option<String> {
    std::env::var(Self::variable_for(environment))
      .or_else(|_| std::env::var(TOKEN_ENV))
      .ok()
      .map(|t| t.trim().to_string())
      .filter(|t| !t.is_empty())
  }
}

/// Fixed tokens, for embedding callers and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticTokens {
  tokens: HashMap<Environment, String>,
}

impl StaticTokens {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, environment: Environment, token: impl Into<String>) -> Self {
    self.tokens.insert(environment, token.into());
    self
  }
}

impl TokenProvider for StaticTokens {
  fn token(&self, environment: Environment) -> Option<String> {
    self.tokens.get(&environment).cloned()
  }
}

/// Short, stable identifier for a token that is safe to log.
pub fn fingerprint(token: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(token.as_bytes());
  let digest = hex::encode(hasher.finalize());
  digest[..12].to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_static_tokens_are_per_environment() {
    let tokens = StaticTokens::new().with(Environment::Sandbox, "abc");
    assert_eq!(tokens.token(Environment::Sandbox), Some("abc".to_string()));
    assert_eq!(tokens.token(Environment::Production), None);
  }

  #[test]
  fn test_fingerprint_is_stable_and_short() {
    let a = fingerprint("secret-token");
    assert_eq!(a.len(), 12);
    assert_eq!(a, fingerprint("secret-token"));
    assert_ne!(a, fingerprint("other-token"));
    assert!(!a.contains("secret"));
  }
}
