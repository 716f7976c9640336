//! Loading service configuration (upstream endpoints + queue tuning) from TOML.
//!
//! See `ServiceConfig` for the expected schema. Every section and key is optional;
//! environment variables override the file for deployment-specific values.

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::Mode;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ServiceConfig {
  #[serde(default)]
  pub upstream: UpstreamConfig,
  #[serde(default)]
  pub queue: QueueConfig,
}

/// Where the vocabulary server lives and how to reach it.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
  pub base_url: String,
  pub list_path: String,
  pub submit_path: String,
  pub timeout_secs: u64,
  pub user_agent: String,
  /// Bearer token. Only ever read from UPSTREAM_TOKEN, never from the file.
  #[serde(skip)]
  pub token: Option<String>,
}

impl Default for UpstreamConfig {
  fn default() -> Self {
    Self {
      base_url: "http://127.0.0.1:8080".into(),
      list_path: "/api/study/queue".into(),
      submit_path: "/api/study/grade".into(),
      timeout_secs: 15,
      user_agent: "quizdeck-backend/0.1".into(),
      token: None,
    }
  }
}

/// Page sizes and refill behavior for the review queues.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
  pub learn_limit: usize,
  pub review_limit: usize,
  /// Lower bound of the top-up threshold (`max(min_top_up, limit / 2)`).
  pub min_top_up: usize,
  /// Start a new batch automatically once a session completes.
  pub restart_on_complete: bool,
}

impl Default for QueueConfig {
  fn default() -> Self {
    Self { learn_limit: 10, review_limit: 20, min_top_up: 3, restart_on_complete: false }
  }
}

impl QueueConfig {
  pub fn limit_for(&self, mode: Mode) -> usize {
    let limit = match mode {
      Mode::Learn => self.learn_limit,
      Mode::Review => self.review_limit,
    };
    limit.max(1)
  }
}

impl ServiceConfig {
  /// File config (if QUIZDECK_CONFIG_PATH is set and readable), then env overrides.
  pub fn from_env() -> Self {
    let mut cfg = load_config_from_env().unwrap_or_default();
    cfg.apply_env_overrides(|k| std::env::var(k).ok());
    cfg
  }

  fn apply_env_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
    if let Some(url) = get("UPSTREAM_BASE_URL").filter(|s| !s.trim().is_empty()) {
      self.upstream.base_url = url.trim().to_string();
    }
    self.upstream.token = get("UPSTREAM_TOKEN").filter(|s| !s.trim().is_empty());
  }
}

/// Attempt to load `ServiceConfig` from QUIZDECK_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_from_env() -> Option<ServiceConfig> {
  let path = std::env::var("QUIZDECK_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<ServiceConfig>(&s) {
      Ok(cfg) => {
        info!(target: "quizdeck_backend", %path, "Loaded service config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "quizdeck_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "quizdeck_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
