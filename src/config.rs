//! Loading console configuration (upstream service, cache, run defaults) from TOML.
//!
//! See `ConsoleConfig` for the expected schema. Environment variables override
//! the file: HINTEVAL_API, HINTEVAL_MODEL, CONSOLE_CACHE_DIR, PORT.

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::RunConfig;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ConsoleConfig {
  #[serde(default)]
  pub service: ServiceCfg,
  #[serde(default)]
  pub cache: CacheCfg,
  #[serde(default)]
  pub run: RunConfig,
  #[serde(default)]
  pub server: ServerCfg,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServiceCfg {
  pub base_url: String,
  /// Per-request transport timeout.
  pub request_timeout_secs: u64,
  /// Upper bound for a mutating operation (generate, evaluate, CRUD) end to end.
  pub mutation_timeout_secs: u64,
}

impl Default for ServiceCfg {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:8001".into(),
      request_timeout_secs: 60,
      mutation_timeout_secs: 120,
    }
  }
}

impl ServiceCfg {
  pub fn request_timeout(&self) -> Duration { Duration::from_secs(self.request_timeout_secs.max(1)) }
  pub fn mutation_timeout(&self) -> Duration { Duration::from_secs(self.mutation_timeout_secs.max(1)) }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CacheCfg {
  pub dir: String,
  pub scope: String,
}

impl Default for CacheCfg {
  fn default() -> Self {
    Self { dir: ".cache".into(), scope: "hinteval_state_v2_refined".into() }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerCfg {
  pub port: u16,
}

impl Default for ServerCfg {
  fn default() -> Self { Self { port: 3000 } }
}

impl ConsoleConfig {
  /// Apply environment overrides on top of file/default values.
  pub fn with_env_overrides(mut self) -> Self {
    if let Ok(url) = std::env::var("HINTEVAL_API") {
      if !url.trim().is_empty() { self.service.base_url = url.trim().trim_end_matches('/').to_string(); }
    }
    if let Ok(model) = std::env::var("HINTEVAL_MODEL") {
      if !model.trim().is_empty() { self.run.model_name = model.trim().to_string(); }
    }
    if let Ok(dir) = std::env::var("CONSOLE_CACHE_DIR") {
      if !dir.trim().is_empty() { self.cache.dir = dir; }
    }
    if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse::<u16>().ok()) {
      self.server.port = port;
    }
    self
  }
}

pub fn parse_config(s: &str) -> Result<ConsoleConfig, toml::de::Error> {
  toml::from_str::<ConsoleConfig>(s)
}

/// Load `ConsoleConfig` from CONSOLE_CONFIG_PATH, then apply env overrides.
/// On any parsing/IO error, defaults are used.
pub fn load_console_config_from_env() -> ConsoleConfig {
  let from_file = std::env::var("CONSOLE_CONFIG_PATH").ok().and_then(|path| {
    match std::fs::read_to_string(&path) {
      Ok(s) => match parse_config(&s) {
        Ok(cfg) => {
          info!(target: "hinteval_console", %path, "Loaded console config (TOML)");
          Some(cfg)
        }
        Err(e) => {
          error!(target: "hinteval_console", %path, error = %e, "Failed to parse TOML config");
          None
        }
      },
      Err(e) => {
        error!(target: "hinteval_console", %path, error = %e, "Failed to read TOML config file");
        None
      }
    }
  });
  from_file.unwrap_or_default().with_env_overrides()
}
