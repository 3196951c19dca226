use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Application configuration.
///
/// Every field has a default so the engine can run without a config file;
/// the file only overrides what it names.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Application id, embedded in cache namespace names
  pub app_name: String,
  /// Cache version tag; bumping it retires all prior cache namespaces on
  /// the next activation
  pub cache_version: String,
  /// Origin the shell manifest paths are resolved against
  pub base_url: String,
  /// Path prefixes classified as API requests
  pub api_prefixes: Vec<String>,
  /// Shell resources pre-cached at install time
  pub shell_manifest: Vec<String>,
  /// Timeout applied to every network fetch, in seconds
  pub request_timeout_secs: u64,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      app_name: "healthatm".to_string(),
      cache_version: "1.0.0".to_string(),
      base_url: "http://localhost:8080".to_string(),
      api_prefixes: vec!["/api/".to_string(), "/functions/".to_string()],
      shell_manifest: vec![
        "/".to_string(),
        "/index.html".to_string(),
        "/src/main.tsx".to_string(),
        "/src/App.tsx".to_string(),
        "/src/index.css".to_string(),
        "/manifest.json".to_string(),
      ],
      request_timeout_secs: 30,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./sehat.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/sehat/config.yaml
  ///
  /// Falls back to the built-in defaults when no file exists.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("sehat.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("sehat").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Name of the static cache namespace for the current version.
  pub fn static_cache_name(&self) -> String {
    format!("{}-static-v{}", self.app_name, self.cache_version)
  }

  /// Name of the runtime cache namespace for the current version.
  pub fn runtime_cache_name(&self) -> String {
    format!("{}-runtime-v{}", self.app_name, self.cache_version)
  }

  /// Resolve a shell-manifest path against the configured origin.
  pub fn resource_url(&self, path: &str) -> String {
    let base = self.base_url.trim_end_matches('/');
    format!("{}{}", base, path)
  }

  /// URL of the cached application shell (the root document).
  pub fn shell_url(&self) -> String {
    self.resource_url("/")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_cache_names_embed_version() {
    let config = Config::default();
    assert_eq!(config.static_cache_name(), "healthatm-static-v1.0.0");
    assert_eq!(config.runtime_cache_name(), "healthatm-runtime-v1.0.0");
  }

  #[test]
  fn test_version_bump_changes_both_names() {
    let config = Config {
      cache_version: "1.1.0".to_string(),
      ..Config::default()
    };
    assert_eq!(config.static_cache_name(), "healthatm-static-v1.1.0");
    assert_eq!(config.runtime_cache_name(), "healthatm-runtime-v1.1.0");
  }

  #[test]
  fn test_resource_url_joins_without_double_slash() {
    let config = Config {
      base_url: "http://kiosk.local/".to_string(),
      ..Config::default()
    };
    assert_eq!(
      config.resource_url("/index.html"),
      "http://kiosk.local/index.html"
    );
    assert_eq!(config.shell_url(), "http://kiosk.local/");
  }

  #[test]
  fn test_partial_yaml_keeps_defaults() {
    let config: Config = serde_yaml::from_str("cache_version: \"2.0.0\"").unwrap();
    assert_eq!(config.cache_version, "2.0.0");
    assert_eq!(config.app_name, "healthatm");
    assert_eq!(config.api_prefixes, vec!["/api/", "/functions/"]);
  }
}
