use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::scheduler::DEFAULT_MAX_CONCURRENCY;

/// Region used when no config file exists and none is given on the CLI.
pub const DEFAULT_REGION: &str = "mypurecloud.com";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub directory: DirectoryConfig,
  /// Custom title for the header (defaults to the region if not set)
  pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
  /// Region domain, e.g. "mypurecloud.ie". API calls go to api.<region>.
  pub region: String,
  /// Maximum simultaneous API requests.
  pub max_concurrent_requests: usize,
}

impl Default for DirectoryConfig {
  fn default() -> Self {
    Self {
      region: DEFAULT_REGION.to_string(),
      max_concurrent_requests: DEFAULT_MAX_CONCURRENCY,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./orgx.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/orgx/config.yaml
  ///
  /// The app is usable with no file at all, so a missing config falls back
  /// to defaults instead of erroring.
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
    let local = PathBuf::from("orgx.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("orgx").join("config.yaml");
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

  /// Get the bearer token from environment variables.
  ///
  /// The OAuth flow that produces the token lives outside the app; it only
  /// hands us the resulting string. Checks ORGX_ACCESS_TOKEN first, then
  /// GENESYS_ACCESS_TOKEN as fallback.
  pub fn get_access_token() -> Result<String> {
    std::env::var("ORGX_ACCESS_TOKEN")
      .or_else(|_| std::env::var("GENESYS_ACCESS_TOKEN"))
      .map_err(|_| {
        eyre!(
          "Access token not found. Set ORGX_ACCESS_TOKEN or GENESYS_ACCESS_TOKEN environment variable."
        )
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.directory.region, DEFAULT_REGION);
    assert_eq!(
      config.directory.max_concurrent_requests,
      DEFAULT_MAX_CONCURRENCY
    );
    assert!(config.title.is_none());
  }

  #[test]
  fn test_partial_yaml_fills_in_defaults() {
    let config: Config = serde_yaml::from_str("directory:\n  region: mypurecloud.ie\n").unwrap();
    assert_eq!(config.directory.region, "mypurecloud.ie");
    assert_eq!(
      config.directory.max_concurrent_requests,
      DEFAULT_MAX_CONCURRENCY
    );
  }
}
