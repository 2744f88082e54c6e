//! Loading the remote platform configuration (endpoint + access token).
//!
//! Sources, later ones override earlier ones:
//!   1. TOML file at `CHALSYNC_CONFIG`, or `.ctf/config.toml` if present
//!   2. env `CTF_URL`, `CTF_ACCESS_TOKEN`, `CTF_TIMEOUT_SECS`
//!
//! Expected TOML schema:
//!
//! ```toml
//! [remote]
//! url = "https://ctf.example.org"
//! access_token = "ctfd_..."
//! timeout_secs = 30
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

const DEFAULT_CONFIG_PATH: &str = ".ctf/config.toml";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug, Deserialize, Default)]
struct ConfigFile {
  #[serde(default)]
  remote: RemoteSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
struct RemoteSection {
  #[serde(default)] url: Option<String>,
  #[serde(default)] access_token: Option<String>,
  #[serde(default)] timeout_secs: Option<u64>,
}

/// Where and how to reach the platform.
#[derive(Clone, Debug)]
pub struct RemoteConfig {
  pub url: String,
  pub access_token: String,
  pub timeout_secs: u64,
}

impl RemoteConfig {
  /// Resolve the configuration from the optional TOML file and the environment.
  pub fn from_env() -> Result<Self> {
    let path = std::env::var("CHALSYNC_CONFIG")
      .map(PathBuf::from)
      .ok()
      .or_else(|| Some(PathBuf::from(DEFAULT_CONFIG_PATH)).filter(|p| p.is_file()));

    let file = match path {
      Some(p) => load_config_file(&p)?,
      None => {
        debug!(target: "chalsync", "No config file, using environment only");
        ConfigFile::default()
      }
    };

    let url = std::env::var("CTF_URL").ok().or(file.remote.url);
    let access_token = std::env::var("CTF_ACCESS_TOKEN").ok().or(file.remote.access_token);
    let timeout_secs = match std::env::var("CTF_TIMEOUT_SECS") {
      Ok(raw) => raw
        .parse::<u64>()
        .map_err(|e| Error::Config(format!("CTF_TIMEOUT_SECS '{raw}': {e}")))?,
      Err(_) => file.remote.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
    };

    Self::new(url, access_token, timeout_secs)
  }

  fn new(url: Option<String>, access_token: Option<String>, timeout_secs: u64) -> Result<Self> {
    let url = url
      .filter(|u| !u.trim().is_empty())
      .ok_or_else(|| Error::Config("remote url is not set (CTF_URL or [remote].url)".into()))?;
    let access_token = access_token
      .filter(|t| !t.trim().is_empty())
      .ok_or_else(|| Error::Config("access token is not set (CTF_ACCESS_TOKEN or [remote].access_token)".into()))?;

    Ok(Self {
      url: url.trim_end_matches('/').to_string(),
      access_token,
      timeout_secs,
    })
  }
}

fn load_config_file(path: &Path) -> Result<ConfigFile> {
  let raw = std::fs::read_to_string(path)
    .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
  let cfg = toml::from_str::<ConfigFile>(&raw)
    .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?;
  info!(target: "chalsync", path = %path.display(), "Loaded config (TOML)");
  Ok(cfg)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn file_section_parses_and_url_is_trimmed() {
    let cfg: ConfigFile = toml::from_str(
      "[remote]\nurl = \"https://ctf.example.org/\"\naccess_token = \"tok\"\n",
    )
    .unwrap();
    let remote = RemoteConfig::new(cfg.remote.url, cfg.remote.access_token, 5).unwrap();
    assert_eq!(remote.url, "https://ctf.example.org");
    assert_eq!(remote.timeout_secs, 5);
  }

  #[test]
  fn missing_token_is_a_config_error() {
    let err = RemoteConfig::new(Some("http://x".into()), None, 5).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
  }
}
