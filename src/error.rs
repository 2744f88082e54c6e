//! Error types shared by every operation.

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Lint findings grouped by category (`fields`, `dockerfile`, `files`).
pub type LintIssues = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum Error {
  /// The document is malformed, not a mapping, or misses a required field.
  #[error("invalid challenge document {path}: {message}")]
  InvalidDocument { path: PathBuf, message: String },

  /// A file referenced by the document does not exist on disk.
  #[error("file {0} could not be found")]
  FileNotFound(PathBuf),

  #[error("remote challenge not found: {0}")]
  RemoteChallengeNotFound(String),

  /// A challenge lists a file the platform's file registry does not know.
  #[error("remote file {0} is not in the file registry")]
  RemoteFileNotFound(String),

  /// Aggregated lint result; carries every issue, not only the first.
  #[error("lint failed with {} issue(s)", .issues.values().map(Vec::len).sum::<usize>())]
  Lint { issues: LintIssues },

  /// The platform answered a call with a non-success status.
  #[error("{method} {path} failed with HTTP {status}: {message}")]
  Remote {
    method: String,
    path: String,
    status: u16,
    message: String,
  },

  #[error("transport error: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("YAML error: {0}")]
  Yaml(#[from] serde_yaml::Error),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("configuration error: {0}")]
  Config(String),

  /// An ignore-set entry that names no known document field.
  #[error("unknown field selector '{0}'")]
  UnknownField(String),
}

impl Error {
  pub(crate) fn invalid(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
    Error::InvalidDocument { path: path.into(), message: message.into() }
  }
}
