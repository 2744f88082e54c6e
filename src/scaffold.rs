//! Materialize a new challenge directory with a minimal document.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::document::{render, DOCUMENT_NAME};
use crate::domain::ChallengeSpec;
use crate::error::{Error, Result};

/// Create `dir` with a `challenge.yml` holding only `name`. Refuses to
/// touch an existing directory. Returns the document path.
pub fn materialize(dir: &Path, name: &str) -> Result<PathBuf> {
  if dir.exists() {
    return Err(Error::invalid(dir, format!("challenge directory for '{name}' already exists")));
  }
  std::fs::create_dir_all(dir)?;

  let path = dir.join(DOCUMENT_NAME);
  let spec = ChallengeSpec { name: name.to_string(), ..Default::default() };
  std::fs::write(&path, render(&spec)?)?;
  info!(target: "chalsync", dir = %dir.display(), %name, "Scaffolded challenge directory");
  Ok(path)
}
