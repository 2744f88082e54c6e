//! File content hashing and remote file convergence.
//!
//! Files are matched by basename. The platform lists challenge files as
//! URLs shaped `/files/<dir>/<basename>?token=...`; its registry keys the
//! same files by `<dir>/<basename>` and, on newer versions, reports a SHA-1
//! checksum that lets us skip unchanged uploads.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};
use tracing::{debug, info, instrument};

use crate::api::RemoteClient;
use crate::error::{Error, Result};
use crate::protocol::RemoteFileEntry;
use crate::util::basename;

/// Hex SHA-1 of a file, read in chunks.
pub fn sha1_file(path: &Path) -> Result<String> {
  let mut file = File::open(path).map_err(|e| match e.kind() {
    std::io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
    _ => Error::Io(e),
  })?;
  let mut hasher = Sha1::new();
  let mut buf = [0u8; 64 * 1024];
  loop {
    let n = file.read(&mut buf)?;
    if n == 0 {
      break;
    }
    hasher.update(&buf[..n]);
  }
  Ok(hex::encode(hasher.finalize()))
}

/// A file as listed on a remote challenge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteFile {
  /// Download URL, token included.
  pub url: String,
  /// Registry key, `<dir>/<basename>`.
  pub location: String,
}

/// Basename -> remote file for a challenge's file URL list.
pub fn remote_files(urls: &[String]) -> BTreeMap<String, RemoteFile> {
  urls
    .iter()
    .map(|url| {
      let path = url.split("?token=").next().unwrap_or(url);
      let mut parts = path.rsplit('/');
      let name = parts.next().unwrap_or_default().to_string();
      let dir = parts.next().unwrap_or_default();
      let location = format!("{dir}/{name}");
      (name, RemoteFile { url: url.clone(), location })
    })
    .collect()
}

/// Basename -> declared relative path for a document's file list.
pub fn local_files(files: &[String]) -> BTreeMap<String, String> {
  files.iter().map(|f| (basename(f).to_string(), f.clone())).collect()
}

/// Fail on the first declared file missing from `dir`.
pub fn validate_files(dir: &Path, files: &[String]) -> Result<()> {
  for f in files {
    let path = dir.join(f);
    if !path.exists() {
      return Err(Error::FileNotFound(path));
    }
  }
  Ok(())
}

/// The platform's file registry, fetched once per pass.
#[derive(Clone, Debug, Default)]
pub struct FileRegistry {
  by_location: HashMap<String, RemoteFileEntry>,
}

impl FileRegistry {
  pub async fn fetch(api: &RemoteClient) -> Result<Self> {
    Ok(Self::new(api.file_registry().await?))
  }

  pub fn new(entries: Vec<RemoteFileEntry>) -> Self {
    Self {
      by_location: entries.into_iter().map(|e| (e.location.clone(), e)).collect(),
    }
  }

  pub fn id(&self, location: &str) -> Option<i64> {
    self.by_location.get(location).map(|e| e.id)
  }

  pub fn require_id(&self, location: &str) -> Result<i64> {
    self.id(location).ok_or_else(|| Error::RemoteFileNotFound(location.to_string()))
  }

  pub fn checksum(&self, location: &str) -> Option<&str> {
    self.by_location
      .get(location)
      .and_then(|e| e.sha1sum.as_deref())
      .filter(|s| !s.is_empty())
  }
}

/// What a sync pass has to do with the challenge's files.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilePlan {
  /// Remote locations to delete without replacement.
  pub delete: Vec<String>,
  /// Local files (relative paths) to upload.
  pub upload: Vec<String>,
  /// Remote location to delete, then local file to upload in its place.
  pub replace: Vec<(String, String)>,
}

impl FilePlan {
  pub fn is_empty(&self) -> bool {
    self.delete.is_empty() && self.upload.is_empty() && self.replace.is_empty()
  }
}

/// Decide per basename whether a file must be removed, uploaded, replaced
/// or left alone. Without a remote checksum the file is always replaced.
pub fn plan_files(
  dir: &Path,
  local: &BTreeMap<String, String>,
  remote: &BTreeMap<String, RemoteFile>,
  registry: &FileRegistry,
) -> Result<FilePlan> {
  let mut plan = FilePlan::default();

  for (name, rf) in remote {
    if !local.contains_key(name) {
      plan.delete.push(rf.location.clone());
    }
  }

  for (name, rel) in local {
    let Some(rf) = remote.get(name) else {
      plan.upload.push(rel.clone());
      continue;
    };
    if let Some(remote_sum) = registry.checksum(&rf.location) {
      let local_sum = sha1_file(&dir.join(rel))?;
      if local_sum == remote_sum {
        debug!(target: "files", file = %rel, "checksum unchanged, skipping");
        continue;
      }
    }
    plan.replace.push((rf.location.clone(), rel.clone()));
  }

  Ok(plan)
}

/// Applies file plans for one challenge.
pub struct FileSyncer<'a> {
  api: &'a RemoteClient,
  dir: &'a Path,
  challenge_id: i64,
}

impl<'a> FileSyncer<'a> {
  pub fn new(api: &'a RemoteClient, dir: &'a Path, challenge_id: i64) -> Self {
    Self { api, dir, challenge_id }
  }

  /// Upload every declared file in a single request (fresh challenges).
  #[instrument(level = "info", skip(self, files), fields(challenge_id = self.challenge_id, count = files.len()))]
  pub async fn create_all(&self, files: &[String]) -> Result<()> {
    if files.is_empty() {
      return Ok(());
    }
    let paths: Vec<PathBuf> = files.iter().map(|f| self.dir.join(f)).collect();
    self.api.upload_files(self.challenge_id, &paths).await?;
    info!(target: "files", count = files.len(), "uploaded challenge files");
    Ok(())
  }

  /// Converge the remote file set onto the declared one.
  #[instrument(level = "info", skip(self, files, remote_urls), fields(challenge_id = self.challenge_id))]
  pub async fn sync(&self, files: &[String], remote_urls: &[String]) -> Result<FilePlan> {
    let local = local_files(files);
    let remote = remote_files(remote_urls);
    if local.is_empty() && remote.is_empty() {
      return Ok(FilePlan::default());
    }

    let registry = FileRegistry::fetch(self.api).await?;
    let plan = plan_files(self.dir, &local, &remote, &registry)?;
    if plan.is_empty() {
      debug!(target: "files", "remote files already match");
      return Ok(plan);
    }

    // Resolve every delete before the first call.
    let delete_ids = plan
      .delete
      .iter()
      .map(|location| registry.require_id(location))
      .collect::<Result<Vec<_>>>()?;
    let replace_ids = plan
      .replace
      .iter()
      .map(|(location, rel)| Ok((registry.require_id(location)?, rel)))
      .collect::<Result<Vec<_>>>()?;

    for id in delete_ids {
      self.api.delete_file(id).await?;
    }
    for rel in &plan.upload {
      self.api.upload_files(self.challenge_id, &[self.dir.join(rel)]).await?;
    }
    for (id, rel) in replace_ids {
      self.api.delete_file(id).await?;
      self.api.upload_files(self.challenge_id, &[self.dir.join(rel)]).await?;
    }

    info!(
      target: "files",
      deleted = plan.delete.len(),
      uploaded = plan.upload.len(),
      replaced = plan.replace.len(),
      "file sync complete"
    );
    Ok(plan)
  }
}
