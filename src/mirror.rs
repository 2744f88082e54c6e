//! Pull remote state into the local document (`mirror`), and `clone` a
//! remote challenge into a fresh directory.

use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use crate::api::RemoteClient;
use crate::document::Document;
use crate::domain::{ChallengeSpec, Field, IgnoreSet, Reference};
use crate::error::{Error, Result};
use crate::files::{local_files, remote_files};
use crate::identity::Listing;
use crate::normalize::{normalize, Snapshot};
use crate::scaffold;
use crate::util::{basename, slugify};

/// Default subdirectory for files that only exist remotely.
pub const DEFAULT_FILES_DIR: &str = "dist";

/// Overwrite the document with the remote state and save it.
///
/// Files present only remotely are downloaded into `files_dir`; files
/// already declared are downloaded over their declared path; declared files
/// missing remotely are dropped from the list but left on disk.
#[instrument(level = "info", skip(api, doc, ignore), fields(name = %doc.spec.name))]
pub async fn mirror(api: &RemoteClient, doc: &mut Document, ignore: &IgnoreSet, files_dir: &str) -> Result<()> {
  if doc.spec.name.is_empty() {
    return Err(Error::invalid(&doc.path, "challenge does not provide a name"));
  }
  let listing = Listing::fetch(api).await?;
  let id = listing.require_id(&doc.spec.name)?;
  let snapshot = Snapshot::fetch(api, id, listing).await?;
  let mut remote = normalize(&snapshot);

  if !ignore.contains(Field::Files) {
    remote.files = pull_files(api, doc, snapshot.challenge.files(), files_dir).await?;
  }

  apply(&mut doc.spec, &remote, ignore);
  doc.save()?;
  info!(target: "chalsync", id, path = %doc.path.display(), "Mirrored remote challenge");
  Ok(())
}

/// Copy every non-ignored field of `remote` into `local`.
pub fn apply(local: &mut ChallengeSpec, remote: &ChallengeSpec, ignore: &IgnoreSet) {
  for field in Field::ALL {
    if !ignore.contains(field) {
      local.copy_field(remote, field);
    }
  }
}

async fn pull_files(api: &RemoteClient, doc: &Document, urls: &[String], files_dir: &str) -> Result<Vec<String>> {
  let declared = local_files(&doc.spec.files);
  let remote = remote_files(urls);
  let mut files = doc.spec.files.clone();

  for (name, rf) in &remote {
    let bytes = api.download(&rf.url).await?;
    let target = match declared.get(name) {
      Some(rel) => doc.dir().join(rel),
      None => {
        let rel = format!("{files_dir}/{name}");
        let path = doc.dir().join(&rel);
        files.push(rel);
        path
      }
    };
    write_file(&target, &bytes)?;
  }

  // Soft delete: keep the bytes on disk, only forget the entry.
  files.retain(|f| remote.contains_key(basename(f)));
  Ok(files)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  std::fs::write(path, bytes)?;
  Ok(())
}

/// Scaffold `<root>/<category>/<name>` for a remote challenge and mirror it
/// there. Returns the mirrored document.
#[instrument(level = "info", skip(api, root))]
pub async fn clone_challenge(api: &RemoteClient, root: &Path, reference: &Reference, files_dir: &str) -> Result<Document> {
  let listing = Listing::fetch(api).await?;
  let id = match reference {
    Reference::Id(id) => *id,
    Reference::Name(name) => listing.require_id(name)?,
  };
  let remote = api.get_challenge(id).await?;

  let mut dir: PathBuf = root.to_path_buf();
  if let Some(category) = remote.category.as_deref().filter(|c| !c.trim().is_empty()) {
    dir.push(slugify(category));
  }
  dir.push(slugify(&remote.name));

  let path = scaffold::materialize(&dir, &remote.name)?;
  let mut doc = Document::load(path)?;
  mirror(api, &mut doc, &IgnoreSet::none(), files_dir).await?;
  Ok(doc)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::State;

  #[test]
  fn apply_respects_ignore_set_and_optional_groups() {
    let mut local = ChallengeSpec {
      name: "c".into(),
      value: Some(100),
      tags: vec!["keep".into()],
      extra: Some(serde_json::Map::new()),
      state: Some(State::Hidden),
      ..Default::default()
    };
    let remote = ChallengeSpec {
      name: "c".into(),
      value: Some(250),
      tags: vec!["remote".into()],
      state: Some(State::Visible),
      attempts: Some(4),
      ..Default::default()
    };
    apply(&mut local, &remote, &"tags".parse().unwrap());

    assert_eq!(local.tags, vec!["keep".to_string()]);
    assert_eq!(local.value, Some(250));
    assert!(local.extra.is_some());
    assert_eq!(local.state, Some(State::Visible));
    assert_eq!(local.attempts, Some(4));
  }
}
