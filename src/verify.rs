//! Read-only comparison of a local document against the remote challenge.
//! Neither side is ever modified.

use std::collections::BTreeSet;
use std::fmt;

use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::api::RemoteClient;
use crate::document::{is_default, to_map, Document};
use crate::domain::{ChallengeSpec, Field, IgnoreSet, Reference, Requirements};
use crate::error::{Error, Result};
use crate::files::{local_files, remote_files, sha1_file, validate_files, FileRegistry};
use crate::identity::Listing;
use crate::normalize::{normalize, Snapshot};

/// Outcome of a verification. The first failing check wins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
  Match,
  Mismatch { reason: String },
}

impl Verdict {
  fn mismatch(reason: impl Into<String>) -> Self {
    Verdict::Mismatch { reason: reason.into() }
  }

  pub fn is_match(&self) -> bool {
    matches!(self, Verdict::Match)
  }
}

impl fmt::Display for Verdict {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Verdict::Match => f.write_str("in sync"),
      Verdict::Mismatch { reason } => write!(f, "out of sync: {reason}"),
    }
  }
}

/// Collections the serializer drops when empty.
const LIST_KEYS: [&str; 4] = ["flags", "tags", "topics", "hints"];

#[instrument(level = "info", skip(api, doc, ignore), fields(name = %doc.spec.name))]
pub async fn verify(api: &RemoteClient, doc: &Document, ignore: &IgnoreSet) -> Result<Verdict> {
  if doc.spec.name.is_empty() {
    return Err(Error::invalid(&doc.path, "challenge does not provide a name"));
  }
  let listing = Listing::fetch(api).await?;
  let id = listing.require_id(&doc.spec.name)?;
  let snapshot = Snapshot::fetch(api, id, listing).await?;
  let remote = normalize(&snapshot);

  let mut verdict = compare(&doc.spec, &remote, &snapshot.listing, ignore)?;
  if verdict.is_match() && !ignore.contains(Field::Files) {
    verdict = compare_files(api, doc, snapshot.challenge.files()).await?;
  }

  match &verdict {
    Verdict::Match => info!(target: "chalsync", id, "Challenge is in sync"),
    Verdict::Mismatch { reason } => warn!(target: "chalsync", id, %reason, "Challenge is out of sync"),
  }
  Ok(verdict)
}

/// Field-by-field comparison of a document with normalized remote state.
///
/// Every field is checked unless ignored. A key absent on one side only
/// matches the key's default value on the other side. The current score of
/// a dynamic challenge is derived remotely, so it is only compared when the
/// document states one.
pub fn compare(local: &ChallengeSpec, remote: &ChallengeSpec, listing: &Listing, ignore: &IgnoreSet) -> Result<Verdict> {
  let local_map = to_map(&local.canonicalized())?;
  let remote_map = to_map(remote)?;

  for field in Field::ALL {
    if ignore.contains(field) || field == Field::Files {
      continue;
    }
    let key = field.key();
    let remote_value = remote_map.get(key).cloned().unwrap_or_else(|| absent_value(key));

    let Some(local_value) = local_map.get(key) else {
      if is_unset(key, &remote_value) || (field == Field::Value && local.is_dynamic()) {
        continue;
      }
      return Ok(Verdict::mismatch(format!("{key} is not in the local challenge")));
    };
    if *local_value == remote_value || (is_unset(key, local_value) && is_unset(key, &remote_value)) {
      continue;
    }

    let equivalent = match field {
      Field::Requirements => same_requirements(local.requirements.as_ref(), remote.requirements.as_ref(), listing),
      Field::Next => same_next(local.next.as_ref(), remote.next.as_ref(), listing),
      _ => false,
    };
    if !equivalent {
      return Ok(Verdict::mismatch(format!("{key} comparison failed")));
    }
  }
  Ok(Verdict::Match)
}

/// What a key the serializer left out stands for.
fn absent_value(key: &str) -> Value {
  if LIST_KEYS.contains(&key) {
    Value::Array(Vec::new())
  } else {
    Value::Null
  }
}

fn is_unset(key: &str, value: &Value) -> bool {
  value.is_null() || is_default(key, value)
}

/// Requirements match when both sides name the same set of challenges and
/// agree on `anonymize`.
fn same_requirements(local: Option<&Requirements>, remote: Option<&Requirements>, listing: &Listing) -> bool {
  let names = |r: Option<&Requirements>| -> BTreeSet<Reference> {
    r.map(|r| r.prerequisites().iter().map(|p| listing.canonical(p)).collect())
      .unwrap_or_default()
  };
  let anonymize = |r: Option<&Requirements>| r.is_some_and(Requirements::anonymize);
  names(local) == names(remote) && anonymize(local) == anonymize(remote)
}

fn same_next(local: Option<&Reference>, remote: Option<&Reference>, listing: &Listing) -> bool {
  local.map(|r| listing.canonical(r)) == remote.map(|r| listing.canonical(r))
}

async fn compare_files(api: &RemoteClient, doc: &Document, urls: &[String]) -> Result<Verdict> {
  match validate_files(doc.dir(), &doc.spec.files) {
    Ok(()) => {}
    Err(Error::FileNotFound(path)) => {
      return Ok(Verdict::mismatch(format!("file {} is missing locally", path.display())));
    }
    Err(e) => return Err(e),
  }

  let local = local_files(&doc.spec.files);
  let remote = remote_files(urls);
  if let Some(name) = local.keys().find(|n| !remote.contains_key(*n)) {
    return Ok(Verdict::mismatch(format!("{name} is not in the remote challenge")));
  }
  if let Some(name) = remote.keys().find(|n| !local.contains_key(*n)) {
    return Ok(Verdict::mismatch(format!("{name} is not in the local challenge")));
  }
  if remote.is_empty() {
    return Ok(Verdict::Match);
  }

  let registry = FileRegistry::fetch(api).await?;
  for (name, rf) in &remote {
    let path = doc.dir().join(&local[name]);
    let same = match registry.checksum(&rf.location) {
      Some(remote_sum) => sha1_file(&path)? == remote_sum,
      None => api.download(&rf.url).await? == std::fs::read(&path)?,
    };
    if !same {
      return Ok(Verdict::mismatch(format!("{name} content differs from the remote file")));
    }
  }
  Ok(Verdict::Match)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Flag, FlagSpec, RequirementSpec, State};
  use crate::protocol::ChallengeSummary;

  fn listing() -> Listing {
    Listing::new(vec![
      ChallengeSummary { id: 1, name: "Warmup".into() },
      ChallengeSummary { id: 2, name: "Target".into() },
    ])
  }

  fn remote() -> ChallengeSpec {
    ChallengeSpec {
      name: "Target".into(),
      category: Some("misc".into()),
      value: Some(100),
      kind: Some("standard".into()),
      attempts: Some(0),
      state: Some(State::Visible),
      flags: vec![Flag::Static("flag{x}".into())],
      requirements: Some(Requirements::Detailed(RequirementSpec {
        prerequisites: vec![Reference::Name("Warmup".into())],
        anonymize: false,
      })),
      ..Default::default()
    }
  }

  fn local(yaml: &str) -> ChallengeSpec {
    serde_yaml::from_str(yaml).unwrap()
  }

  const BASE: &str = "name: Target\ncategory: misc\nvalue: 100\nflags: ['flag{x}']\n";

  #[test]
  fn omitted_attempts_match_only_the_default() {
    let l = local(&format!("{BASE}requirements: [Warmup]\n"));
    assert!(compare(&l, &remote(), &listing(), &IgnoreSet::none()).unwrap().is_match());

    let mut r = remote();
    r.attempts = Some(3);
    let v = compare(&l, &r, &listing(), &IgnoreSet::none()).unwrap();
    assert_eq!(v, Verdict::Mismatch { reason: "attempts is not in the local challenge".into() });
    assert!(compare(&l, &r, &listing(), &"attempts".parse().unwrap()).unwrap().is_match());
  }

  #[test]
  fn requirements_compare_by_resolved_name() {
    let by_id = local(&format!("{BASE}requirements: [1]\n"));
    assert!(compare(&by_id, &remote(), &listing(), &IgnoreSet::none()).unwrap().is_match());

    let mut r = remote();
    r.requirements = Some(Requirements::Detailed(RequirementSpec {
      prerequisites: vec![Reference::Id(1)],
      anonymize: false,
    }));
    let by_name = local(&format!("{BASE}requirements: [Warmup]\n"));
    assert!(compare(&by_name, &r, &listing(), &IgnoreSet::none()).unwrap().is_match());

    let anonymized = local(&format!("{BASE}requirements: {{prerequisites: [Warmup], anonymize: true}}\n"));
    assert!(!compare(&anonymized, &r, &listing(), &IgnoreSet::none()).unwrap().is_match());
  }

  #[test]
  fn next_compares_by_resolved_name_and_flags_by_canonical_form() {
    let mut r = remote();
    r.next = Some(Reference::Name("Warmup".into()));
    let l = local(&format!("{BASE}requirements: [Warmup]\nnext: 1\n"));
    assert!(compare(&l, &r, &listing(), &IgnoreSet::none()).unwrap().is_match());

    let mut spelled_out = l.clone();
    spelled_out.flags = vec![Flag::Detailed(FlagSpec { content: "flag{x}".into(), kind: "static".into(), data: None })];
    assert!(compare(&spelled_out, &r, &listing(), &IgnoreSet::none()).unwrap().is_match());
  }

  #[test]
  fn keys_set_only_locally_are_mismatches() {
    let base = format!("{BASE}requirements: [Warmup]\n");
    for (extra, key) in [
      ("next: Warmup", "next"),
      ("connection_info: nc host 1337", "connection_info"),
      ("description: local only", "description"),
      ("category: web", "category"),
      ("attribution: someone", "attribution"),
    ] {
      let l = local(&format!("{}{extra}\n", base.replace("category: misc\n", "")));
      let mut r = remote();
      r.category = None;
      let v = compare(&l, &r, &listing(), &IgnoreSet::none()).unwrap();
      assert_eq!(v, Verdict::Mismatch { reason: format!("{key} comparison failed") }, "{extra}");
    }

    let mut r = remote();
    r.next = Some(Reference::Name("Target".into()));
    let l = local(&format!("{base}next: Warmup\n"));
    assert!(!compare(&l, &r, &listing(), &IgnoreSet::none()).unwrap().is_match());
  }

  #[test]
  fn dynamic_value_is_compared_only_when_stated() {
    let mut r = remote();
    r.kind = Some("dynamic".into());
    r.value = Some(480);
    let base = "name: Target\ncategory: misc\ntype: dynamic\nflags: ['flag{x}']\nrequirements: [Warmup]\n";
    assert!(compare(&local(base), &r, &listing(), &IgnoreSet::none()).unwrap().is_match());

    let stated = local(&format!("{base}value: 999\n"));
    assert_eq!(
      compare(&stated, &r, &listing(), &IgnoreSet::none()).unwrap(),
      Verdict::Mismatch { reason: "value comparison failed".into() }
    );
  }

  #[test]
  fn local_flags_are_detected_when_the_remote_has_none() {
    let mut r = remote();
    r.flags.clear();
    let l = local(&format!("{BASE}requirements: [Warmup]\n"));
    let v = compare(&l, &r, &listing(), &IgnoreSet::none()).unwrap();
    assert_eq!(v, Verdict::Mismatch { reason: "flags comparison failed".into() });
  }
}
