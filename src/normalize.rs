//! Conversion of remote challenge state into the document's shape.
//!
//! `Snapshot::fetch` performs the remote reads; `normalize` is a pure
//! function over the snapshot. Files are left out on purpose: whether they
//! get downloaded or only compared depends on the operation.

use serde_json::Map;
use tracing::instrument;

use crate::api::RemoteClient;
use crate::domain::{ChallengeSpec, Flag, FlagSpec, Hint, HintSpec, RequirementSpec, Requirements, Reference, State, STANDARD_TYPE};
use crate::error::Result;
use crate::identity::Listing;
use crate::protocol::{RemoteChallenge, RemoteFlag, RemoteHint, RemoteLabel, RemoteRequirements};
use crate::util::normalize_remote_text;

const DECAY_KEYS: [&str; 3] = ["initial", "decay", "minimum"];
const GEO_KEYS: [&str; 3] = ["latitude", "longitude", "tolerance_radius"];

/// Everything the platform knows about one challenge, read in one pass.
#[derive(Clone, Debug)]
pub struct Snapshot {
  pub challenge: RemoteChallenge,
  pub flags: Vec<RemoteFlag>,
  pub tags: Vec<RemoteLabel>,
  pub hints: Vec<RemoteHint>,
  pub topics: Vec<RemoteLabel>,
  pub requirements: RemoteRequirements,
  pub listing: Listing,
}

impl Snapshot {
  #[instrument(level = "debug", skip(api, listing))]
  pub async fn fetch(api: &RemoteClient, id: i64, listing: Listing) -> Result<Self> {
    Ok(Self {
      challenge: api.get_challenge(id).await?,
      flags: api.challenge_flags(id).await?,
      tags: api.challenge_tags(id).await?,
      hints: api.challenge_hints(id).await?,
      topics: api.challenge_topics(id).await?,
      requirements: api.challenge_requirements(id).await?,
      listing,
    })
  }
}

fn text(raw: Option<&str>) -> Option<String> {
  raw.map(normalize_remote_text).filter(|t| !t.is_empty())
}

pub fn normalize_flag(flag: &RemoteFlag) -> Flag {
  let data = flag.data.as_deref().filter(|d| !d.is_empty());
  if flag.kind == "static" && data.is_none() {
    return Flag::Static(flag.content.clone());
  }
  Flag::Detailed(FlagSpec {
    content: flag.content.trim().replace("\r\n", "\n"),
    kind: flag.kind.clone(),
    data: data.map(str::to_string),
  })
}

pub fn normalize_hint(hint: &RemoteHint) -> Hint {
  let content = hint.content.clone().unwrap_or_default();
  let title = hint.title.clone().filter(|t| !t.is_empty());
  if hint.cost == 0 && title.is_none() {
    return Hint::Plain(content);
  }
  Hint::Detailed(HintSpec { content, title, cost: Some(hint.cost) })
}

/// Remote challenge -> document shape, with ids replaced by names where
/// the listing knows them.
pub fn normalize(snapshot: &Snapshot) -> ChallengeSpec {
  let ch = &snapshot.challenge;
  let kind = ch.kind.clone().unwrap_or_else(|| STANDARD_TYPE.to_string());

  let lift = |keys: &[&str]| {
    let picked: Map<_, _> = keys
      .iter()
      .filter_map(|k| ch.rest.get(*k).map(|v| (k.to_string(), v.clone())))
      .collect();
    Some(picked).filter(|m| !m.is_empty())
  };

  let requirements = RequirementSpec {
    prerequisites: snapshot
      .requirements
      .prerequisites
      .iter()
      .map(|id| snapshot.listing.canonical(&Reference::Id(*id)))
      .collect(),
    anonymize: snapshot.requirements.anonymize,
  };

  ChallengeSpec {
    name: ch.name.clone(),
    category: text(ch.category.as_deref()),
    description: text(ch.description.as_deref()),
    attribution: text(ch.attribution.as_deref()),
    value: ch.value,
    kind: Some(kind),
    extra: lift(&DECAY_KEYS[..]),
    connection_info: ch.connection_info.clone().filter(|c| !c.is_empty()),
    attempts: Some(ch.max_attempts.unwrap_or(0)),
    flags: snapshot.flags.iter().map(normalize_flag).collect(),
    geo_flags: lift(&GEO_KEYS[..]),
    tags: snapshot.tags.iter().map(|t| t.value.clone()).collect(),
    topics: snapshot.topics.iter().map(|t| t.value.clone()).collect(),
    hints: snapshot.hints.iter().map(normalize_hint).collect(),
    requirements: Some(Requirements::Detailed(requirements)),
    next: ch
      .next_id
      .filter(|id| *id > 0)
      .map(|id| snapshot.listing.canonical(&Reference::Id(id))),
    state: Some(ch.state.unwrap_or(State::Visible)),
    ..Default::default()
  }
}
