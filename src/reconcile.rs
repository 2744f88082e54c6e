//! Drive the platform to match a local document (`create` and `sync`).
//!
//! The platform has no update for sub-resources, so each field group is
//! converged by deleting what is there and recreating it from the
//! document, in a fixed order:
//!
//!   scalars (state forced to hidden) -> flags -> topics -> tags -> files
//!   -> hints -> requirements -> next -> state restored to visible
//!
//! Validation happens before the first mutating call. After that, any
//! failed call aborts the run and leaves the remote partially updated; a
//! later sync completes the convergence.

use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use crate::api::RemoteClient;
use crate::document::Document;
use crate::domain::{ChallengeSpec, Field, Flag, IgnoreSet, State};
use crate::error::{Error, Result};
use crate::files::{validate_files, FileSyncer};
use crate::identity::Listing;
use crate::protocol::*;

/// Text fields whose ignored value is taken from somewhere other than the
/// document.
const RESETTABLE_TEXT: [Field; 3] = [Field::Category, Field::Description, Field::Attribution];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
  Create,
  Sync,
}

pub struct Reconciler<'a> {
  api: &'a RemoteClient,
  doc: &'a Document,
  ignore: &'a IgnoreSet,
}

impl<'a> Reconciler<'a> {
  pub fn new(api: &'a RemoteClient, doc: &'a Document, ignore: &'a IgnoreSet) -> Self {
    Self { api, doc, ignore }
  }

  fn spec(&self) -> &ChallengeSpec {
    &self.doc.spec
  }

  fn wants(&self, field: Field) -> bool {
    !self.ignore.contains(field)
  }

  /// Checks that must pass before anything remote is touched.
  fn preflight(&self, mode: Mode) -> Result<()> {
    let spec = self.spec();
    let fixed: &[Field] = match mode {
      Mode::Create => &[Field::Name, Field::Value],
      Mode::Sync => &[Field::Name],
    };
    for field in fixed {
      if self.ignore.contains(*field) {
        warn!(target: "chalsync", %field, ?mode, "Field cannot be ignored, proceeding without ignoring it");
      }
    }

    if spec.name.is_empty() {
      return Err(Error::invalid(&self.doc.path, "challenge does not provide a name"));
    }
    if mode == Mode::Create && spec.value.is_none() && !spec.is_dynamic() {
      return Err(Error::invalid(&self.doc.path, "challenge does not provide a value"));
    }
    if !spec.files.is_empty() && self.wants(Field::Files) {
      validate_files(self.doc.dir(), &spec.files)?;
    }
    Ok(())
  }

  /// Scalar payload shared by create and sync. The challenge stays hidden
  /// until every field group is in place.
  pub fn base_payload(&self) -> Map<String, Value> {
    let spec = self.spec();
    let mut payload = Map::new();
    payload.insert("name".into(), spec.name.clone().into());
    payload.insert("category".into(), spec.category.clone().unwrap_or_default().into());
    payload.insert("description".into(), spec.description.clone().unwrap_or_default().into());
    payload.insert("attribution".into(), spec.attribution.clone().unwrap_or_default().into());
    payload.insert("type".into(), spec.kind().into());
    payload.insert("state".into(), State::Hidden.as_str().into());

    if let Some(value) = spec.value {
      payload.insert("value".into(), value.into());
    }
    if self.wants(Field::Attempts) {
      payload.insert("max_attempts".into(), spec.attempts().into());
    }
    if self.wants(Field::ConnectionInfo) {
      payload.insert("connection_info".into(), spec.connection_info.clone().into());
    }
    if self.wants(Field::Extra) {
      if let Some(extra) = &spec.extra {
        payload.extend(extra.clone());
      }
    }
    if self.wants(Field::GeoFlags) {
      if let Some(geo) = &spec.geo_flags {
        payload.extend(geo.clone());
      }
    }
    payload
  }

  /// Create the challenge and every field group from scratch. Returns the
  /// new remote id.
  #[instrument(level = "info", skip(self), fields(name = %self.spec().name))]
  pub async fn create(&self) -> Result<i64> {
    self.preflight(Mode::Create)?;
    let spec = self.spec();

    let mut payload = self.base_payload();
    for field in RESETTABLE_TEXT {
      if self.ignore.contains(field) {
        payload.insert(field.key().into(), "".into());
      }
    }

    let id = self.api.create_challenge(&payload).await?;
    info!(target: "chalsync", id, "Created challenge");

    if self.wants(Field::Flags) {
      self.create_flags(id).await?;
    }
    if self.wants(Field::Topics) {
      self.create_topics(id).await?;
    }
    if self.wants(Field::Tags) {
      self.create_tags(id).await?;
    }
    if self.wants(Field::Files) && !spec.files.is_empty() {
      FileSyncer::new(self.api, self.doc.dir(), id).create_all(&spec.files).await?;
    }
    if self.wants(Field::Hints) {
      self.create_hints(id).await?;
    }

    let links_requirements = self.wants(Field::Requirements)
      && spec.requirements.as_ref().is_some_and(|r| !r.is_empty());
    let links_next = self.wants(Field::Next);
    if links_requirements || links_next {
      let listing = Listing::fetch(self.api).await?;
      if links_requirements {
        self.set_requirements(id, &listing).await?;
      }
      if links_next {
        self.set_next(id, &listing).await?;
      }
    }

    // Ignoring the state on creation falls back to the default: visible.
    if spec.state() == State::Visible || self.ignore.contains(Field::State) {
      self.reveal(id).await?;
    }
    Ok(id)
  }

  /// Update an existing challenge, found by exact name, to match the
  /// document. Returns its remote id.
  #[instrument(level = "info", skip(self), fields(name = %self.spec().name))]
  pub async fn sync(&self) -> Result<i64> {
    self.preflight(Mode::Sync)?;
    let spec = self.spec();

    let listing = Listing::fetch(self.api).await?;
    let id = listing.require_id(&spec.name)?;
    let remote = self.api.get_challenge(id).await?;

    let mut payload = self.base_payload();
    let from_remote = |text: &Option<String>| text.clone().map(Value::from).unwrap_or_else(|| "".into());
    for field in self.ignore.iter() {
      let current = match field {
        Field::Value => remote.value.map(Value::from),
        Field::Type => remote.kind.clone().map(Value::from),
        Field::Category => Some(from_remote(&remote.category)),
        Field::Description => Some(from_remote(&remote.description)),
        Field::Attribution => Some(from_remote(&remote.attribution)),
        _ => continue,
      };
      match current {
        Some(v) => payload.insert(field.key().into(), v),
        None => payload.remove(field.key()),
      };
    }

    self.api.patch_challenge(id, &payload).await?;
    info!(target: "chalsync", id, "Updated challenge scalars");

    if self.wants(Field::Flags) {
      for flag in self.api.challenge_flags(id).await? {
        self.api.delete_flag(flag.id).await?;
      }
      self.create_flags(id).await?;
    }
    if self.wants(Field::Topics) {
      for topic in self.api.challenge_topics(id).await? {
        self.api.delete_topic(topic.id).await?;
      }
      self.create_topics(id).await?;
    }
    if self.wants(Field::Tags) {
      for tag in self.api.challenge_tags(id).await? {
        self.api.delete_tag(tag.id).await?;
      }
      self.create_tags(id).await?;
    }
    if self.wants(Field::Files) {
      FileSyncer::new(self.api, self.doc.dir(), id).sync(&spec.files, remote.files()).await?;
    }
    if self.wants(Field::Hints) {
      for hint in self.api.challenge_hints(id).await? {
        self.api.delete_hint(hint.id).await?;
      }
      self.create_hints(id).await?;
    }
    // Always patched so that removing requirements locally clears them remotely.
    if self.wants(Field::Requirements) {
      self.set_requirements(id, &listing).await?;
    }
    if self.wants(Field::Next) {
      self.set_next(id, &listing).await?;
    }

    let make_visible = if self.wants(Field::State) {
      spec.state() == State::Visible
    } else {
      remote.state.unwrap_or_default() == State::Visible
    };
    if make_visible {
      self.reveal(id).await?;
    }
    Ok(id)
  }

  async fn create_flags(&self, id: i64) -> Result<()> {
    for flag in &self.spec().flags {
      let payload = match flag {
        Flag::Static(content) => FlagPayload { challenge_id: id, content, kind: "static", data: None },
        Flag::Detailed(f) => FlagPayload {
          challenge_id: id,
          content: &f.content,
          kind: &f.kind,
          data: f.data.as_deref(),
        },
      };
      self.api.create_flag(&payload).await?;
    }
    Ok(())
  }

  async fn create_topics(&self, id: i64) -> Result<()> {
    for topic in &self.spec().topics {
      self.api
        .create_topic(&TopicPayload { challenge_id: id, value: topic, kind: "challenge" })
        .await?;
    }
    Ok(())
  }

  async fn create_tags(&self, id: i64) -> Result<()> {
    for tag in &self.spec().tags {
      self.api.create_tag(&TagPayload { challenge_id: id, value: tag }).await?;
    }
    Ok(())
  }

  async fn create_hints(&self, id: i64) -> Result<()> {
    for hint in &self.spec().hints {
      let payload = HintPayload {
        challenge_id: id,
        content: hint.content(),
        title: hint.title(),
        cost: hint.cost(),
      };
      self.api.create_hint(&payload).await?;
    }
    Ok(())
  }

  async fn set_requirements(&self, id: i64, listing: &Listing) -> Result<()> {
    let (refs, anonymize) = match &self.spec().requirements {
      Some(r) => (r.prerequisites(), r.anonymize()),
      None => (&[][..], false),
    };
    let prerequisites = listing.resolve_requirements(refs, Some(id));
    info!(target: "chalsync", id, ?prerequisites, anonymize, "Setting requirements");
    let patch = RequirementsPatch {
      requirements: RemoteRequirements { prerequisites, anonymize },
    };
    self.api.patch_challenge(id, &patch).await
  }

  async fn set_next(&self, id: i64, listing: &Listing) -> Result<()> {
    let next_id = self.spec().next.as_ref().and_then(|r| listing.resolve(r, Some(id)));
    self.api.patch_challenge(id, &NextPatch { next_id }).await
  }

  async fn reveal(&self, id: i64) -> Result<()> {
    self.api.patch_challenge(id, &StatePatch { state: State::Visible }).await
  }
}
