//! Name <-> id resolution for cross-challenge references.
//!
//! A `Listing` is a snapshot of the admin challenge listing taken by the
//! current operation. It is never cached across operations.

use tracing::warn;

use crate::api::RemoteClient;
use crate::domain::Reference;
use crate::error::{Error, Result};
use crate::protocol::ChallengeSummary;

#[derive(Clone, Debug, Default)]
pub struct Listing {
  challenges: Vec<ChallengeSummary>,
}

impl Listing {
  pub async fn fetch(api: &RemoteClient) -> Result<Self> {
    Ok(Self::new(api.list_challenges().await?))
  }

  pub fn new(challenges: Vec<ChallengeSummary>) -> Self {
    Self { challenges }
  }

  /// First challenge with exactly this name.
  pub fn lookup_id(&self, name: &str) -> Option<i64> {
    self.challenges.iter().find(|c| c.name == name).map(|c| c.id)
  }

  pub fn require_id(&self, name: &str) -> Result<i64> {
    self.lookup_id(name)
      .ok_or_else(|| Error::RemoteChallengeNotFound(format!("name '{name}'")))
  }

  pub fn name_of(&self, id: i64) -> Option<&str> {
    self.challenges.iter().find(|c| c.id == id).map(|c| c.name.as_str())
  }

  /// Resolve a reference to a remote id.
  ///
  /// Names are looked up; positive ids are trusted without an existence
  /// check. Unknown names, non-positive ids and references to `self_id` are
  /// dropped with a warning.
  pub fn resolve(&self, reference: &Reference, self_id: Option<i64>) -> Option<i64> {
    let id = match reference {
      Reference::Name(name) => match self.lookup_id(name) {
        Some(id) => id,
        None => {
          warn!(target: "chalsync", %reference, "Challenge id cannot be found, skipping reference");
          return None;
        }
      },
      Reference::Id(id) if *id > 0 => *id,
      Reference::Id(_) => {
        warn!(target: "chalsync", %reference, "Invalid challenge id, skipping reference");
        return None;
      }
    };

    if Some(id) == self_id {
      warn!(target: "chalsync", %reference, "Challenge cannot reference itself, skipping reference");
      return None;
    }
    Some(id)
  }

  /// Resolve prerequisites into a deduplicated, ascending id list.
  pub fn resolve_requirements(&self, refs: &[Reference], self_id: Option<i64>) -> Vec<i64> {
    let mut ids: Vec<i64> = refs.iter().filter_map(|r| self.resolve(r, self_id)).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
  }

  /// Prefer a name over an id; ids that match nothing stay numeric.
  pub fn canonical(&self, reference: &Reference) -> Reference {
    match reference {
      Reference::Id(id) => self
        .name_of(*id)
        .map(|name| Reference::Name(name.to_string()))
        .unwrap_or(Reference::Id(*id)),
      Reference::Name(_) => reference.clone(),
    }
  }
}
