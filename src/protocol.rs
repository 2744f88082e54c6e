//! Wire structs for the platform's `/api/v1` resources (serde ready).
//! Responses are wrapped in `{ "success": bool, "data": ... }` envelopes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::State;

#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
  pub data: T,
}

/// Entry of the admin challenge listing.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ChallengeSummary {
  pub id: i64,
  pub name: String,
}

/// Full admin view of one challenge.
#[derive(Clone, Debug, Deserialize)]
pub struct RemoteChallenge {
  pub id: i64,
  pub name: String,
  #[serde(default)]
  pub category: Option<String>,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub attribution: Option<String>,
  #[serde(default)]
  pub value: Option<i64>,
  #[serde(rename = "type", default)]
  pub kind: Option<String>,
  #[serde(default)]
  pub state: Option<State>,
  #[serde(default)]
  pub connection_info: Option<String>,
  #[serde(default)]
  pub max_attempts: Option<u32>,
  #[serde(default)]
  pub next_id: Option<i64>,
  #[serde(default)]
  pub files: Option<Vec<String>>,
  /// Type-specific keys (`initial`, `decay`, `latitude`, ...).
  #[serde(flatten)]
  pub rest: Map<String, Value>,
}

impl RemoteChallenge {
  pub fn files(&self) -> &[String] {
    self.files.as_deref().unwrap_or(&[])
  }
}

#[derive(Clone, Debug, Deserialize)]
pub struct RemoteFlag {
  pub id: i64,
  pub content: String,
  #[serde(rename = "type")]
  pub kind: String,
  #[serde(default)]
  pub data: Option<String>,
}

/// Tags and topics share the `{id, value}` shape.
#[derive(Clone, Debug, Deserialize)]
pub struct RemoteLabel {
  pub id: i64,
  pub value: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RemoteHint {
  pub id: i64,
  #[serde(default)]
  pub content: Option<String>,
  #[serde(default)]
  pub title: Option<String>,
  #[serde(default)]
  pub cost: i64,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct RemoteRequirements {
  #[serde(default)]
  pub prerequisites: Vec<i64>,
  #[serde(default)]
  pub anonymize: bool,
}

/// Entry of the challenge file registry.
#[derive(Clone, Debug, Deserialize)]
pub struct RemoteFileEntry {
  pub id: i64,
  pub location: String,
  /// Only reported by newer platform versions.
  #[serde(default)]
  pub sha1sum: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Created {
  pub id: i64,
}

// --- Payloads ---

#[derive(Debug, Serialize)]
pub struct FlagPayload<'a> {
  pub challenge_id: i64,
  pub content: &'a str,
  #[serde(rename = "type")]
  pub kind: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub data: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct TagPayload<'a> {
  pub challenge_id: i64,
  pub value: &'a str,
}

#[derive(Debug, Serialize)]
pub struct TopicPayload<'a> {
  pub challenge_id: i64,
  pub value: &'a str,
  #[serde(rename = "type")]
  pub kind: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HintPayload<'a> {
  pub challenge_id: i64,
  pub content: &'a str,
  pub title: &'a str,
  pub cost: i64,
}

#[derive(Debug, Serialize)]
pub struct RequirementsPatch {
  pub requirements: RemoteRequirements,
}

/// `next_id: null` clears the link.
#[derive(Debug, Serialize)]
pub struct NextPatch {
  pub next_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct StatePatch {
  pub state: State,
}

/// Try to extract a readable message from a platform error body.
pub fn extract_error_message(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Option<Value>,
  }
  let parsed = serde_json::from_str::<ErrorBody>(body).ok()?;
  match (parsed.message, parsed.errors) {
    (Some(m), _) => Some(m),
    (None, Some(errors)) => Some(errors.to_string()),
    (None, None) => None,
  }
}
