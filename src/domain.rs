//! Domain model of a challenge document: the challenge itself, its polymorphic
//! entries (flags, hints, requirement references) and the field selectors
//! used by ignore-sets.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

/// Challenge type that lets `value` be omitted.
pub const DYNAMIC_TYPE: &str = "dynamic";
pub const STANDARD_TYPE: &str = "standard";

/// Visibility of a challenge on the platform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
  #[default]
  Visible,
  Hidden,
}

impl State {
  pub fn as_str(self) -> &'static str {
    match self {
      State::Visible => "visible",
      State::Hidden => "hidden",
    }
  }
}

/// A link to another challenge: a trusted remote id or a name to look up.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reference {
  Id(i64),
  Name(String),
}

impl fmt::Display for Reference {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Reference::Id(id) => write!(f, "#{id}"),
      Reference::Name(name) => write!(f, "\"{name}\""),
    }
  }
}

/// A flag entry. A bare string is a static flag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Flag {
  Static(String),
  Detailed(FlagSpec),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagSpec {
  pub content: String,
  #[serde(rename = "type", default = "static_flag_type")]
  pub kind: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data: Option<String>,
}

fn static_flag_type() -> String {
  "static".into()
}

impl Flag {
  pub fn content(&self) -> &str {
    match self {
      Flag::Static(content) => content,
      Flag::Detailed(spec) => &spec.content,
    }
  }

  pub fn kind(&self) -> &str {
    match self {
      Flag::Static(_) => "static",
      Flag::Detailed(spec) => &spec.kind,
    }
  }

  pub fn data(&self) -> Option<&str> {
    match self {
      Flag::Static(_) => None,
      Flag::Detailed(spec) => spec.data.as_deref().filter(|d| !d.is_empty()),
    }
  }

  /// Collapse a static flag without auxiliary data to its bare form.
  pub fn canonical(&self) -> Flag {
    if self.kind() == "static" && self.data().is_none() {
      return Flag::Static(self.content().to_string());
    }
    Flag::Detailed(FlagSpec {
      content: self.content().to_string(),
      kind: self.kind().to_string(),
      data: self.data().map(str::to_string),
    })
  }
}

/// A hint entry. A bare string is a free hint without a title.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Hint {
  Plain(String),
  Detailed(HintSpec),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HintSpec {
  pub content: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cost: Option<i64>,
}

impl Hint {
  pub fn content(&self) -> &str {
    match self {
      Hint::Plain(content) => content,
      Hint::Detailed(spec) => &spec.content,
    }
  }

  pub fn title(&self) -> &str {
    match self {
      Hint::Plain(_) => "",
      Hint::Detailed(spec) => spec.title.as_deref().unwrap_or(""),
    }
  }

  pub fn cost(&self) -> i64 {
    match self {
      Hint::Plain(_) => 0,
      Hint::Detailed(spec) => spec.cost.unwrap_or(0),
    }
  }

  /// A free, untitled hint collapses to its bare form.
  pub fn canonical(&self) -> Hint {
    if self.cost() == 0 && self.title().is_empty() {
      return Hint::Plain(self.content().to_string());
    }
    Hint::Detailed(HintSpec {
      content: self.content().to_string(),
      title: Some(self.title().to_string()).filter(|t| !t.is_empty()),
      cost: Some(self.cost()),
    })
  }
}

/// Prerequisites, either as a bare list or with the anonymize switch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Requirements {
  List(Vec<Reference>),
  Detailed(RequirementSpec),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementSpec {
  #[serde(default)]
  pub prerequisites: Vec<Reference>,
  #[serde(default)]
  pub anonymize: bool,
}

impl Requirements {
  pub fn prerequisites(&self) -> &[Reference] {
    match self {
      Requirements::List(refs) => refs,
      Requirements::Detailed(spec) => &spec.prerequisites,
    }
  }

  pub fn anonymize(&self) -> bool {
    match self {
      Requirements::List(_) => false,
      Requirements::Detailed(spec) => spec.anonymize,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.prerequisites().is_empty() && !self.anonymize()
  }
}

/// The declarative challenge document.
///
/// Keys the tool does not model (`protocol`, `host`, `healthcheck`,
/// `version`, custom ones) are kept in `other` and written back on save.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChallengeSpec {
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub author: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub attribution: Option<String>,
  #[serde(default, deserialize_with = "score_value", skip_serializing_if = "Option::is_none")]
  pub value: Option<i64>,
  #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
  pub kind: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub extra: Option<Map<String, Value>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub image: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub connection_info: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub attempts: Option<u32>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub flags: Vec<Flag>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub geo_flags: Option<Map<String, Value>>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub files: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub topics: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub tags: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub hints: Vec<Hint>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub requirements: Option<Requirements>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub next: Option<Reference>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub state: Option<State>,
  #[serde(flatten)]
  pub other: Map<String, Value>,
}

/// Accept `value: 100` as well as `value: "100"`.
fn score_value<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Raw {
    Int(i64),
    Text(String),
  }

  match Option::<Raw>::deserialize(deserializer)? {
    None => Ok(None),
    Some(Raw::Int(v)) => Ok(Some(v)),
    Some(Raw::Text(s)) if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) => s
      .parse()
      .map(Some)
      .map_err(serde::de::Error::custom),
    Some(Raw::Text(s)) => Err(serde::de::Error::custom(format!("value '{s}' is not an integer"))),
  }
}

impl ChallengeSpec {
  pub fn kind(&self) -> &str {
    self.kind.as_deref().unwrap_or(STANDARD_TYPE)
  }

  pub fn is_dynamic(&self) -> bool {
    self.kind() == DYNAMIC_TYPE
  }

  pub fn state(&self) -> State {
    self.state.unwrap_or_default()
  }

  pub fn attempts(&self) -> u32 {
    self.attempts.unwrap_or(0)
  }

  /// Overwrite one field with the value `source` holds for it.
  ///
  /// `extra` and `geo_flags` are only taken when `source` has them; the
  /// platform omits them for challenge types without decay or geo data.
  pub fn copy_field(&mut self, source: &ChallengeSpec, field: Field) {
    match field {
      Field::Name => self.name = source.name.clone(),
      Field::Category => self.category = source.category.clone(),
      Field::Description => self.description = source.description.clone(),
      Field::Attribution => self.attribution = source.attribution.clone(),
      Field::Value => self.value = source.value,
      Field::Type => self.kind = source.kind.clone(),
      Field::Extra if source.extra.is_some() => self.extra = source.extra.clone(),
      Field::ConnectionInfo => self.connection_info = source.connection_info.clone(),
      Field::Attempts => self.attempts = source.attempts,
      Field::Flags => self.flags = source.flags.clone(),
      Field::GeoFlags if source.geo_flags.is_some() => self.geo_flags = source.geo_flags.clone(),
      Field::Files => self.files = source.files.clone(),
      Field::Topics => self.topics = source.topics.clone(),
      Field::Tags => self.tags = source.tags.clone(),
      Field::Hints => self.hints = source.hints.clone(),
      Field::Requirements => self.requirements = source.requirements.clone(),
      Field::Next => self.next = source.next.clone(),
      Field::State => self.state = source.state,
      Field::Extra | Field::GeoFlags => {}
    }
  }

  /// Same document with flags and hints in their collapsed forms, so that
  /// equivalent spellings compare equal.
  pub fn canonicalized(&self) -> ChallengeSpec {
    let mut spec = self.clone();
    spec.flags = self.flags.iter().map(Flag::canonical).collect();
    spec.hints = self.hints.iter().map(Hint::canonical).collect();
    spec
  }
}

/// Selector for one document key, used to build ignore-sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
  Name,
  Category,
  Description,
  Attribution,
  Value,
  Type,
  Extra,
  ConnectionInfo,
  Attempts,
  Flags,
  GeoFlags,
  Files,
  Topics,
  Tags,
  Hints,
  Requirements,
  Next,
  State,
}

impl Field {
  pub const ALL: [Field; 18] = [
    Field::Name,
    Field::Category,
    Field::Description,
    Field::Attribution,
    Field::Value,
    Field::Type,
    Field::Extra,
    Field::ConnectionInfo,
    Field::Attempts,
    Field::Flags,
    Field::GeoFlags,
    Field::Files,
    Field::Topics,
    Field::Tags,
    Field::Hints,
    Field::Requirements,
    Field::Next,
    Field::State,
  ];

  /// Document key of this field.
  pub fn key(self) -> &'static str {
    match self {
      Field::Name => "name",
      Field::Category => "category",
      Field::Description => "description",
      Field::Attribution => "attribution",
      Field::Value => "value",
      Field::Type => "type",
      Field::Extra => "extra",
      Field::ConnectionInfo => "connection_info",
      Field::Attempts => "attempts",
      Field::Flags => "flags",
      Field::GeoFlags => "geo_flags",
      Field::Files => "files",
      Field::Topics => "topics",
      Field::Tags => "tags",
      Field::Hints => "hints",
      Field::Requirements => "requirements",
      Field::Next => "next",
      Field::State => "state",
    }
  }

  pub fn from_key(key: &str) -> Option<Field> {
    Field::ALL.into_iter().find(|f| f.key() == key)
  }
}

impl fmt::Display for Field {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.key())
  }
}

impl FromStr for Field {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Field::from_key(s.trim()).ok_or_else(|| Error::UnknownField(s.trim().to_string()))
  }
}

/// Fields excluded from one create/sync/mirror/verify invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IgnoreSet(BTreeSet<Field>);

impl IgnoreSet {
  pub fn none() -> Self {
    Self::default()
  }

  pub fn contains(&self, field: Field) -> bool {
    self.0.contains(&field)
  }

  pub fn insert(&mut self, field: Field) {
    self.0.insert(field);
  }

  pub fn iter(&self) -> impl Iterator<Item = Field> + '_ {
    self.0.iter().copied()
  }
}

impl FromIterator<Field> for IgnoreSet {
  fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}

impl FromStr for IgnoreSet {
  type Err = Error;

  /// Parse a comma separated list such as `flags,files`.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    s.split(',')
      .filter(|part| !part.trim().is_empty())
      .map(str::parse::<Field>)
      .collect()
  }
}
