//! On-disk challenge documents (`challenge.yml`).
//!
//! Saving writes keys in a canonical order, drops default-valued keys,
//! appends unknown keys after the known ones and separates selected
//! top-level keys with a blank line. Multi-line text is written as a
//! literal block, long single-line text as a folded block.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::ChallengeSpec;
use crate::error::{Error, Result};
use crate::util::normalize_local_text;

/// File name of the document inside a challenge directory.
pub const DOCUMENT_NAME: &str = "challenge.yml";

const KEY_ORDER: &[&str] = &[
  "name", "author", "category", "description", "attribution", "value",
  "type", "extra", "image", "protocol", "host",
  "connection_info", "healthcheck", "attempts", "flags", "geo_flags",
  "files", "topics", "tags", "hints",
  "requirements", "next", "state", "version",
];

const KEYS_WITH_NEWLINE: &[&str] = &[
  "extra", "image", "attempts", "flags", "geo_flags", "topics", "tags",
  "files", "hints", "requirements", "state", "version",
];

const FOLD_AFTER: usize = 80;

/// Whether `value` is the default of `key`, making the key equivalent to
/// its absence. Every component that persists or compares documents goes
/// through this rule.
pub fn is_default(key: &str, value: &Value) -> bool {
  match key {
    "connection_info" | "next" => value.is_null(),
    "attempts" => value.as_u64() == Some(0),
    "state" => value.as_str() == Some("visible"),
    "type" => value.as_str() == Some("standard"),
    "tags" | "hints" | "topics" | "files" | "flags" => {
      value.as_array().is_some_and(Vec::is_empty)
    }
    "requirements" => match value {
      Value::Array(items) => items.is_empty(),
      Value::Object(obj) => {
        obj.get("prerequisites").and_then(Value::as_array).map_or(true, Vec::is_empty)
          && !obj.get("anonymize").and_then(Value::as_bool).unwrap_or(false)
      }
      _ => false,
    },
    _ => false,
  }
}

/// A loaded challenge document and where it lives.
#[derive(Clone, Debug)]
pub struct Document {
  pub path: PathBuf,
  pub spec: ChallengeSpec,
}

impl Document {
  pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
    let path = path.into();
    if !path.is_file() {
      return Err(Error::invalid(&path, "challenge file could not be found"));
    }
    let raw = std::fs::read_to_string(&path)?;
    let spec = parse(&raw).map_err(|message| Error::invalid(&path, message))?;
    debug!(target: "chalsync", path = %path.display(), name = %spec.name, "Loaded challenge document");
    Ok(Self { path, spec })
  }

  /// Directory the document's relative file paths are resolved against.
  pub fn dir(&self) -> &Path {
    self.path.parent().unwrap_or_else(|| Path::new("."))
  }

  pub fn save(&self) -> Result<()> {
    let text = render(&self.spec)?;
    std::fs::write(&self.path, text)?;
    debug!(target: "chalsync", path = %self.path.display(), "Saved challenge document");
    Ok(())
  }
}

fn parse(raw: &str) -> std::result::Result<ChallengeSpec, String> {
  let value: serde_yaml::Value = serde_yaml::from_str(raw).map_err(|e| format!("could not be loaded: {e}"))?;
  if !value.is_mapping() {
    return Err("document is either empty or not a mapping".into());
  }
  let mut spec: ChallengeSpec = serde_yaml::from_value(value).map_err(|e| format!("could not be loaded: {e}"))?;

  for text in [&mut spec.author, &mut spec.category, &mut spec.description, &mut spec.attribution] {
    if let Some(t) = text.as_mut() {
      *t = normalize_local_text(t);
    }
  }
  Ok(spec)
}

/// The document as a key -> value map, before ordering and elision.
pub fn to_map(spec: &ChallengeSpec) -> Result<Map<String, Value>> {
  match serde_json::to_value(spec)? {
    Value::Object(map) => Ok(map),
    _ => Ok(Map::new()),
  }
}

/// Render the document text per the save contract.
pub fn render(spec: &ChallengeSpec) -> Result<String> {
  let mut map = to_map(spec)?;
  let mut entries: Vec<(String, Value)> = Vec::with_capacity(map.len());
  for key in KEY_ORDER {
    if let Some(value) = map.remove(*key) {
      if !is_default(key, &value) {
        entries.push((key.to_string(), value));
      }
    }
  }
  entries.extend(map);

  let mut out = String::new();
  for (key, value) in entries {
    if !out.is_empty() && KEYS_WITH_NEWLINE.contains(&key.as_str()) {
      out.push('\n');
    }
    match value.as_str().and_then(|s| block_scalar(&key, s)) {
      Some(block) => out.push_str(&block),
      None => {
        let mut single = serde_yaml::Mapping::new();
        single.insert(serde_yaml::Value::from(key), serde_yaml::to_value(&value)?);
        out.push_str(&serde_yaml::to_string(&single)?);
      }
    }
  }
  Ok(out)
}

/// Literal block for multi-line text, folded block for long single lines.
/// `None` leaves the value to the regular YAML emitter.
fn block_scalar(key: &str, text: &str) -> Option<String> {
  if text.chars().any(|c| c.is_control() && c != '\n' && c != '\t') {
    return None;
  }
  if text.contains('\n') {
    let indicator = if text.starts_with(' ') { "|2-" } else { "|-" };
    let mut out = format!("{key}: {indicator}\n");
    for line in text.lines() {
      let line = line.trim_end();
      if !line.is_empty() {
        out.push_str("  ");
        out.push_str(line);
      }
      out.push('\n');
    }
    return Some(out);
  }
  if text.chars().count() > FOLD_AFTER && !text.starts_with(char::is_whitespace) {
    return Some(format!("{key}: >-\n  {}\n", text.trim_end()));
  }
  None
}
