//! Static checks over a challenge directory. Nothing remote is involved.

use std::path::Path;

use tracing::debug;

use crate::document::Document;
use crate::error::{Error, LintIssues, Result};

pub const DEFAULT_FLAG_FORMAT: &str = "flag{";

/// Shortest printable run reported by the strings scan.
const MIN_STRING_LEN: usize = 4;

/// Run every check and fail with the full issue map if anything is off.
pub fn lint(doc: &Document, flag_format: &str) -> Result<()> {
  let issues = collect_issues(doc, flag_format);
  if issues.values().any(|v| !v.is_empty()) {
    return Err(Error::Lint { issues });
  }
  debug!(target: "chalsync", path = %doc.path.display(), "Lint passed");
  Ok(())
}

pub fn collect_issues(doc: &Document, flag_format: &str) -> LintIssues {
  let mut issues = LintIssues::new();
  for category in ["fields", "dockerfile", "files"] {
    issues.insert(category.to_string(), Vec::new());
  }
  let spec = &doc.spec;
  let dir = doc.dir();

  let required = [
    ("name", !spec.name.is_empty()),
    ("author", spec.author.is_some()),
    ("category", spec.category.is_some()),
    ("description", spec.description.is_some()),
    ("attribution", spec.attribution.is_some()),
    ("value", spec.value.is_some() || spec.is_dynamic()),
  ];
  for (field, present) in required {
    if !present {
      push(&mut issues, "fields", format!("challenge.yml is missing required field: {field}"));
    }
  }

  let dockerfile = dir.join("Dockerfile");
  let image = spec.image.as_deref();
  if dockerfile.is_file() && image != Some(".") {
    push(&mut issues, "dockerfile", "Dockerfile exists but image field does not point to it".into());
  }
  if image == Some(".") {
    match std::fs::read_to_string(&dockerfile) {
      Ok(source) if !source.contains("EXPOSE") => {
        push(&mut issues, "dockerfile", "Dockerfile is missing EXPOSE".into());
      }
      Ok(_) => {}
      Err(_) => push(&mut issues, "dockerfile", "Dockerfile specified in 'image' field but no Dockerfile found".into()),
    }
  }

  for file in &spec.files {
    let path = dir.join(file);
    if !path.is_file() {
      push(&mut issues, "files", format!("Challenge file '{file}' specified, but not found at {}", path.display()));
      continue;
    }
    let runs = match strings(&path) {
      Ok(runs) => runs,
      Err(e) => {
        push(&mut issues, "files", format!("Challenge file '{file}' could not be read: {e}"));
        continue;
      }
    };
    for s in runs {
      if s.contains(flag_format) {
        push(&mut issues, "files", format!("Potential flag found in distributed file '{file}':\n {}", s.trim()));
      }
    }
  }

  issues
}

fn push(issues: &mut LintIssues, category: &str, message: String) {
  issues.entry(category.to_string()).or_default().push(message);
}

/// Printable ASCII runs of a file, like `strings(1)`.
fn strings(path: &Path) -> std::io::Result<Vec<String>> {
  let bytes = std::fs::read(path)?;
  let mut out = Vec::new();
  let mut current = String::new();
  for b in bytes {
    if b == b'\t' || (0x20..0x7f).contains(&b) {
      current.push(b as char);
      continue;
    }
    if current.len() >= MIN_STRING_LEN {
      out.push(std::mem::take(&mut current));
    } else {
      current.clear();
    }
  }
  if current.len() >= MIN_STRING_LEN {
    out.push(current);
  }
  Ok(out)
}
