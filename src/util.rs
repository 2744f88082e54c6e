//! Small utility helpers used across modules.

/// Normalize free text read from a document: unify line breaks and strip
/// trailing whitespace.
pub fn normalize_local_text(s: &str) -> String {
  s.replace("\r\n", "\n").trim_end().to_string()
}

/// Normalize free text returned by the platform: trim, unify line breaks and
/// drop tab characters.
pub fn normalize_remote_text(s: &str) -> String {
  s.trim().replace("\r\n", "\n").replace('\t', "")
}

/// Last path segment of a `/`-separated path.
pub fn basename(path: &str) -> &str {
  path.rsplit('/').next().unwrap_or(path)
}

/// Lowercase, dash-separated form of a name, suitable for a directory.
pub fn slugify(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for ch in s.chars().flat_map(char::to_lowercase) {
    if ch.is_alphanumeric() {
      out.push(ch);
    } else if !out.is_empty() && !out.ends_with('-') {
      out.push('-');
    }
  }
  while out.ends_with('-') {
    out.pop();
  }
  out
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge response bodies.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut end = max;
  while !s.is_char_boundary(end) {
    end -= 1;
  }
  format!("{}… ({} bytes total)", &s[..end], s.len())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn text_normalization_differs_by_direction() {
    assert_eq!(normalize_local_text("a\r\nb  \n\n"), "a\nb");
    assert_eq!(normalize_remote_text("  a\r\n\tb \n"), "a\nb");
  }

  #[test]
  fn slugify_collapses_punctuation() {
    assert_eq!(slugify("Web: Login  Bypass!"), "web-login-bypass");
    assert_eq!(slugify("--x--"), "x");
  }

  #[test]
  fn trunc_respects_char_boundaries() {
    let s = "ééééé";
    let t = trunc_for_log(s, 3);
    assert!(t.starts_with('é'));
    assert!(t.ends_with("(10 bytes total)"));
  }
}
