//! Classify a document's `image` reference.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::document::Document;
use crate::error::{Error, Result};
use crate::util::slugify;

const KNOWN_REGISTRIES: [&str; 8] = [
  "docker.io",
  "gcr.io",
  "ecr.aws",
  "ghcr.io",
  "azurecr.io",
  "registry.digitalocean.com",
  "registry.gitlab.com",
  "registry.ctfd.io",
];

/// Where a challenge image comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageRef {
  /// Pulled from a registry as-is.
  Registry(String),
  /// Built from a local context directory containing a Dockerfile.
  Build { name: String, context: PathBuf },
  /// Already present in the local image store.
  Local(String),
}

/// Resolve the document's image, asking `docker inspect` about local images.
pub fn resolve(doc: &Document) -> Result<Option<ImageRef>> {
  resolve_with(doc, docker_has_image)
}

/// Same as `resolve` with a custom probe for local images.
pub fn resolve_with(doc: &Document, has_local_image: impl Fn(&str) -> bool) -> Result<Option<ImageRef>> {
  let Some(image) = doc.spec.image.as_deref().filter(|i| !i.is_empty()) else {
    return Ok(None);
  };

  if let Some(rest) = image.strip_prefix("registry://") {
    return Ok(Some(ImageRef::Registry(rest.to_string())));
  }
  if image.starts_with("library/") {
    return Ok(Some(ImageRef::Registry(format!("docker.io/{image}"))));
  }
  if KNOWN_REGISTRIES.iter().any(|r| image.contains(r)) {
    return Ok(Some(ImageRef::Registry(image.to_string())));
  }

  let context = doc.dir().join(image);
  if context.join("Dockerfile").exists() {
    return Ok(Some(ImageRef::Build { name: slugify(&doc.spec.name), context }));
  }
  if has_local_image(image) {
    return Ok(Some(ImageRef::Local(image.to_string())));
  }

  Err(Error::invalid(&doc.path, format!("image '{image}' could not be resolved")))
}

fn docker_has_image(image: &str) -> bool {
  Command::new("docker")
    .args(["inspect", image])
    .stdout(Stdio::null())
    .stderr(Stdio::null())
    .status()
    .map(|s| s.success())
    .unwrap_or(false)
}
