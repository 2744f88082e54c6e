//! chalsync · declarative challenge documents reconciled against a
//! CTFd-style scoring platform.
//!
//! Operations:
//!   - `reconcile::Reconciler::create` / `sync`: push a document to the platform
//!   - `mirror::mirror`: pull the platform state into the document
//!   - `verify::verify`: read-only comparison of both sides
//!   - `lint::lint`, `image::resolve`, `mirror::clone_challenge`: local helpers

pub mod api;
pub mod config;
pub mod document;
pub mod domain;
pub mod error;
pub mod files;
pub mod identity;
pub mod image;
pub mod lint;
pub mod mirror;
pub mod normalize;
pub mod protocol;
pub mod reconcile;
pub mod scaffold;
pub mod telemetry;
pub mod util;
pub mod verify;

pub use error::{Error, Result};
