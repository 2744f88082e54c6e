//! chalsync · challenge documents <-> scoring platform
//!
//! Subcommands: create, sync, mirror, verify, lint, image, clone.
//!
//! Important env variables:
//!   CTF_URL           : platform base URL (or [remote].url in the config file)
//!   CTF_ACCESS_TOKEN  : admin access token (or [remote].access_token)
//!   CTF_TIMEOUT_SECS  : per-request timeout (default 30)
//!   CHALSYNC_CONFIG   : path to TOML config (default .ctf/config.toml if present)
//!   LOG_LEVEL         : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT        : "pretty" (default) or "json"

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use chalsync::api::RemoteClient;
use chalsync::config::RemoteConfig;
use chalsync::document::{Document, DOCUMENT_NAME};
use chalsync::domain::{IgnoreSet, Reference};
use chalsync::error::{Error, Result};
use chalsync::lint::DEFAULT_FLAG_FORMAT;
use chalsync::mirror::DEFAULT_FILES_DIR;
use chalsync::reconcile::Reconciler;
use chalsync::{image, lint, mirror, telemetry, verify};

/// Keep challenge documents and the scoring platform in agreement.
#[derive(Parser)]
#[command(name = "chalsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging (overridden by LOG_LEVEL)
  #[arg(global = true, short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Create the challenge on the platform
  Create {
    /// Challenge document or its directory
    #[arg(default_value = DOCUMENT_NAME)]
    path: PathBuf,

    /// Comma separated fields to leave out (e.g. "files,hints")
    #[arg(long)]
    ignore: Option<IgnoreSet>,
  },

  /// Update the existing platform challenge from the document
  Sync {
    #[arg(default_value = DOCUMENT_NAME)]
    path: PathBuf,

    #[arg(long)]
    ignore: Option<IgnoreSet>,
  },

  /// Overwrite the document with the platform state
  Mirror {
    #[arg(default_value = DOCUMENT_NAME)]
    path: PathBuf,

    #[arg(long)]
    ignore: Option<IgnoreSet>,

    /// Directory (relative to the document) for files only found remotely
    #[arg(long, default_value = DEFAULT_FILES_DIR)]
    files_directory: String,
  },

  /// Compare the document with the platform without changing either
  Verify {
    #[arg(default_value = DOCUMENT_NAME)]
    path: PathBuf,

    #[arg(long)]
    ignore: Option<IgnoreSet>,
  },

  /// Run static checks over the challenge directory
  Lint {
    #[arg(default_value = DOCUMENT_NAME)]
    path: PathBuf,

    /// Prefix that marks a flag inside distributed files
    #[arg(long, default_value = DEFAULT_FLAG_FORMAT)]
    flag_format: String,
  },

  /// Show where the challenge image would come from
  Image {
    #[arg(default_value = DOCUMENT_NAME)]
    path: PathBuf,
  },

  /// Scaffold a directory for a remote challenge and mirror it
  Clone {
    /// Remote challenge name or numeric id
    challenge: String,

    /// Directory the category/name folders are created under
    #[arg(long, default_value = ".")]
    root: PathBuf,

    #[arg(long, default_value = DEFAULT_FILES_DIR)]
    files_directory: String,
  },
}

fn document_path(path: &Path) -> PathBuf {
  if path.is_dir() {
    path.join(DOCUMENT_NAME)
  } else {
    path.to_path_buf()
  }
}

fn remote_client() -> Result<RemoteClient> {
  let cfg = RemoteConfig::from_env()?;
  info!(target: "chalsync", url = %cfg.url, "Using platform");
  RemoteClient::new(&cfg)
}

async fn run(command: Commands) -> Result<bool> {
  match command {
    Commands::Create { path, ignore } => {
      let ignore = ignore.unwrap_or_default();
      let doc = Document::load(document_path(&path))?;
      let api = remote_client()?;
      let id = Reconciler::new(&api, &doc, &ignore).create().await?;
      println!("created '{}' (id {id})", doc.spec.name);
      Ok(true)
    }
    Commands::Sync { path, ignore } => {
      let ignore = ignore.unwrap_or_default();
      let doc = Document::load(document_path(&path))?;
      let api = remote_client()?;
      let id = Reconciler::new(&api, &doc, &ignore).sync().await?;
      println!("synced '{}' (id {id})", doc.spec.name);
      Ok(true)
    }
    Commands::Mirror { path, ignore, files_directory } => {
      let ignore = ignore.unwrap_or_default();
      let mut doc = Document::load(document_path(&path))?;
      let api = remote_client()?;
      mirror::mirror(&api, &mut doc, &ignore, &files_directory).await?;
      println!("mirrored '{}' into {}", doc.spec.name, doc.path.display());
      Ok(true)
    }
    Commands::Verify { path, ignore } => {
      let ignore = ignore.unwrap_or_default();
      let doc = Document::load(document_path(&path))?;
      let api = remote_client()?;
      let verdict = verify::verify(&api, &doc, &ignore).await?;
      println!("'{}': {verdict}", doc.spec.name);
      Ok(verdict.is_match())
    }
    Commands::Lint { path, flag_format } => {
      let doc = Document::load(document_path(&path))?;
      match lint::lint(&doc, &flag_format) {
        Ok(()) => {
          println!("'{}': no issues", doc.spec.name);
          Ok(true)
        }
        Err(Error::Lint { issues }) => {
          for (category, messages) in issues.iter().filter(|(_, m)| !m.is_empty()) {
            println!("[{category}]");
            for m in messages {
              println!("  - {m}");
            }
          }
          Ok(false)
        }
        Err(e) => Err(e),
      }
    }
    Commands::Image { path } => {
      let doc = Document::load(document_path(&path))?;
      match image::resolve(&doc)? {
        Some(img) => println!("{img:?}"),
        None => println!("'{}' defines no image", doc.spec.name),
      }
      Ok(true)
    }
    Commands::Clone { challenge, root, files_directory } => {
      let reference = match challenge.parse::<i64>() {
        Ok(id) => Reference::Id(id),
        Err(_) => Reference::Name(challenge),
      };
      let api = remote_client()?;
      let doc = mirror::clone_challenge(&api, &root, &reference, &files_directory).await?;
      println!("cloned '{}' into {}", doc.spec.name, doc.path.display());
      Ok(true)
    }
  }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
  let cli = Cli::parse();
  telemetry::init_tracing(cli.verbose);

  match run(cli.command).await {
    Ok(true) => ExitCode::SUCCESS,
    Ok(false) => ExitCode::FAILURE,
    Err(e) => {
      error!(target: "chalsync", error = %e, "Operation failed");
      eprintln!("error: {e}");
      ExitCode::FAILURE
    }
  }
}
