//! Authenticated client for the platform's REST API.
//!
//! One client is built per process and handed to every engine. Calls are
//! sequential; any non-success status aborts the current operation with
//! `Error::Remote`. We never log the access token.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, instrument};

use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::protocol::*;
use crate::util::trunc_for_log;

const AGENT: &str = concat!("chalsync/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
pub struct RemoteClient {
  client: reqwest::Client,
  base_url: String,
  access_token: String,
}

impl RemoteClient {
  pub fn new(cfg: &RemoteConfig) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(cfg.timeout_secs))
      .build()?;
    Ok(Self {
      client,
      base_url: cfg.url.trim_end_matches('/').to_string(),
      access_token: cfg.access_token.clone(),
    })
  }

  fn url(&self, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
      path.to_string()
    } else {
      format!("{}{}", self.base_url, path)
    }
  }

  fn request(&self, method: Method, path: &str) -> RequestBuilder {
    self.client
      .request(method, self.url(path))
      .header(USER_AGENT, AGENT)
      .header(AUTHORIZATION, format!("Token {}", self.access_token))
  }

  /// Send and fail on any non-success status.
  async fn send(&self, method: Method, path: &str, req: RequestBuilder) -> Result<Response> {
    debug!(target: "remote", %method, %path, "request");
    let res = req.send().await?;
    let status = res.status();
    if status.is_success() {
      return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    let message = extract_error_message(&body).unwrap_or_else(|| trunc_for_log(&body, 200));
    error!(target: "remote", %method, %path, status = status.as_u16(), %message, "remote call failed");
    Err(Error::Remote {
      method: method.to_string(),
      path: path.to_string(),
      status: status.as_u16(),
      message,
    })
  }

  async fn get_data<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
    let res = self.send(Method::GET, path, self.request(Method::GET, path)).await?;
    let envelope: Envelope<T> = res.json().await?;
    Ok(envelope.data)
  }

  async fn write_json<B: Serialize + ?Sized>(&self, method: Method, path: &str, body: &B) -> Result<Response> {
    let req = self
      .request(method.clone(), path)
      .header(CONTENT_TYPE, "application/json")
      .json(body);
    self.send(method, path, req).await
  }

  async fn delete(&self, path: &str) -> Result<()> {
    self.send(Method::DELETE, path, self.request(Method::DELETE, path)).await?;
    Ok(())
  }

  // --- Challenges ---

  #[instrument(level = "debug", skip(self))]
  pub async fn list_challenges(&self) -> Result<Vec<ChallengeSummary>> {
    let data: Option<Vec<ChallengeSummary>> = self.get_data("/api/v1/challenges?view=admin").await?;
    Ok(data.unwrap_or_default())
  }

  #[instrument(level = "debug", skip(self))]
  pub async fn get_challenge(&self, id: i64) -> Result<RemoteChallenge> {
    let path = format!("/api/v1/challenges/{id}?view=admin");
    match self.get_data::<Option<RemoteChallenge>>(&path).await {
      Ok(Some(ch)) => Ok(ch),
      Ok(None) => Err(Error::RemoteChallengeNotFound(format!("id={id}"))),
      Err(Error::Remote { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
        Err(Error::RemoteChallengeNotFound(format!("id={id}")))
      }
      Err(e) => Err(e),
    }
  }

  /// Create a challenge from an assembled payload and return its id.
  #[instrument(level = "debug", skip(self, payload))]
  pub async fn create_challenge(&self, payload: &Map<String, Value>) -> Result<i64> {
    let res = self.write_json(Method::POST, "/api/v1/challenges", payload).await?;
    let envelope: Envelope<Created> = res.json().await?;
    Ok(envelope.data.id)
  }

  #[instrument(level = "debug", skip(self, body))]
  pub async fn patch_challenge<B: Serialize + ?Sized>(&self, id: i64, body: &B) -> Result<()> {
    self.write_json(Method::PATCH, &format!("/api/v1/challenges/{id}"), body).await?;
    Ok(())
  }

  // --- Flags ---

  pub async fn challenge_flags(&self, id: i64) -> Result<Vec<RemoteFlag>> {
    self.get_data(&format!("/api/v1/challenges/{id}/flags")).await
  }

  pub async fn create_flag(&self, payload: &FlagPayload<'_>) -> Result<()> {
    self.write_json(Method::POST, "/api/v1/flags", payload).await?;
    Ok(())
  }

  pub async fn delete_flag(&self, flag_id: i64) -> Result<()> {
    self.delete(&format!("/api/v1/flags/{flag_id}")).await
  }

  // --- Tags ---

  pub async fn challenge_tags(&self, id: i64) -> Result<Vec<RemoteLabel>> {
    self.get_data(&format!("/api/v1/challenges/{id}/tags")).await
  }

  pub async fn create_tag(&self, payload: &TagPayload<'_>) -> Result<()> {
    self.write_json(Method::POST, "/api/v1/tags", payload).await?;
    Ok(())
  }

  pub async fn delete_tag(&self, tag_id: i64) -> Result<()> {
    self.delete(&format!("/api/v1/tags/{tag_id}")).await
  }

  // --- Topics ---

  pub async fn challenge_topics(&self, id: i64) -> Result<Vec<RemoteLabel>> {
    self.get_data(&format!("/api/v1/challenges/{id}/topics")).await
  }

  pub async fn create_topic(&self, payload: &TopicPayload<'_>) -> Result<()> {
    self.write_json(Method::POST, "/api/v1/topics", payload).await?;
    Ok(())
  }

  /// Topics are detached through their challenge association id.
  pub async fn delete_topic(&self, association_id: i64) -> Result<()> {
    self.delete(&format!("/api/v1/topics?type=challenge&target_id={association_id}")).await
  }

  // --- Hints ---

  pub async fn challenge_hints(&self, id: i64) -> Result<Vec<RemoteHint>> {
    self.get_data(&format!("/api/v1/challenges/{id}/hints")).await
  }

  pub async fn create_hint(&self, payload: &HintPayload<'_>) -> Result<()> {
    self.write_json(Method::POST, "/api/v1/hints", payload).await?;
    Ok(())
  }

  pub async fn delete_hint(&self, hint_id: i64) -> Result<()> {
    self.delete(&format!("/api/v1/hints/{hint_id}")).await
  }

  // --- Requirements ---

  pub async fn challenge_requirements(&self, id: i64) -> Result<RemoteRequirements> {
    let data: Option<RemoteRequirements> =
      self.get_data(&format!("/api/v1/challenges/{id}/requirements")).await?;
    Ok(data.unwrap_or_default())
  }

  // --- Files ---

  /// Registry of every challenge file, with checksums on newer platforms.
  #[instrument(level = "debug", skip(self))]
  pub async fn file_registry(&self) -> Result<Vec<RemoteFileEntry>> {
    self.get_data("/api/v1/files?type=challenge").await
  }

  pub async fn delete_file(&self, file_id: i64) -> Result<()> {
    self.delete(&format!("/api/v1/files/{file_id}")).await
  }

  /// Upload files for a challenge in one multipart request.
  ///
  /// Each file is read into memory just before the request and its handle is
  /// closed before the call is sent.
  #[instrument(level = "debug", skip(self, paths), fields(count = paths.len()))]
  pub async fn upload_files(&self, challenge_id: i64, paths: &[PathBuf]) -> Result<()> {
    let mut form = Form::new()
      .text("challenge_id", challenge_id.to_string())
      .text("type", "challenge");
    for path in paths {
      let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::FileNotFound(path.clone()),
        _ => Error::Io(e),
      })?;
      let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
      form = form.part("file", Part::bytes(bytes).file_name(file_name));
    }
    let req = self.request(Method::POST, "/api/v1/files").multipart(form);
    self.send(Method::POST, "/api/v1/files", req).await?;
    Ok(())
  }

  /// Download a file by the URL the platform lists for it.
  #[instrument(level = "debug", skip(self))]
  pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
    let res = self.send(Method::GET, url, self.request(Method::GET, url)).await?;
    Ok(res.bytes().await?.to_vec())
  }
}
