//! In-process fake of the platform's admin API for integration tests.
//!
//! Only the endpoints chalsync talks to are served. Every request is
//! recorded as `"<METHOD> <path?query>"` so tests can assert on the exact
//! call sequence.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};

use axum::extract::{Multipart, Path as UrlPath, Query, Request, State};
use axum::http::{header::AUTHORIZATION, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use sha1::{Digest, Sha1};
use tower_http::trace::TraceLayer;

use chalsync::api::RemoteClient;
use chalsync::config::RemoteConfig;

pub const TOKEN: &str = "test-token";

/// A file stored by the fake.
#[derive(Clone, Debug)]
pub struct StoredFile {
  pub id: i64,
  pub challenge_id: i64,
  pub location: String,
  pub bytes: Vec<u8>,
}

#[derive(Default)]
pub struct Store {
  seq: i64,
  pub challenges: BTreeMap<i64, Map<String, Value>>,
  /// "flags" | "tags" | "topics" | "hints" -> rows with `id` and `challenge_id`.
  pub rows: HashMap<&'static str, Vec<Map<String, Value>>>,
  pub requirements: BTreeMap<i64, Value>,
  pub files: Vec<StoredFile>,
  pub calls: Vec<String>,
  /// Behave like an older platform whose registry has no checksums.
  pub legacy_files: bool,
  /// File ids left out of the registry listing.
  pub unregistered: Vec<i64>,
}

impl Store {
  fn next_id(&mut self) -> i64 {
    self.seq += 1;
    self.seq
  }

  pub fn rows(&self, kind: &str, challenge_id: i64) -> Vec<Map<String, Value>> {
    self.rows
      .get(kind)
      .map(|rows| {
        rows.iter()
          .filter(|r| r.get("challenge_id").and_then(Value::as_i64) == Some(challenge_id))
          .cloned()
          .collect()
      })
      .unwrap_or_default()
  }

  fn challenge_view(&self, id: i64) -> Option<Value> {
    let mut ch = self.challenges.get(&id)?.clone();
    ch.insert("id".into(), id.into());
    let files: Vec<Value> = self
      .files
      .iter()
      .filter(|f| f.challenge_id == id)
      .map(|f| Value::from(format!("/files/{}?token=dl", f.location)))
      .collect();
    ch.insert("files".into(), files.into());
    Some(Value::Object(ch))
  }

  fn store_file(&mut self, challenge_id: i64, name: &str, bytes: Vec<u8>) -> i64 {
    let id = self.next_id();
    let location = format!("{}/{name}", uuid::Uuid::new_v4().simple());
    self.files.push(StoredFile { id, challenge_id, location, bytes });
    id
  }
}

pub type Shared = Arc<Mutex<Store>>;

/// Handle on a running fake platform.
#[derive(Clone)]
pub struct Platform {
  pub store: Shared,
  pub url: String,
}

impl Platform {
  pub async fn start() -> Self {
    let store: Shared = Arc::new(Mutex::new(Store::default()));
    let app = router(store.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
      axum::serve(listener, app).await.unwrap();
    });
    Self { store, url }
  }

  pub fn client(&self) -> RemoteClient {
    RemoteClient::new(&RemoteConfig {
      url: self.url.clone(),
      access_token: TOKEN.into(),
      timeout_secs: 5,
    })
    .unwrap()
  }

  pub fn store(&self) -> std::sync::MutexGuard<'_, Store> {
    self.store.lock().unwrap()
  }

  /// Insert a challenge directly, bypassing the API. Returns its id.
  pub fn seed_challenge(&self, fields: Value) -> i64 {
    let mut store = self.store();
    let id = store.next_id();
    let mut ch = Map::new();
    ch.insert("type".into(), "standard".into());
    ch.insert("state".into(), "visible".into());
    ch.insert("max_attempts".into(), 0.into());
    ch.insert("next_id".into(), Value::Null);
    if let Value::Object(extra) = fields {
      ch.extend(extra);
    }
    store.challenges.insert(id, ch);
    id
  }

  pub fn seed_row(&self, kind: &'static str, challenge_id: i64, fields: Value) {
    let mut store = self.store();
    let id = store.next_id();
    let mut row = Map::new();
    row.insert("id".into(), id.into());
    row.insert("challenge_id".into(), challenge_id.into());
    if let Value::Object(extra) = fields {
      row.extend(extra);
    }
    store.rows.entry(kind).or_default().push(row);
  }

  pub fn seed_file(&self, challenge_id: i64, name: &str, bytes: &[u8]) -> i64 {
    self.store().store_file(challenge_id, name, bytes.to_vec())
  }

  pub fn take_calls(&self) -> Vec<String> {
    std::mem::take(&mut self.store().calls)
  }

  pub fn challenge(&self, id: i64) -> Map<String, Value> {
    self.store().challenges[&id].clone()
  }
}

/// Write `challenge.yml` plus extra files into `dir`.
pub fn write_challenge(dir: &Path, yaml: &str, files: &[(&str, &[u8])]) -> std::path::PathBuf {
  for (rel, bytes) in files {
    let path = dir.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, bytes).unwrap();
  }
  let path = dir.join("challenge.yml");
  std::fs::write(&path, yaml).unwrap();
  path
}

fn ok(data: Value) -> Response {
  Json(json!({ "success": true, "data": data })).into_response()
}

fn not_found() -> Response {
  (StatusCode::NOT_FOUND, Json(json!({ "success": false, "message": "not found" }))).into_response()
}

fn router(store: Shared) -> Router {
  let mut app: Router<Shared> = Router::new()
    .route("/api/v1/challenges", get(list_challenges).post(create_challenge))
    .route("/api/v1/challenges/:id", get(get_challenge).patch(patch_challenge))
    .route("/api/v1/challenges/:id/:kind", get(challenge_rows))
    .route("/api/v1/topics", post(|s: State<Shared>, b: Json<Map<String, Value>>| create_row(s, "topics", b)).delete(delete_topic))
    .route("/api/v1/files", get(file_registry).post(upload_files))
    .route("/api/v1/files/:id", delete(delete_file))
    .route("/files/*location", get(download));

  for kind in ["flags", "tags", "hints"] {
    app = app
      .route(&format!("/api/v1/{kind}"), post(move |s: State<Shared>, b: Json<Map<String, Value>>| create_row(s, kind, b)))
      .route(&format!("/api/v1/{kind}/:id"), delete(move |s: State<Shared>, p: UrlPath<i64>| delete_row(s, kind, p)));
  }

  app
    .layer(middleware::from_fn_with_state(store.clone(), record_and_authorize))
    .layer(TraceLayer::new_for_http())
    .with_state(store)
}

async fn record_and_authorize(State(store): State<Shared>, req: Request, next: Next) -> Response {
  let target = req.uri().path_and_query().map(|p| p.as_str().to_string()).unwrap_or_default();
  store.lock().unwrap().calls.push(format!("{} {target}", req.method()));

  let authorized = req
    .headers()
    .get(AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .is_some_and(|v| v == format!("Token {TOKEN}"));
  if !authorized {
    return (StatusCode::FORBIDDEN, Json(json!({ "success": false, "message": "forbidden" }))).into_response();
  }
  next.run(req).await
}

async fn list_challenges(State(store): State<Shared>) -> Response {
  let store = store.lock().unwrap();
  let list: Vec<Value> = store
    .challenges
    .iter()
    .map(|(id, ch)| json!({ "id": id, "name": ch["name"] }))
    .collect();
  ok(list.into())
}

async fn create_challenge(State(store): State<Shared>, Json(mut body): Json<Map<String, Value>>) -> Response {
  let mut store = store.lock().unwrap();
  let id = store.next_id();
  body.entry("next_id").or_insert(Value::Null);
  body.entry("max_attempts").or_insert(0.into());
  store.challenges.insert(id, body);
  ok(store.challenge_view(id).unwrap_or_default())
}

async fn get_challenge(State(store): State<Shared>, UrlPath(id): UrlPath<i64>) -> Response {
  match store.lock().unwrap().challenge_view(id) {
    Some(view) => ok(view),
    None => not_found(),
  }
}

async fn patch_challenge(
  State(store): State<Shared>,
  UrlPath(id): UrlPath<i64>,
  Json(mut body): Json<Map<String, Value>>,
) -> Response {
  let mut store = store.lock().unwrap();
  if let Some(requirements) = body.remove("requirements") {
    store.requirements.insert(id, requirements);
  }
  let Some(ch) = store.challenges.get_mut(&id) else {
    return not_found();
  };
  ch.extend(body);
  ok(store.challenge_view(id).unwrap_or_default())
}

async fn challenge_rows(State(store): State<Shared>, UrlPath((id, kind)): UrlPath<(i64, String)>) -> Response {
  let store = store.lock().unwrap();
  if !store.challenges.contains_key(&id) {
    return not_found();
  }
  match kind.as_str() {
    "requirements" => ok(store.requirements.get(&id).cloned().unwrap_or(Value::Null)),
    "flags" | "tags" | "topics" | "hints" => {
      ok(store.rows(&kind, id).into_iter().map(Value::Object).collect::<Vec<_>>().into())
    }
    _ => not_found(),
  }
}

async fn create_row(State(store): State<Shared>, kind: &'static str, Json(mut body): Json<Map<String, Value>>) -> Response {
  let mut store = store.lock().unwrap();
  let id = store.next_id();
  body.insert("id".into(), id.into());
  store.rows.entry(kind).or_default().push(body.clone());
  ok(Value::Object(body))
}

async fn delete_row(State(store): State<Shared>, kind: &'static str, UrlPath(id): UrlPath<i64>) -> Response {
  let mut store = store.lock().unwrap();
  let rows = store.rows.entry(kind).or_default();
  let before = rows.len();
  rows.retain(|r| r.get("id").and_then(Value::as_i64) != Some(id));
  if rows.len() == before {
    return not_found();
  }
  ok(Value::Null)
}

async fn delete_topic(State(store): State<Shared>, Query(q): Query<HashMap<String, String>>) -> Response {
  let Some(id) = q.get("target_id").and_then(|v| v.parse::<i64>().ok()) else {
    return (StatusCode::BAD_REQUEST, Json(json!({ "success": false }))).into_response();
  };
  delete_row(State(store), "topics", UrlPath(id)).await
}

async fn file_registry(State(store): State<Shared>) -> Response {
  let store = store.lock().unwrap();
  let entries: Vec<Value> = store
    .files
    .iter()
    .filter(|f| !store.unregistered.contains(&f.id))
    .map(|f| {
      let mut entry = json!({ "id": f.id, "type": "challenge", "location": f.location });
      if !store.legacy_files {
        entry["sha1sum"] = hex::encode(Sha1::digest(&f.bytes)).into();
      }
      entry
    })
    .collect();
  ok(entries.into())
}

async fn upload_files(State(store): State<Shared>, mut form: Multipart) -> Response {
  let mut challenge_id = None;
  let mut uploads = Vec::new();
  while let Ok(Some(field)) = form.next_field().await {
    match field.name() {
      Some("challenge_id") => challenge_id = field.text().await.ok().and_then(|t| t.parse::<i64>().ok()),
      Some("file") => {
        let name = field.file_name().unwrap_or("upload").to_string();
        let bytes = field.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
        uploads.push((name, bytes));
      }
      _ => {}
    }
  }
  let Some(challenge_id) = challenge_id else {
    return (StatusCode::BAD_REQUEST, Json(json!({ "success": false, "message": "challenge_id missing" }))).into_response();
  };

  let mut store = store.lock().unwrap();
  let ids: Vec<Value> = uploads
    .into_iter()
    .map(|(name, bytes)| store.store_file(challenge_id, &name, bytes).into())
    .collect();
  ok(ids.into())
}

async fn delete_file(State(store): State<Shared>, UrlPath(id): UrlPath<i64>) -> Response {
  let mut store = store.lock().unwrap();
  let before = store.files.len();
  store.files.retain(|f| f.id != id);
  if store.files.len() == before {
    return not_found();
  }
  ok(Value::Null)
}

async fn download(State(store): State<Shared>, UrlPath(location): UrlPath<String>) -> Response {
  let location = location.trim_start_matches('/');
  let store = store.lock().unwrap();
  match store.files.iter().find(|f| f.location == location) {
    Some(f) => f.bytes.clone().into_response(),
    None => not_found(),
  }
}
