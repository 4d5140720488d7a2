//! HTTP front end for the summarizer.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Summarize form (collection, file, optional topic) |
//! | `GET`  | `/health` | Health check (version and summary cache counters) |
//! | `GET`  | `/api/collections` | Collections of the configured account |
//! | `GET`  | `/api/collections/{name}/files` | Files of one collection |
//! | `POST` | `/api/summarize` | Summarize one file, optionally by topic |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "collection not found: physics (account lecture_tool)" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `generation_failed` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the form can also be
//! served from elsewhere.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::cache::CacheStats;
use crate::config::Config;
use crate::dispatch::SummaryRequest;
use crate::error::SummarizeError;
use crate::models::{Collection, FileRecord};
use crate::store::CollectionStore;
use crate::summarize::Summarizer;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    summarizer: Arc<Summarizer>,
}

impl AppState {
    pub fn new(config: Arc<Config>, summarizer: Arc<Summarizer>) -> Self {
        Self { config, summarizer }
    }
}

/// Start the server on `[server].bind` and run until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    if !config.summarizer.is_enabled() {
        tracing::warn!("summarizer provider is disabled; summarize requests will fail");
    }
    let summarizer = Arc::new(Summarizer::from_config(config).await?);
    let state = AppState::new(Arc::new(config.clone()), summarizer);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, model = %config.summarizer.model, "server listening");
    println!("lsum listening on http://{}", bind_addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/api/collections", get(handle_list_collections))
        .route("/api/collections/{name}/files", get(handle_list_files))
        .route("/api/summarize", post(handle_summarize))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    tracing::error!(error = %format!("{:#}", err), "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: format!("{:#}", err),
    }
}

impl From<SummarizeError> for AppError {
    fn from(err: SummarizeError) -> Self {
        let message = err.to_string();
        match err {
            SummarizeError::InvalidRequest(_) => AppError {
                status: StatusCode::BAD_REQUEST,
                code: "bad_request",
                message,
            },
            SummarizeError::CollectionNotFound { .. } => not_found(message),
            SummarizeError::Generation(_) => {
                tracing::warn!(error = %message, "generation failed");
                AppError {
                    status: StatusCode::BAD_GATEWAY,
                    code: "generation_failed",
                    message,
                }
            }
            SummarizeError::Store(e) => internal(e),
        }
    }
}

// ============ GET / and /health ============

async fn handle_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    account: String,
    cache: CacheStats,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        account: state.config.account.name.clone(),
        cache: state.summarizer.cache().stats(),
    })
}

// ============ Collections ============

#[derive(Serialize)]
struct CollectionsResponse {
    collections: Vec<Collection>,
}

async fn handle_list_collections(
    State(state): State<AppState>,
) -> Result<Json<CollectionsResponse>, AppError> {
    let collections = state
        .summarizer
        .store()
        .list_collections(state.summarizer.account())
        .await
        .map_err(internal)?;
    Ok(Json(CollectionsResponse { collections }))
}

#[derive(Serialize)]
struct FilesResponse {
    collection: String,
    files: Vec<FileRecord>,
}

async fn handle_list_files(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<FilesResponse>, AppError> {
    let store = state.summarizer.store();
    let account = state.summarizer.account();
    let collection = store
        .load_collection(&name, account)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found(format!("collection not found: {} (account {})", name, account)))?;
    let files = store.list_files(&collection).await.map_err(internal)?;
    Ok(Json(FilesResponse {
        collection: collection.name,
        files,
    }))
}

// ============ POST /api/summarize ============

#[derive(Deserialize)]
struct SummarizeBody {
    collection: String,
    file: String,
    #[serde(default)]
    topic: Option<String>,
}

#[derive(Serialize)]
struct SummarizeResponse {
    points: Vec<String>,
    cached: bool,
}

async fn handle_summarize(
    State(state): State<AppState>,
    Json(body): Json<SummarizeBody>,
) -> Result<Json<SummarizeResponse>, AppError> {
    let request = SummaryRequest::new(body.collection, body.file, body.topic.unwrap_or_default());
    let outcome = state.summarizer.summarize(&request).await?;
    Ok(Json(SummarizeResponse {
        points: outcome.points.points().to_vec(),
        cached: outcome.cached,
    }))
}

const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Lecture Summarizer</title>
<style>
  body { font-family: system-ui, sans-serif; max-width: 48rem; margin: 2rem auto; padding: 0 1rem; }
  label { display: block; margin-top: 1rem; font-weight: 600; }
  select, input { width: 100%; padding: .4rem; }
  button { margin-top: 1rem; padding: .5rem 1.5rem; }
  #status { color: #666; margin-top: 1rem; }
  #points li { margin: .3rem 0; }
</style>
</head>
<body>
<h1>Summarizer</h1>
<p>Choose a collection and file. Leave the topic blank to summarize the whole file.</p>
<label for="collection">Stored libraries</label>
<select id="collection"></select>
<label for="file">Stored files</label>
<select id="file"></select>
<label for="topic">Topic (optional)</label>
<input id="topic" type="text" placeholder="e.g. entropy">
<button id="go">Summarize</button>
<div id="status"></div>
<ul id="points"></ul>
<script>
const $ = (id) => document.getElementById(id);

async function getJson(url, opts) {
  const res = await fetch(url, opts);
  const body = await res.json();
  if (!res.ok) throw new Error(body.error ? body.error.message : res.statusText);
  return body;
}

function fill(select, values) {
  select.innerHTML = "";
  for (const v of values) {
    const o = document.createElement("option");
    o.value = v; o.textContent = v;
    select.appendChild(o);
  }
}

async function loadFiles() {
  const name = $("collection").value;
  if (!name) { fill($("file"), []); return; }
  const body = await getJson("/api/collections/" + encodeURIComponent(name) + "/files");
  fill($("file"), body.files.map((f) => f.filename));
}

async function loadCollections() {
  const body = await getJson("/api/collections");
  fill($("collection"), body.collections.map((c) => c.name));
  await loadFiles();
}

$("collection").addEventListener("change", () => loadFiles().catch((e) => $("status").textContent = e.message));

$("go").addEventListener("click", async () => {
  $("points").innerHTML = "";
  $("status").textContent = "Summarizing...";
  try {
    const body = await getJson("/api/summarize", {
      method: "POST",
      headers: { "content-type": "application/json" },
      body: JSON.stringify({ collection: $("collection").value, file: $("file").value, topic: $("topic").value }),
    });
    $("status").textContent = body.points.length ? (body.cached ? "(cached)" : "") : "No key points found.";
    for (const p of body.points) {
      const li = document.createElement("li");
      li.textContent = p.replace(/^- /, "");
      $("points").appendChild(li);
    }
  } catch (e) {
    $("status").textContent = e.message;
  }
});

loadCollections().catch((e) => $("status").textContent = e.message);
</script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{EvictionPolicy, SummaryCache};
    use crate::chunk::segment_text;
    use crate::generation::{GenerationEngine, ResponseUnit, SourceContext};
    use crate::models::SourceFile;
    use crate::store::memory::InMemoryStore;
    use crate::summarize::SummarizeSettings;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct EchoEngine {
        fail: bool,
    }

    #[async_trait]
    impl GenerationEngine for EchoEngine {
        fn model_name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, _instruction: &str, context: &SourceContext) -> anyhow::Result<ResponseUnit> {
            if self.fail {
                anyhow::bail!("connection refused");
            }
            Ok(ResponseUnit::from_points(
                context.text.split("\n\n").map(String::from).collect(),
            ))
        }
    }

    async fn spawn(fail: bool) -> String {
        let store = Arc::new(InMemoryStore::new());
        let col = store.create_collection("thermo", "lecture_tool").await.unwrap();
        let body = "Heat flows from hot to cold.\n\nWork is path dependent.";
        let file = SourceFile {
            filename: "lecture1.txt".into(),
            content_type: "text/plain".into(),
            body: body.into(),
            modified_at: 0,
        };
        let status = store.lookup_file(&col, &file).await.unwrap();
        let chunks = segment_text(&status.document_id, body, 8);
        store
            .store_file(&col, &file, &status.document_id, &chunks)
            .await
            .unwrap();

        let config: Config = toml::from_str("[db]\npath = \"unused.sqlite\"\n").unwrap();
        let summarizer = Summarizer::new(
            store,
            Arc::new(EchoEngine { fail }),
            SummaryCache::new(EvictionPolicy::Never),
            SummarizeSettings::from_config(&config),
        );
        let app = router(AppState::new(Arc::new(config), Arc::new(summarizer)));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn lists_collections_and_files() {
        let base = spawn(false).await;
        let client = reqwest::Client::new();

        let body: Value = client
            .get(format!("{}/api/collections", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["collections"][0]["name"], "thermo");

        let body: Value = client
            .get(format!("{}/api/collections/thermo/files", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["files"][0]["filename"], "lecture1.txt");
        assert_eq!(body["files"][0]["segment_count"], 2);

        let res = client
            .get(format!("{}/api/collections/optics/files", base))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 404);
    }

    #[tokio::test]
    async fn summarize_then_cached() {
        let base = spawn(false).await;
        let client = reqwest::Client::new();
        let req = json!({ "collection": "thermo", "file": "lecture1.txt" });

        let first: Value = client
            .post(format!("{}/api/summarize", base))
            .json(&req)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(
            first["points"],
            json!(["- Heat flows from hot to cold.", "- Work is path dependent."])
        );
        assert_eq!(first["cached"], false);

        let second: Value = client
            .post(format!("{}/api/summarize", base))
            .json(&req)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(second["points"], first["points"]);
        assert_eq!(second["cached"], true);
    }

    #[tokio::test]
    async fn error_codes() {
        let base = spawn(true).await;
        let client = reqwest::Client::new();

        let res = client
            .post(format!("{}/api/summarize", base))
            .json(&json!({ "collection": "thermo", "file": "" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"]["code"], "bad_request");

        let res = client
            .post(format!("{}/api/summarize", base))
            .json(&json!({ "collection": "optics", "file": "a.txt" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 404);

        let res = client
            .post(format!("{}/api/summarize", base))
            .json(&json!({ "collection": "thermo", "file": "lecture1.txt", "topic": "heat" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 502);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"]["code"], "generation_failed");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("connection refused"));
    }

    #[tokio::test]
    async fn index_and_health() {
        let base = spawn(false).await;
        let html = reqwest::get(format!("{}/", base)).await.unwrap().text().await.unwrap();
        assert!(html.contains("/api/summarize"));
        let health: Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["account"], "lecture_tool");
        assert_eq!(health["cache"], json!({ "entries": 0, "hits": 0, "misses": 0 }));
    }

    #[tokio::test]
    async fn health_reports_cache_counters() {
        let base = spawn(false).await;
        let client = reqwest::Client::new();
        let req = json!({ "collection": "thermo", "file": "lecture1.txt" });
        for _ in 0..2 {
            let res = client
                .post(format!("{}/api/summarize", base))
                .json(&req)
                .send()
                .await
                .unwrap();
            assert_eq!(res.status(), 200);
        }

        let health: Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["cache"]["entries"], 1);
        assert_eq!(health["cache"]["hits"], 1);
        assert_eq!(health["cache"]["misses"], 1);
    }
}
