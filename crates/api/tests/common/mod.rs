// All functions in this module are shared test helpers. Not every test binary
// uses every helper, so we suppress dead_code warnings at the item level.
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use gifpress_api::config::ServerConfig;
use gifpress_api::engine::{JobExecutor, WorkerPool};
use gifpress_api::router::build_app_router;
use gifpress_api::state::AppState;
use gifpress_api::storage::ArtifactStore;
use gifpress_api::ws::WsManager;
use gifpress_db::DbPool;
use gifpress_events::EventBus;

/// Executor that does nothing; handler tests only need jobs to queue.
pub struct NoopExecutor;

#[async_trait::async_trait]
impl JobExecutor for NoopExecutor {
    async fn execute(&self, _job_id: String) {}
}

/// Build a test `ServerConfig` with artifact directories under `dir`.
pub fn test_config(dir: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_path: ":memory:".to_string(),
        upload_dir: dir.join("uploads"),
        output_dir: dir.join("outputs"),
        baseline_model_path: dir.join("baseline.json"),
        gifsicle_path: "gifsicle".to_string(),
        retention_ttl: None,
        default_concurrency: 2,
        max_concurrency: 10,
        max_upload_bytes: 8 * 1024 * 1024,
        reaper_interval: Duration::from_secs(60),
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
    }
}

/// Everything a handler test needs: the router, the backing pool, shared
/// state, and the artifact directory keeping the files alive.
pub struct TestApp {
    pub app: Router,
    pub pool: DbPool,
    pub state: AppState,
    pub tmp: TempDir,
}

/// Build the full application router over an in-memory database, a
/// throwaway artifact directory, and a worker pool whose dispatcher is not
/// running (submitted jobs stay pending).
pub async fn build_test_app() -> TestApp {
    let tmp = TempDir::new().expect("tempdir");
    let config = Arc::new(test_config(tmp.path()));

    let pool = gifpress_db::connect_memory().await.expect("memory pool");

    let store = Arc::new(ArtifactStore::new(
        config.upload_dir.clone(),
        config.output_dir.clone(),
    ));
    store.ensure_dirs().await.expect("artifact dirs");

    let event_bus = Arc::new(EventBus::default());
    let worker_pool = WorkerPool::new(
        Arc::new(NoopExecutor),
        Arc::clone(&event_bus),
        config.default_concurrency,
        config.max_concurrency,
    );

    let state = AppState {
        pool: pool.clone(),
        config: Arc::clone(&config),
        store,
        ws_manager: Arc::new(WsManager::new()),
        event_bus,
        worker_pool,
    };

    let app = build_app_router(state.clone(), &config);
    TestApp {
        app,
        pool,
        state,
        tmp,
    }
}

// ---------------------------------------------------------------------------
// Shared HTTP test helpers
// ---------------------------------------------------------------------------

/// Collect the response body into a `serde_json::Value`.
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Send a JSON request with the given HTTP method.
pub async fn send_json(
    app: Router,
    method: Method,
    uri: &str,
    body: serde_json::Value,
) -> axum::response::Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST JSON to the given URI and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: serde_json::Value,
) -> axum::response::Response {
    send_json(app, Method::POST, uri, body).await
}

/// PUT JSON to the given URI and return the response.
pub async fn put_json(app: Router, uri: &str, body: serde_json::Value) -> axum::response::Response {
    send_json(app, Method::PUT, uri, body).await
}

/// GET from the given URI.
pub async fn get(app: Router, uri: &str) -> axum::response::Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST with an empty body (retry endpoint).
pub async fn post_empty(app: Router, uri: &str) -> axum::response::Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// DELETE the given URI.
pub async fn delete(app: Router, uri: &str) -> axum::response::Response {
    let request = Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST a handcrafted multipart body to `/api/upload`.
///
/// `parts` is a list of `(field_name, filename, content_type, payload)`;
/// text fields pass `None` for filename and content type.
pub async fn post_multipart(
    app: Router,
    parts: &[(&str, Option<&str>, Option<&str>, &[u8])],
) -> axum::response::Response {
    let boundary = "gifpress-test-boundary";
    let mut body: Vec<u8> = Vec::new();

    for (name, filename, content_type, payload) in parts {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        match filename {
            Some(filename) => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n")
                    .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n").as_bytes(),
            ),
        }
        if let Some(content_type) = content_type {
            body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(payload);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}
