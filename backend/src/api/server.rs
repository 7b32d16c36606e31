//! HTTP server for the linemap API.
//!
//! # API Endpoints
//!
//! | Method | Path                   | Description                      |
//! |--------|------------------------|----------------------------------|
//! | GET    | `/health`              | Health check and loaded rules    |
//! | POST   | `/dk/upload/{rule_id}` | Upload a CSV file for a rule     |
//! | GET    | `/api/logs`            | SSE stream for real-time logs    |
//!
//! Uploads require `Authorization: Bearer <token>`. Add `?dry=1` to get the
//! mapped payload back instead of delivering it.

use std::collections::HashMap;
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{Multipart, Path, Query, Request, State},
    http::{header, Method, StatusCode},
    middleware::{self, Next},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, log_info, log_success, LOG_BROADCASTER};
use super::types::{error_response, UploadResponse};
use crate::config::{Config, Settings};
use crate::error::ServerError;
use crate::transform::{MappingEngine, UploadOptions, UploadPipeline};

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: &str) -> ApiError {
    (status, Json(error_response(message)))
}

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    pipeline: UploadPipeline,
    token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(config: Arc<Config>, pipeline: UploadPipeline, token: Option<String>) -> Self {
        Self {
            config,
            pipeline,
            token: token.map(Arc::from),
        }
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        .expose_headers([header::CONTENT_TYPE]);

    let uploads = Router::new()
        .route("/dk/upload/{rule_id}", post(upload_csv))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/logs", get(sse_logs))
        .merge(uploads)
        .layer(cors)
        .with_state(state)
}

/// Start persistent handlers and serve until Ctrl-C or SIGTERM.
pub async fn start_server(settings: Settings, config: Config) -> Result<(), ServerError> {
    let hooks = config.build_hooks()?;
    let supervisor = Arc::new(config.build_supervisor());
    supervisor.spawn_persistent(&config.handlers).await?;

    let token = settings.bearer_token(&config);
    if token.is_none() {
        log_error("No AUTH_TOKEN configured, every upload will be rejected");
    }

    let engine = MappingEngine::new(Arc::clone(&supervisor), Arc::new(hooks));
    let state = AppState::new(Arc::new(config), UploadPipeline::new(engine), token);
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log_success(format!("linemap server running on http://localhost:{}", settings.port));

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    log_info("Stopping handler processes");
    supervisor.shutdown().await;
    served?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Reject requests without the expected bearer token.
async fn require_bearer(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let given = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match (state.token.as_deref(), given) {
        (Some(expected), Some(given)) if expected == given => next.run(request).await,
        _ => api_error(StatusCode::UNAUTHORIZED, "Unauthorized").into_response(),
    }
}

/// Health check endpoint
async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "linemap",
        "version": env!("CARGO_PKG_VERSION"),
        "rules": state.config.rule_ids(),
        "endpoints": {
            "upload": "POST /dk/upload/{rule_id}",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Upload CSV endpoint
async fn upload_csv(
    State(state): State<AppState>,
    Path(rule_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let rule = state
        .config
        .rule(&rule_id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, &format!("Unknown rule: {}", rule_id)))?;
    let dry = params.get("dry").is_some_and(|v| !v.is_empty());

    let mut file_data: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, &format!("Multipart error: {}", e)))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| api_error(StatusCode::BAD_REQUEST, &format!("Read error: {}", e)))?;
            file_data = Some(bytes.to_vec());
        }
    }

    let bytes = file_data.ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "could not receive file."))?;
    log_info(format!("New upload for {} ({} bytes)", rule.id, bytes.len()));

    let outcome = state
        .pipeline
        .run(rule, &bytes, UploadOptions { dry })
        .await
        .map_err(|e| {
            log_error(format!("Upload for {} failed: {}", rule.id, e));
            let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            api_error(status, &e.to_string())
        })?;

    if dry {
        return Ok(Json(outcome.payload).into_response());
    }
    Ok(Json(UploadResponse::from(outcome)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::HookPipeline;
    use crate::supervisor::ProcessSupervisor;
    use reqwest::multipart::{Form, Part};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CSV: &str = "id;name;email\n1;Alice;alice@x.com\n";

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// Receiver counting delivered payloads.
    async fn spawn_receiver(hits: Arc<AtomicUsize>) -> String {
        let app = Router::new().route(
            "/in",
            post(move |Json(body): Json<Value>| {
                let hits = Arc::clone(&hits);
                async move {
                    assert!(body["items"].is_array());
                    hits.fetch_add(1, Ordering::SeqCst);
                    StatusCode::OK
                }
            }),
        );
        spawn(app).await
    }

    async fn spawn_app(token: Option<&str>, target: &str) -> String {
        let config = Config::from_json(
            &json!({
                "rules": [{
                    "id": "people",
                    "http": { "url": format!("{}/in", target), "payload_key": "items" },
                    "each_line": [{
                        "map": [
                            { "name": "id", "to": "identifier" },
                            { "name": "name" },
                            { "name": "email", "required": true }
                        ],
                        "validation": [{ "field": "id", "type": "number" }]
                    }]
                }]
            })
            .to_string(),
        )
        .unwrap();

        let engine = MappingEngine::new(
            Arc::new(ProcessSupervisor::new("./no-such-handlers")),
            Arc::new(HookPipeline::new()),
        );
        let state = AppState::new(Arc::new(config), UploadPipeline::new(engine), token.map(String::from));
        spawn(router(state)).await
    }

    fn form(csv: &str) -> Form {
        Form::new().part("file", Part::bytes(csv.as_bytes().to_vec()).file_name("rows.csv"))
    }

    #[tokio::test]
    async fn test_health_lists_rules() {
        let base = spawn_app(Some("secret"), "http://127.0.0.1:9").await;
        let body: Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["rules"], json!(["people"]));
    }

    #[tokio::test]
    async fn test_upload_requires_matching_token() {
        let base = spawn_app(Some("secret"), "http://127.0.0.1:9").await;
        let client = reqwest::Client::new();
        let url = format!("{}/dk/upload/people?dry=1", base);

        let res = client.post(&url).multipart(form(CSV)).send().await.unwrap();
        assert_eq!(res.status(), 401);

        let res = client
            .post(&url)
            .bearer_auth("wrong")
            .multipart(form(CSV))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 401);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"], "Unauthorized");
    }

    #[tokio::test]
    async fn test_no_server_token_rejects_everything() {
        let base = spawn_app(None, "http://127.0.0.1:9").await;
        let res = reqwest::Client::new()
            .post(format!("{}/dk/upload/people", base))
            .bearer_auth("")
            .multipart(form(CSV))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 401);
    }

    #[tokio::test]
    async fn test_dry_upload_returns_payload() {
        let base = spawn_app(Some("secret"), "http://127.0.0.1:9").await;
        let res = reqwest::Client::new()
            .post(format!("{}/dk/upload/people?dry=1", base))
            .bearer_auth("secret")
            .multipart(form(CSV))
            .send()
            .await
            .unwrap();

        assert_eq!(res.status(), 200);
        let body: Value = res.json().await.unwrap();
        assert_eq!(
            body,
            json!({ "items": [{ "identifier": "1", "name": "Alice", "email": "alice@x.com" }] })
        );
    }

    #[tokio::test]
    async fn test_upload_delivers_and_reports() {
        let hits = Arc::new(AtomicUsize::new(0));
        let target = spawn_receiver(Arc::clone(&hits)).await;
        let base = spawn_app(Some("secret"), &target).await;

        let res = reqwest::Client::new()
            .post(format!("{}/dk/upload/people", base))
            .bearer_auth("secret")
            .multipart(form(CSV))
            .send()
            .await
            .unwrap();

        assert_eq!(res.status(), 200);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["status"], "success");
        assert_eq!(body["processed_rows"], 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_upload_errors() {
        let base = spawn_app(Some("secret"), "http://127.0.0.1:9").await;
        let client = reqwest::Client::new();

        let res = client
            .post(format!("{}/dk/upload/nobody?dry=1", base))
            .bearer_auth("secret")
            .multipart(form(CSV))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 404);

        let res = client
            .post(format!("{}/dk/upload/people?dry=1", base))
            .bearer_auth("secret")
            .multipart(Form::new().text("other", "x"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400);

        let res = client
            .post(format!("{}/dk/upload/people?dry=1", base))
            .bearer_auth("secret")
            .multipart(form("id;name;email\nx;Alice;a@x\n"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400);
        let body: Value = res.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().starts_with("Validation failed"));
    }
}
