// HTTP transport - maps requests onto pipeline stages and store queries
// All bodies are JSON

use crate::error::{PipelineError, StoreError};
use crate::pipeline::{AddOutcome, Pipeline};
use crate::record::Record;
use crate::store::ConflictKey;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
}

/// Listing entry for GET /states
#[derive(Serialize)]
struct StateListing {
    #[serde(rename = "State Name")]
    name: String,
    #[serde(rename = "State Code")]
    code: String,
}

/// Single-state body for GET /states/:name and POST /states
#[derive(Serialize)]
struct StateDetail {
    #[serde(rename = "State_Name")]
    name: String,
    #[serde(rename = "State_Code")]
    code: String,
}

impl From<Record> for StateListing {
    fn from(record: Record) -> Self {
        Self {
            name: record.name().to_string(),
            code: record.code().to_string(),
        }
    }
}

impl From<Record> for StateDetail {
    fn from(record: Record) -> Self {
        Self {
            name: record.name().to_string(),
            code: record.code().to_string(),
        }
    }
}

#[derive(Deserialize)]
struct NewState {
    state_name: Option<String>,
    state_code: Option<String>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Every stage failure is a 500; the message says which kind it was.
fn stage_failure(err: PipelineError) -> Response {
    error!(error = %err, "stage failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

fn store_failure(err: StoreError, what: &str) -> Response {
    error!(error = %err, "{} failed", what);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

/// Run a stage or store call off the async workers; SQLite may sit in its
/// busy timeout for seconds.
async fn blocking<T, F>(state: AppState, f: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce(&Pipeline) -> T + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&state.pipeline))
        .await
        .map_err(|e| {
            error!(error = %e, "blocking task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        })
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /health
async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET /scrape - run the scrape stage
async fn scrape(State(state): State<AppState>) -> Response {
    match state.pipeline.scrape().await {
        Ok(report) => Json(json!({
            "message": format!("Scraped {} entries into the staging batch", report.count),
            "count": report.count,
            "batch_id": report.batch_id,
        }))
        .into_response(),
        Err(e) => stage_failure(e),
    }
}

/// GET /verify - run the verify stage
async fn verify(State(state): State<AppState>) -> Response {
    match blocking(state, |p| p.verify()).await {
        Ok(Ok(report)) => Json(json!({
            "message": format!(
                "Verified {} entries, {} rejected",
                report.valid + report.invalid.len(),
                report.invalid.len()
            ),
            "valid_count": report.valid,
            "invalid_entries": report.invalid,
            "batch_id": report.batch_id,
        }))
        .into_response(),
        Ok(Err(e)) => stage_failure(e),
        Err(response) => response,
    }
}

/// GET /insert, GET /commit - run the commit stage
async fn commit(State(state): State<AppState>) -> Response {
    match blocking(state, |p| p.commit()).await {
        Ok(Ok(report)) => Json(json!({
            "message": format!("Inserted {} new states", report.inserted),
            "inserted": report.inserted,
            "already_exists": report.already_exists,
            "rejected": report.rejected,
        }))
        .into_response(),
        Ok(Err(e)) => stage_failure(e),
        Err(response) => response,
    }
}

/// GET /states - every committed state
async fn list_states(State(state): State<AppState>) -> Response {
    match blocking(state, |p| p.store().list_all()).await {
        Ok(Ok(records)) => {
            let body: Vec<StateListing> = records.into_iter().map(Into::into).collect();
            Json(body).into_response()
        }
        Ok(Err(e)) => store_failure(e, "listing states"),
        Err(response) => response,
    }
}

/// GET /states/:name - lookup by (title-cased) name
async fn get_state(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match blocking(state, move |p| p.store().find_by_name(&name)).await {
        Ok(Ok(Some(record))) => Json(StateDetail::from(record)).into_response(),
        Ok(Ok(None)) => error_response(StatusCode::NOT_FOUND, "State not found"),
        Ok(Err(e)) => store_failure(e, "state lookup"),
        Err(response) => response,
    }
}

/// POST /states - add one state
async fn add_state(
    State(state): State<AppState>,
    payload: Result<Json<NewState>, JsonRejection>,
) -> Response {
    let Ok(Json(body)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid JSON body");
    };
    let (Some(name), Some(code)) = (body.state_name, body.state_code) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid or incomplete data");
    };

    match blocking(state, move |p| p.add_state(&name, &code)).await {
        Ok(Ok(AddOutcome::Created(record))) => {
            let detail = StateDetail::from(record);
            (
                StatusCode::CREATED,
                Json(json!({
                    "message": "State added successfully",
                    "State_Name": detail.name,
                    "State_Code": detail.code,
                })),
            )
                .into_response()
        }
        Ok(Ok(AddOutcome::Invalid(reason))) => error_response(
            StatusCode::BAD_REQUEST,
            format!("Invalid or incomplete data: {}", reason),
        ),
        Ok(Ok(AddOutcome::Conflict(key))) => {
            let message = match key {
                ConflictKey::Code => "State code already exists",
                ConflictKey::Name => "State name already exists",
            };
            error_response(StatusCode::CONFLICT, message)
        }
        Ok(Err(e)) => store_failure(e, "adding state"),
        Err(response) => response,
    }
}

/// Build the full router around a shared pipeline
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    let state = AppState { pipeline };

    Router::new()
        .route("/health", get(health_check))
        .route("/scrape", get(scrape))
        .route("/verify", get(verify))
        .route("/insert", get(commit))
        .route("/commit", get(commit))
        .route("/states", get(list_states).post(add_state))
        .route("/states/:name", get(get_state))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::record::RawPair;
    use crate::slot::StagingBatch;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app(dir: &TempDir) -> (Router, Arc<Pipeline>) {
        let mut config = Config::for_dir(dir.path());
        // Nothing listens on the discard port
        config.source_url = "http://127.0.0.1:9/".to_string();
        config.fetch_timeout = std::time::Duration::from_secs(2);
        let pipeline = Arc::new(Pipeline::from_config(&config).unwrap());
        (router(Arc::clone(&pipeline)), pipeline)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(b) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(b.to_string())
            }
            None => Body::empty(),
        };

        let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let dir = TempDir::new().unwrap();
        let (app, _) = app(&dir);

        let (status, body) = send(&app, Method::GET, "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_stage_routes() {
        let dir = TempDir::new().unwrap();
        let (app, pipeline) = app(&dir);
        pipeline
            .staging()
            .write(StagingBatch {
                entries: vec![RawPair::new("Goa", "GA"), RawPair::new("X", "123")],
            })
            .unwrap();

        let (status, body) = send(&app, Method::GET, "/verify", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid_count"], 1);
        assert_eq!(body["invalid_entries"][0]["State Name"], "X");

        let (status, body) = send(&app, Method::GET, "/insert", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["inserted"], 1);

        let (status, body) = send(&app, Method::GET, "/commit", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["inserted"], 0);
        assert_eq!(body["already_exists"], 1);

        let (status, body) = send(&app, Method::GET, "/states", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([{"State Name": "Goa", "State Code": "GA"}]));
    }

    #[tokio::test]
    async fn test_verify_without_scrape_is_500() {
        let dir = TempDir::new().unwrap();
        let (app, _) = app(&dir);

        let (status, body) = send(&app, Method::GET, "/verify", None).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("no input"));
    }

    #[tokio::test]
    async fn test_scrape_fetch_error_is_500() {
        let dir = TempDir::new().unwrap();
        let (app, _) = app(&dir);

        let (status, body) = send(&app, Method::GET, "/scrape", None).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().starts_with("fetch failed"));
    }

    #[tokio::test]
    async fn test_get_state_by_name() {
        let dir = TempDir::new().unwrap();
        let (app, pipeline) = app(&dir);
        pipeline.add_state("Tamil Nadu", "TN").unwrap();

        let (status, body) = send(&app, Method::GET, "/states/tamil%20nadu", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"State_Name": "Tamil Nadu", "State_Code": "TN"}));

        let (status, body) = send(&app, Method::GET, "/states/atlantis", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "State not found");
    }

    #[tokio::test]
    async fn test_post_state() {
        let dir = TempDir::new().unwrap();
        let (app, _) = app(&dir);

        let (status, body) = send(
            &app,
            Method::POST,
            "/states",
            Some(r#"{"state_name": "goa", "state_code": "ga"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["State_Name"], "Goa");
        assert_eq!(body["State_Code"], "GA");

        let (status, _) = send(
            &app,
            Method::POST,
            "/states",
            Some(r#"{"state_name": "Goa", "state_code": "GA"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_post_state_bad_bodies() {
        let dir = TempDir::new().unwrap();
        let (app, pipeline) = app(&dir);

        for body in [
            "{not json",
            r#"{"state_name": "Goa"}"#,
            r#"{"state_name": "Goa", "state_code": "GOA"}"#,
            r#"{"state_name": "  ", "state_code": "GA"}"#,
        ] {
            let (status, _) = send(&app, Method::POST, "/states", Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body: {}", body);
        }

        assert_eq!(pipeline.store().count().unwrap(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_locked_store_does_not_stall_runtime() {
        let dir = TempDir::new().unwrap();
        let (app, pipeline) = app(&dir);

        // Another writer holds the database lock
        let holder = rusqlite::Connection::open(pipeline.store().path()).unwrap();
        holder.execute_batch("BEGIN IMMEDIATE").unwrap();

        let started = std::time::Instant::now();
        let post = tokio::spawn({
            let app = app.clone();
            async move {
                send(
                    &app,
                    Method::POST,
                    "/states",
                    Some(r#"{"state_name": "Goa", "state_code": "GA"}"#),
                )
                .await
            }
        });
        // Let the POST start and park on its database call
        tokio::task::yield_now().await;

        let (status, _) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(started.elapsed() < std::time::Duration::from_secs(2));

        holder.execute_batch("COMMIT").unwrap();
        let (status, _) = post.await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
    }
}
