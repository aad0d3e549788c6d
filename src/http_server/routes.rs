//! Document HTTP Routes
//!
//! REST access to the store. Every write goes through the same coordinator
//! as WebSocket writes, so REST writes notify subscribers too.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::server::AppState;
use crate::core::{CoreError, ReadOutcome};
use crate::storage::Document;

// ==================
// Request/Response Types
// ==================

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub keys: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// ==================
// Document Routes
// ==================

/// `GET /` and `/r/*key`
pub fn document_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(stats_handler))
        .route(
            "/r/*key",
            get(read_handler)
                .post(replace_handler)
                .patch(patch_handler)
                .delete(delete_handler),
        )
        .with_state(state)
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        keys: state.router.coordinator().store().keys(),
    })
}

async fn read_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<ReadOutcome>, CoreError> {
    state.router.coordinator().read(&key).map(Json)
}

async fn replace_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Document>, CoreError> {
    let Json(value) = body.map_err(|e| CoreError::malformed(e.body_text()))?;
    state.router.coordinator().replace(&key, value).map(Json)
}

async fn patch_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Document>, CoreError> {
    let Json(value) = body.map_err(|e| CoreError::malformed(e.body_text()))?;
    state.router.coordinator().patch(&key, value).map(Json)
}

async fn delete_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>, CoreError> {
    let deleted = state.router.coordinator().delete(&key)?;
    Ok(Json(DeleteResponse { deleted }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_server::{Server, ServerConfig};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_rest_round_trip() {
        let server = Server::new(ServerConfig::default()).unwrap();
        let app = server.router();

        let (status, body) = send(&app, "POST", "/r/rooms/1", Some(json!({"a": 1}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], 1);

        let (_, body) = send(&app, "PATCH", "/r/rooms/1", Some(json!({"b": 2}))).await;
        assert_eq!(body["value"], json!({"a": 1, "b": 2}));

        let (status, body) = send(&app, "GET", "/r/rooms/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], 2);

        let (_, body) = send(&app, "GET", "/", None).await;
        assert_eq!(body["keys"], json!(["rooms/1"]));

        let (_, body) = send(&app, "GET", "/r/rooms/*", None).await;
        assert_eq!(body.as_array().map(Vec::len), Some(1));

        let (status, body) = send(&app, "DELETE", "/r/rooms/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], 1);
    }

    #[tokio::test]
    async fn test_rest_errors() {
        let server = Server::new(ServerConfig::default()).unwrap();
        let app = server.router();

        let (status, body) = send(&app, "GET", "/r/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");

        let (status, _) = send(&app, "DELETE", "/r/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let request = Request::builder()
            .method("POST")
            .uri("/r/a")
            .header("content-type", "application/json")
            .body(Body::from("{broken"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
