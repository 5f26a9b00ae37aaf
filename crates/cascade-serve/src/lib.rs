use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;

use cascade_core::CascadeError;
use cascade_engine::{
    CancelResponse, ReprioritizeService, RespondRequest, RespondResponse, StartRequest,
    StartResponse, StatusResponse,
};

// ── Config ──

pub struct ServeConfig {
    pub bind: String,
    pub port: u16,
}

// ── App State ──

type AppState = Arc<ReprioritizeService>;

// ── Error ──

struct AppError(CascadeError);

impl AppError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            CascadeError::NotFound(_) => StatusCode::NOT_FOUND,
            CascadeError::Conflict { .. } => StatusCode::CONFLICT,
            CascadeError::Validation(_) | CascadeError::UnknownDecision(_) => {
                StatusCode::BAD_REQUEST
            }
            CascadeError::Classification(_) | CascadeError::Analysis { .. } => {
                StatusCode::BAD_GATEWAY
            }
            CascadeError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, kind = self.0.kind(), "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string(), "kind": self.0.kind() });
        (status, Json(body)).into_response()
    }
}

impl From<CascadeError> for AppError {
    fn from(err: CascadeError) -> Self {
        Self(err)
    }
}

// ── Server ──

pub async fn serve(service: Arc<ReprioritizeService>, config: ServeConfig) -> anyhow::Result<()> {
    let app = router(service);
    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "cascade HTTP server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the router (for testing without binding to a port).
pub fn router(service: Arc<ReprioritizeService>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/reprioritize", post(start))
        .route("/api/reprioritize/{session_id}/respond", post(respond))
        .route("/api/reprioritize/{session_id}/retry", post(retry))
        .route("/api/reprioritize/{session_id}/status", get(status))
        .route("/api/reprioritize/{session_id}", delete(cancel))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

// ── Health ──

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

// ── POST /api/reprioritize ──

async fn start(
    State(service): State<AppState>,
    Json(body): Json<StartRequest>,
) -> Result<Json<StartResponse>, AppError> {
    Ok(Json(service.start(body).await?))
}

// ── POST /api/reprioritize/{session_id}/respond ──

async fn respond(
    State(service): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<RespondRequest>,
) -> Result<Json<RespondResponse>, AppError> {
    Ok(Json(service.respond(&session_id, body).await?))
}

// ── POST /api/reprioritize/{session_id}/retry ──

async fn retry(
    State(service): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<RespondResponse>, AppError> {
    let checkpoint = service.retry(&session_id).await?;
    Ok(Json(RespondResponse::Checkpoint { checkpoint }))
}

// ── GET /api/reprioritize/{session_id}/status ──

async fn status(
    State(service): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    Ok(Json(service.status(&session_id)?))
}

// ── DELETE /api/reprioritize/{session_id} ──

async fn cancel(
    State(service): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<CancelResponse>, AppError> {
    Ok(Json(service.cancel(&session_id).await?))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use cascade_core::Level;
    use cascade_engine::testing::{proposal, ScriptedAnalyzer, ScriptedClassifier};
    use cascade_engine::{CascadeConfig, ManualClock};
    use tower::ServiceExt;

    struct Fixture {
        tmp: tempfile::TempDir,
        app: Router,
    }

    fn fixture(classifier: ScriptedClassifier) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let docs = tmp.path().join("plans");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join("week-feb14-20.md"), "# Week\n- gym").unwrap();
        let config = CascadeConfig {
            state_dir: tmp.path().join("state"),
            ..Default::default()
        };
        let service = ReprioritizeService::new(
            config.paths(),
            Arc::new(classifier),
            Arc::new(ScriptedAnalyzer::new(vec![Ok(proposal(
                "Gym dropped",
                "# Week\n- no gym",
                false,
            ))])),
            config.session_ttl(),
            Arc::new(ManualClock::default()),
        )
        .unwrap();
        Fixture {
            tmp,
            app: router(Arc::new(service)),
        }
    }

    fn start_body(f: &Fixture) -> String {
        serde_json::json!({
            "requestText": "skip gym",
            "documentDirectory": f.tmp.path().join("plans"),
            "conversationId": "chat-1",
            "analyzerCredential": "sk-test",
        })
        .to_string()
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<String>,
    ) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let f = fixture(ScriptedClassifier::returning(Level::Week));
        let (status, json) = send(&f.app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["ok"], true);
    }

    #[tokio::test]
    async fn full_session_over_http() {
        let f = fixture(ScriptedClassifier::returning(Level::Week));
        let (status, json) = send(&f.app, "POST", "/api/reprioritize", Some(start_body(&f))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["checkpoint"]["level"], "week");
        let id = json["sessionId"].as_str().unwrap().to_string();

        let (status, json) =
            send(&f.app, "GET", &format!("/api/reprioritize/{id}/status"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["isWaiting"], true);
        assert_eq!(json["currentLevel"], "week");
        assert_eq!(json["appliedChangeCount"], 0);

        let (status, json) = send(
            &f.app,
            "POST",
            &format!("/api/reprioritize/{id}/respond"),
            Some(r#"{"decision":"approve"}"#.into()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "completed");
        assert_eq!(json["appliedChanges"][0]["level"], "week");
        assert_eq!(json["appliedChanges"][0]["summary"], "Gym dropped");
    }

    #[tokio::test]
    async fn conflict_is_409() {
        let f = fixture(ScriptedClassifier::returning(Level::Week));
        send(&f.app, "POST", "/api/reprioritize", Some(start_body(&f))).await;
        let (status, json) = send(&f.app, "POST", "/api/reprioritize", Some(start_body(&f))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["kind"], "conflict");
    }

    #[tokio::test]
    async fn unknown_decision_is_400() {
        let f = fixture(ScriptedClassifier::returning(Level::Week));
        let (_, json) = send(&f.app, "POST", "/api/reprioritize", Some(start_body(&f))).await;
        let id = json["sessionId"].as_str().unwrap().to_string();
        let (status, json) = send(
            &f.app,
            "POST",
            &format!("/api/reprioritize/{id}/respond"),
            Some(r#"{"decision":"maybe"}"#.into()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["kind"], "unknown_decision");
    }

    #[tokio::test]
    async fn missing_session_is_404() {
        let f = fixture(ScriptedClassifier::returning(Level::Week));
        let (status, json) =
            send(&f.app, "GET", "/api/reprioritize/ses_nope/status", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["kind"], "not_found");

        let (status, _) = send(&f.app, "DELETE", "/api/reprioritize/ses_nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn classification_failure_is_502() {
        let f = fixture(ScriptedClassifier::failing("garbage"));
        let (status, json) = send(&f.app, "POST", "/api/reprioritize", Some(start_body(&f))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["kind"], "classification");
    }

    #[tokio::test]
    async fn blank_start_is_400() {
        let f = fixture(ScriptedClassifier::returning(Level::Week));
        let (status, json) = send(&f.app, "POST", "/api/reprioritize", Some("{}".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["kind"], "validation");
    }

    #[tokio::test]
    async fn cancel_restores_and_returns_cancelled() {
        let f = fixture(ScriptedClassifier::returning(Level::Week));
        let (_, json) = send(&f.app, "POST", "/api/reprioritize", Some(start_body(&f))).await;
        let id = json["sessionId"].as_str().unwrap().to_string();
        let (status, json) =
            send(&f.app, "DELETE", &format!("/api/reprioritize/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "cancelled");
        let week = std::fs::read_to_string(f.tmp.path().join("plans/week-feb14-20.md")).unwrap();
        assert_eq!(week, "# Week\n- gym");
    }
}
