//! HTTP Endpoints
//!
//! Session creation and a health check, served with axum next to the
//! WebSocket listener.
//!
//! ```text
//! POST /api/huruf/session/create   {"matchWins"?: {"green"?, "red"?}}
//!   201 {"sessionId": "..."} | 401 {"error": ...} | 500 {"error": ...}
//! GET  /health                      {"ok": true, "sessions": n}
//! ```

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::game::state::MatchWins;
use crate::network::auth::{extract_token, CreationGuard};
use crate::network::session::SessionManager;

/// Session creation route.
pub const CREATE_PATH: &str = "/api/huruf/session/create";

/// Shared handler state.
#[derive(Clone)]
pub struct HttpState {
    /// Session directory.
    pub sessions: Arc<SessionManager>,
    /// Who may create sessions.
    pub guard: Arc<dyn CreationGuard>,
}

/// Build the HTTP router.
pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(CREATE_PATH, post(create_session))
        .with_state(state)
}

async fn health(State(state): State<HttpState>) -> Json<Value> {
    Json(json!({"ok": true, "sessions": state.sessions.session_count().await}))
}

/// Create a session. The body is optional and never rejected.
async fn create_session(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let authorization = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    let cookie = headers.get(header::COOKIE).and_then(|v| v.to_str().ok());
    let token = extract_token(authorization, cookie);

    let caller = state.guard.authorize(token.as_deref()).map_err(|e| {
        warn!(error = %e, "session creation rejected");
        ApiError::unauthorized("Unauthorized")
    })?;

    let seed = match_wins_seed(&body);
    let session_id = state
        .sessions
        .create_session(seed)
        .await
        .map_err(|e| ApiError::internal(format!("failed to create session: {e}")))?;

    info!(session = %session_id, ?caller, "session created over HTTP");
    Ok((StatusCode::CREATED, Json(json!({"sessionId": session_id}))).into_response())
}

/// Read `matchWins` from a creation body.
///
/// Missing or malformed bodies give no seed; missing or non-numeric
/// counts read as zero.
fn match_wins_seed(body: &[u8]) -> Option<MatchWins> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let wins = value.get("matchWins")?.as_object()?;
    Some(MatchWins {
        green: wins.get("green").map(count).unwrap_or(0),
        red: wins.get("red").map(count).unwrap_or(0),
    })
}

fn count(value: &Value) -> u32 {
    let n = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if n.is_finite() && n > 0.0 {
        n.min(u32::MAX as f64) as u32
    } else {
        0
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, message = %self.message, "request failed");
        }
        (self.status, Json(json!({"error": self.message}))).into_response()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::questions::QuestionBank;
    use crate::game::state::SessionState;
    use crate::network::auth::{AuthConfig, JwtGuard, OpenGuard};
    use crate::network::session::SessionConfig;
    use crate::store::{MemorySnapshotStore, SnapshotStore, StoreError};

    struct FailingStore;

    impl SnapshotStore for FailingStore {
        fn save(&self, _state: &SessionState) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk full")))
        }

        fn load(&self, _session_id: &str) -> Result<Option<SessionState>, StoreError> {
            Ok(None)
        }
    }

    fn state_with(store: Arc<dyn SnapshotStore>, guard: Arc<dyn CreationGuard>) -> HttpState {
        HttpState {
            sessions: Arc::new(SessionManager::new(
                store,
                Arc::new(QuestionBank::embedded()),
                SessionConfig::default(),
            )),
            guard,
        }
    }

    fn rejected(result: Result<Response, ApiError>) -> Response {
        match result {
            Ok(response) => panic!("expected rejection, got {}", response.status()),
            Err(e) => e.into_response(),
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_match_wins_seed_parsing() {
        assert_eq!(match_wins_seed(b""), None);
        assert_eq!(match_wins_seed(b"not json"), None);
        assert_eq!(match_wins_seed(br#"{"other": 1}"#), None);
        assert_eq!(
            match_wins_seed(br#"{"matchWins": {"green": 3}}"#),
            Some(MatchWins { green: 3, red: 0 })
        );
        assert_eq!(
            match_wins_seed(br#"{"matchWins": {"green": "2", "red": -4}}"#),
            Some(MatchWins { green: 2, red: 0 })
        );
    }

    #[tokio::test]
    async fn test_create_returns_201_and_persists() {
        let store = Arc::new(MemorySnapshotStore::new());
        let state = state_with(store.clone(), Arc::new(OpenGuard));

        let response = create_session(
            State(state.clone()),
            HeaderMap::new(),
            Bytes::from_static(br#"{"matchWins": {"green": 1, "red": 2}}"#),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        let id = body["sessionId"].as_str().unwrap();
        let snapshot = store.load(id).unwrap().unwrap();
        assert_eq!(snapshot.match_wins, MatchWins { green: 1, red: 2 });

        let health = health(State(state)).await;
        assert_eq!(health.0, json!({"ok": true, "sessions": 1}));
    }

    #[tokio::test]
    async fn test_create_requires_token_when_guarded() {
        let guard = Arc::new(JwtGuard::new(AuthConfig {
            secret: Some("test-secret-key-256-bits-long!!".into()),
            ..Default::default()
        })
        .unwrap());
        let state = state_with(Arc::new(MemorySnapshotStore::new()), guard);

        let response = rejected(create_session(State(state), HeaderMap::new(), Bytes::new()).await);
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await, json!({"error": "Unauthorized"}));
    }

    #[tokio::test]
    async fn test_create_fails_when_snapshot_fails() {
        let state = state_with(Arc::new(FailingStore), Arc::new(OpenGuard));

        let response = rejected(create_session(State(state.clone()), HeaderMap::new(), Bytes::new()).await);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(state.sessions.session_count().await, 0);
    }
}
