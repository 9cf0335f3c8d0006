//! Status HTTP server for the restream supervisor
//!
//! Exposes the session status snapshot for dashboards and monitoring tools.

use axum::{extract::State, routing::get, Json, Router};
use std::net::SocketAddr;
use thiserror::Error;

use crate::status::{SessionStatus, SharedStatus};

/// Default bind address for the status endpoint
pub const DEFAULT_STATUS_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 7879);

/// Errors that can occur when running the status server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
}

/// Handler for GET /status
async fn get_status(State(status): State<SharedStatus>) -> Json<SessionStatus> {
    let snapshot = status.read().await.clone();
    Json(snapshot)
}

/// Creates the axum Router with the status endpoint
pub fn create_status_router(status: SharedStatus) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .with_state(status)
}

/// Runs the status HTTP server on `addr` until it fails
pub async fn run_status_server(status: SharedStatus, addr: SocketAddr) -> Result<(), ServerError> {
    let app = create_status_router(status);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "status endpoint listening");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressSample;
    use crate::status::{new_shared_status, SessionState};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use std::path::PathBuf;
    use tower::ServiceExt;
    use uuid::Uuid;

    async fn fetch(status: SharedStatus) -> (StatusCode, SessionStatus) {
        let response = create_status_router(status)
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let code = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let snapshot: SessionStatus =
            serde_json::from_slice(&body).expect("should deserialize to SessionStatus");
        (code, snapshot)
    }

    #[tokio::test]
    async fn test_get_status_reports_running_session() {
        let status = new_shared_status();
        let id = Uuid::new_v4();
        {
            let mut s = status.write().await;
            s.begin(
                id,
                vec![PathBuf::from("/media/a.mp4"), PathBuf::from("/media/b.mkv")],
                true,
            );
            s.current_index = Some(1);
            s.current_entry = Some(PathBuf::from("/media/b.mkv"));
            s.pid = Some(31337);
            s.launches = 2;
            s.last_progress = Some(ProgressSample {
                fps: Some(25.0),
                bitrate_kbps: Some(1902),
                speed: Some("1.01x".to_string()),
            });
        }

        let (code, snapshot) = fetch(status.clone()).await;

        assert_eq!(code, StatusCode::OK);
        assert_eq!(snapshot, status.read().await.clone());
        assert_eq!(snapshot.session_id, Some(id));
        assert_eq!(snapshot.state, SessionState::Running);
        assert_eq!(snapshot.current_index, Some(1));
    }

    #[tokio::test]
    async fn test_get_status_idle_by_default() {
        let (code, snapshot) = fetch(new_shared_status()).await;

        assert_eq!(code, StatusCode::OK);
        assert_eq!(snapshot.state, SessionState::Idle);
        assert_eq!(snapshot.session_id, None);
        assert!(snapshot.entries.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let response = create_status_router(new_shared_status())
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
