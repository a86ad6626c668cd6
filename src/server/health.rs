//! Health check endpoint.
//!
//! Always answers 200 while the process is up; the body says whether the
//! broker subscription is live, so a probe can tell "running" from "useful".

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use super::AppState;
use crate::broker::ConnectorState;

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// `ok` while subscribed, `degraded` otherwise.
    pub status: &'static str,
    pub connector: ConnectorState,
    pub in_flight: usize,
    pub capacity: usize,
}

/// Health check handler.
///
/// ```ignore
/// GET /health HTTP/1.1
///
/// HTTP/1.1 200 OK
/// Content-Type: application/json
///
/// {"status":"ok","connector":"subscribed","in_flight":1,"capacity":4}
/// ```
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthReport> {
    let connector = state.connector_state();
    let status = match connector {
        ConnectorState::Subscribed => "ok",
        ConnectorState::Connected | ConnectorState::Disconnected => "degraded",
    };
    Json(HealthReport {
        status,
        connector,
        in_flight: state.in_flight(),
        capacity: state.capacity(),
    })
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tokio::sync::watch;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use super::*;
    use crate::config::AckPolicy;
    use crate::server::build_router;
    use crate::test_utils::CollectingHandler;
    use crate::worker::Dispatcher;

    async fn get_health(state: AppState) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = build_router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn dispatcher() -> Dispatcher<CollectingHandler> {
        Dispatcher::new(
            CollectingHandler::new(),
            4,
            AckPolicy::OnReceipt,
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn reports_subscribed_connector() {
        let (_tx, rx) = watch::channel(ConnectorState::Subscribed);
        let state = AppState::new(rx, dispatcher().gauge());

        let (status, body) = get_health(state).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!({
                "status": "ok",
                "connector": "subscribed",
                "in_flight": 0,
                "capacity": 4,
            })
        );
    }

    #[tokio::test]
    async fn follows_connector_state_changes() {
        let (tx, rx) = watch::channel(ConnectorState::Subscribed);
        let state = AppState::new(rx, dispatcher().gauge());
        tx.send(ConnectorState::Disconnected).unwrap();

        let (status, body) = get_health(state).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["connector"], "disconnected");
    }
}
