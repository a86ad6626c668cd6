//! HTTP server for operational endpoints.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns the connector state and in-flight workflow count

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::broker::ConnectorState;
use crate::worker::InFlightGauge;

pub mod health;

pub use health::health_handler;

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    connector: watch::Receiver<ConnectorState>,
    gauge: InFlightGauge,
}

impl AppState {
    pub fn new(connector: watch::Receiver<ConnectorState>, gauge: InFlightGauge) -> Self {
        AppState {
            inner: Arc::new(AppStateInner { connector, gauge }),
        }
    }

    pub fn connector_state(&self) -> ConnectorState {
        *self.inner.connector.borrow()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.gauge.in_flight()
    }

    pub fn capacity(&self) -> usize {
        self.inner.gauge.capacity()
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::get;

    axum::Router::new()
        .route("/health", get(health_handler))
        .with_state(app_state)
}

/// Serves the router on `listener` until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    app_state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, build_router(app_state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
