//! HTTP surface: index, metrics, health and status.

use crate::{
    error::ExporterError,
    metrics::MetricPublisher,
    snapshot::SnapshotStore,
    status::render_status,
};
use axum::{
    Router,
    extract::State,
    http::{
        StatusCode,
        header,
    },
    response::{
        Html,
        IntoResponse,
        Response,
    },
    routing::get,
};
use chrono::Utc;
use std::{
    net::SocketAddr,
    sync::Arc,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{
    error,
    info,
    instrument,
};

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Dealbot Wallet Exporter</title>
    <style>
        body { font-family: Arial, sans-serif; margin: 40px; }
        h1 { color: #333; }
        a { color: #0066cc; text-decoration: none; margin-right: 20px; }
        a:hover { text-decoration: underline; }
    </style>
</head>
<body>
    <h1>Dealbot Wallet Exporter</h1>
    <p>Prometheus exporter for Synapse storage provider wallet balances</p>
    <div>
        <a href="/metrics">Metrics</a>
        <a href="/status">Status</a>
        <a href="/health">Health</a>
    </div>
</body>
</html>
"#;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SnapshotStore>,
    pub publisher: Arc<MetricPublisher>,
    pub network: Arc<str>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .route("/status", get(status))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[instrument(name = "server::metrics", skip_all, level = "trace")]
async fn metrics(State(state): State<AppState>) -> Response {
    match state.publisher.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!(error = ?e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn health() -> &'static str {
    "OK\n"
}

async fn status(State(state): State<AppState>) -> String {
    render_status(&state.network, &state.store.read(), Utc::now())
}

/// Serves [`router`] until the shutdown token is cancelled.
pub struct HttpServer {
    bind_addr: SocketAddr,
    state: AppState,
    shutdown: CancellationToken,
}

impl HttpServer {
    pub fn new(bind_addr: SocketAddr, state: AppState, shutdown: CancellationToken) -> Self {
        Self {
            bind_addr,
            state,
            shutdown,
        }
    }

    #[instrument(name = "http_server::run", skip(self), fields(bind_addr = %self.bind_addr))]
    pub async fn run(self) -> Result<(), ExporterError> {
        let listener = TcpListener::bind(self.bind_addr).await.map_err(|e| {
            error!(bind_addr = %self.bind_addr, error = ?e, "Failed to bind HTTP listener");
            ExporterError::Bind {
                addr: self.bind_addr,
                source: e,
            }
        })?;
        self.serve(listener).await
    }

    /// Serves on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ExporterError> {
        let addr = listener.local_addr().unwrap_or(self.bind_addr);
        info!(%addr, "HTTP server listening");

        let shutdown = self.shutdown.clone();
        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| {
                error!(error = ?e, "HTTP server failed");
                ExporterError::Serve { addr, source: e }
            })?;

        info!("HTTP server stopped");
        Ok(())
    }
}
