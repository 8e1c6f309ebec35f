use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use slo_metrics::PrometheusSink;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const TEXT_FORMAT: &str = "text/plain; version=0.0.4";

#[derive(Clone)]
struct AppState {
    sink: PrometheusSink,
}

pub fn router(sink: PrometheusSink) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/ready", get(ok))
        .route("/healthz", get(ok))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { sink })
}

async fn metrics(State(state): State<AppState>) -> Response {
    match state.sink.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn ok() -> &'static str {
    "ok"
}

/// Accepts the `:port` shorthand as well as full socket addresses.
pub fn normalize_listen_address(address: &str) -> String {
    if address.starts_with(':') {
        format!("0.0.0.0{}", address)
    } else {
        address.to_string()
    }
}

/// Serves until `cancel` fires. A bind failure is returned to the caller.
pub async fn serve(address: String, sink: PrometheusSink, cancel: CancellationToken) -> Result<()> {
    let address = normalize_listen_address(&address);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to listen on {}", address))?;

    info!(address = %address, "Listening");

    axum::serve(listener, router(sink))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("web server failed")?;

    Ok(())
}
