//! HTTP control plane.
//!
//! A thin axum adapter over [`Supervisor`]: every route turns a path token
//! and a JSON body into one supervisor call and maps the outcome back to a
//! status code and a JSON body.

pub mod error;
pub mod handlers;

use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::supervisor::Supervisor;
use crate::{AppError, Result};

pub use error::ApiError;

/// Build the control-plane router.
pub fn router(supervisor: Supervisor) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/bots", get(handlers::list_bots))
        .route("/create/{token}", post(handlers::create_bot))
        .route("/stop/{token}", post(handlers::stop_bot))
        .route("/update/{token}", post(handlers::update_bot))
        .route("/status/{token}", post(handlers::update_status))
        .layer(middleware::from_fn(log_requests))
        .with_state(supervisor)
}

/// Record method, path, status and latency of every request.
///
/// Paths carry bot tokens, so only the route prefix is logged.
async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let route = route_prefix(request.uri().path()).to_owned();
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis();
    if status.is_server_error() {
        warn!(%method, route, status = status.as_u16(), elapsed_ms, "http request failed");
    } else {
        info!(%method, route, status = status.as_u16(), elapsed_ms, "http request");
    }
    response
}

/// First path segment, e.g. `/create` for `/create/<token>`.
fn route_prefix(path: &str) -> &str {
    match path.get(1..).and_then(|rest| rest.find('/')) {
        Some(idx) => &path[..=idx],
        None => path,
    }
}

/// Serve the control plane on `http_bind:http_port` until `ct` fires.
///
/// # Errors
///
/// Returns `AppError::Http` if the address is invalid, the port cannot be
/// bound, or the server fails.
pub async fn serve_http(supervisor: Supervisor, ct: CancellationToken) -> Result<()> {
    let config = supervisor.config();
    let bind: SocketAddr = format!("{}:{}", config.http_bind, config.http_port)
        .parse()
        .map_err(|err| {
            AppError::Http(format!(
                "invalid http address '{}:{}': {err}",
                config.http_bind, config.http_port
            ))
        })?;

    let listener = TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Http(format!("failed to bind HTTP on {bind}: {err}")))?;

    serve_http_on(listener, supervisor, ct).await
}

/// Serve the control plane on an already bound listener until `ct` fires.
///
/// # Errors
///
/// Returns `AppError::Http` if the server fails.
pub async fn serve_http_on(
    listener: TcpListener,
    supervisor: Supervisor,
    ct: CancellationToken,
) -> Result<()> {
    let local = listener
        .local_addr()
        .map_err(|err| AppError::Http(format!("listener has no local address: {err}")))?;
    info!(%local, "starting HTTP control plane");

    axum::serve(listener, router(supervisor))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Http(format!("HTTP server error: {err}")))?;

    info!("HTTP control plane shut down");
    Ok(())
}
