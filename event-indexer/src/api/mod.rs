//! Read API over the outcome tracker.

pub mod handlers;

use axum::{routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::outcome::OutcomeTracker;

/// Create the router serving processed and error outcomes.
pub fn create_app(tracker: Arc<OutcomeTracker>) -> Router {
    Router::new()
        .route("/events/processed", get(handlers::list_processed))
        .route("/events/errors", get(handlers::list_errors))
        .route("/health", get(handlers::health_check))
        .with_state(tracker)
}

/// Serve `app` on `addr` until `shutdown` resolves.
pub async fn run_server<F>(app: Router, addr: SocketAddr, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Read API listening on {}", addr);
    info!("- Processed events: http://{}/events/processed", addr);
    info!("- Error events: http://{}/events/errors", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
