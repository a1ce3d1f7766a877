//! Application wiring: router construction and the SSE stream.

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::Extension,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::get,
};
use tokio_stream::{StreamExt, wrappers::BroadcastStream};
use tower::ServiceBuilder;

use crate::config::Config;
use services::{AppServices, build_services};

pub async fn build_app(config: Config) -> Router {
    let services = build_services(config.expiry_sweep_interval);
    let config = Arc::new(config);

    // Everything except /health requires a resolved principal.
    let protected = Router::new()
        .route("/whoami", get(routes::system::whoami))
        .route("/stream", get(stream))
        .nest("/baskets", routes::baskets::router())
        .nest("/discovery", routes::discovery::router())
        .nest("/orders", routes::orders::router())
        .layer(Extension(services))
        .layer(Extension(config))
        .layer(axum::middleware::from_fn(
            crate::middleware::principal_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}

/// SSE fan-out for the external notification collaborator. Lossy broadcast;
/// a slow consumer misses messages rather than backpressuring the core.
async fn stream(
    Extension(services): Extension<Arc<AppServices>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx().subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(m) => {
            let data = serde_json::to_string(&m.payload).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(m.topic).data(data)))
        }
        Err(_) => None, // lagged; skip
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
