//! HTTP surface over the engine, built on `warp`.
//!
//! - `GET /api/generate-rss?url=…&selector=…`: feed document, JSON error, or
//!   an SSE progress stream when the client accepts `text/event-stream`
//! - `GET /api/check-rss?url=…`: `{"rss": url | null}`
//! - `GET /api/health`

pub mod handlers;
pub mod response;
pub mod routes;

use crate::config::Config;
use crate::engine::FeedEngine;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::Filter;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<FeedEngine>,
    /// Origin used for links back to this service
    pub public_base_url: Option<String>,
    pub expose_debug: bool,
}

impl AppState {
    pub fn new(engine: Arc<FeedEngine>, config: &Config) -> Self {
        Self {
            engine,
            public_base_url: config.public_base_url.clone(),
            expose_debug: config.expose_debug,
        }
    }
}

/// Serves the API on `addr` until the process exits.
pub async fn serve(state: AppState, addr: SocketAddr) {
    let routes = routes::routes(state).with(warp::trace::request());

    tracing::info!(%addr, "Listening");
    warp::serve(routes).run(addr).await;
}
