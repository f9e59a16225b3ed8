//! HTTP surface of the transcoder service
//!
//! Serves finished streaming artifacts, accepts transcode requests, and
//! exposes a health endpoint.

pub mod handlers;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::Error;
use crate::pipeline::TranscodePipeline;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub pipeline: Arc<TranscodePipeline>,
}

/// Build the service router
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/transcode", post(handlers::transcode))
        .route(
            "/streaming/hls/:song_id/:filename",
            get(handlers::serve_hls),
        )
        .route(
            "/streaming/dash/:song_id/:filename",
            get(handlers::serve_dash),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidPath(_) => StatusCode::BAD_REQUEST,
            Error::Config(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Transcode { .. } | Error::Manifest(_) | Error::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}
