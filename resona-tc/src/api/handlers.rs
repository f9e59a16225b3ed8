//! Request handlers

use std::path::{Path as FsPath, PathBuf};

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::error::{Error, Result};
use crate::pipeline::{validate_component, TranscodeReport};

use super::AppContext;

/// Health check
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "resona-tc",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
pub struct TranscodeRequest {
    pub song_id: String,
    /// Validated source audio file on the server's filesystem
    pub source_path: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct TranscodeResponse {
    pub report: TranscodeReport,
}

/// Run the full-ladder transcode for one song
pub async fn transcode(
    State(ctx): State<AppContext>,
    Json(request): Json<TranscodeRequest>,
) -> Result<Json<TranscodeResponse>> {
    info!(song_id = %request.song_id, "transcode requested");
    let report = ctx
        .pipeline
        .transcode_song(&request.song_id, &request.source_path)
        .await?;
    Ok(Json(TranscodeResponse { report }))
}

/// Serve an HLS artifact (master manifest, media manifest, or segment)
pub async fn serve_hls(
    State(ctx): State<AppContext>,
    Path((song_id, filename)): Path<(String, String)>,
) -> Result<Response> {
    serve_artifact(&ctx.config.hls_root, &song_id, &filename).await
}

/// Serve a DASH artifact (manifest or fragment)
pub async fn serve_dash(
    State(ctx): State<AppContext>,
    Path((song_id, filename)): Path<(String, String)>,
) -> Result<Response> {
    serve_artifact(&ctx.config.dash_root, &song_id, &filename).await
}

/// Whole-file read of one artifact with an extension-derived content type
async fn serve_artifact(root: &FsPath, song_id: &str, filename: &str) -> Result<Response> {
    validate_component(song_id)?;
    validate_component(filename)?;

    let path = root.join(song_id).join(filename);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound(format!("{song_id}/{filename}")));
        }
        Err(e) => return Err(e.into()),
    };

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type_for(filename))],
        bytes,
    )
        .into_response())
}

/// Content type from the artifact filename extension
pub fn content_type_for(filename: &str) -> &'static str {
    match filename.rsplit('.').next() {
        Some("m3u8") => "application/vnd.apple.mpegurl",
        Some("ts") => "video/mp2t",
        Some("mpd") => "application/dash+xml",
        Some("m4s") | Some("mp4") => "audio/mp4",
        _ => "application/octet-stream",
    }
}
