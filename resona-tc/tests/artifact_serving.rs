//! HTTP artifact-serving integration tests

mod helpers;

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use helpers::FakeEncoder;
use resona_tc::api::{create_router, AppContext};
use resona_tc::config::Config;
use resona_tc::encoder::SegmentEncoder;
use resona_tc::pipeline::TranscodePipeline;

fn test_app(root: &Path) -> (Router, Arc<Config>) {
    let config = Arc::new(Config {
        hls_root: root.join("hls"),
        dash_root: root.join("dash"),
        ..Config::default()
    });
    let pipeline = Arc::new(TranscodePipeline::new(
        FakeEncoder::new(200.0) as Arc<dyn SegmentEncoder>,
        Arc::clone(&config),
    ));
    let app = create_router(AppContext {
        config: Arc::clone(&config),
        pipeline,
    });
    (app, config)
}

async fn get(app: Router, uri: &str) -> axum::response::Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn content_type(response: &axum::response::Response) -> &str {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

#[tokio::test]
async fn health_reports_ok() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = test_app(dir.path());

    let response = get(app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("\"status\":\"ok\""));
}

#[tokio::test]
async fn serves_hls_artifacts_with_mapped_content_types() {
    let dir = tempfile::tempdir().unwrap();
    let (app, config) = test_app(dir.path());

    let song_dir = config.hls_root.join("song-1");
    tokio::fs::create_dir_all(&song_dir).await.unwrap();
    tokio::fs::write(song_dir.join("master.m3u8"), "#EXTM3U\n")
        .await
        .unwrap();
    tokio::fs::write(song_dir.join("320k_000.ts"), [0x47u8; 188])
        .await
        .unwrap();

    let response = get(app.clone(), "/streaming/hls/song-1/master.m3u8").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response), "application/vnd.apple.mpegurl");
    assert_eq!(body_string(response).await, "#EXTM3U\n");

    let response = get(app, "/streaming/hls/song-1/320k_000.ts").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response), "video/mp2t");
}

#[tokio::test]
async fn serves_dash_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let (app, config) = test_app(dir.path());

    let song_dir = config.dash_root.join("song-1");
    tokio::fs::create_dir_all(&song_dir).await.unwrap();
    tokio::fs::write(song_dir.join("manifest.mpd"), "<MPD/>")
        .await
        .unwrap();

    let response = get(app, "/streaming/dash/song-1/manifest.mpd").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response), "application/dash+xml");
}

#[tokio::test]
async fn missing_artifact_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = test_app(dir.path());

    let response = get(app, "/streaming/hls/song-1/master.m3u8").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn path_traversal_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (app, config) = test_app(dir.path());

    // A file outside the song directory that must stay unreachable
    tokio::fs::create_dir_all(&config.hls_root).await.unwrap();
    tokio::fs::write(config.hls_root.join("secret.m3u8"), "#EXTM3U\n")
        .await
        .unwrap();

    let response = get(app, "/streaming/hls/%2e%2e/secret.m3u8").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn transcode_endpoint_publishes_servable_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = test_app(dir.path());

    let request = Request::builder()
        .method("POST")
        .uri("/transcode")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            r#"{"song_id":"song-9","source_path":"/tmp/source.wav"}"#,
        ))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("\"song_id\":\"song-9\""));
    assert!(body.contains("\"segment_count\":20"));

    let response = get(app, "/streaming/hls/song-9/master.m3u8").await;
    assert_eq!(response.status(), StatusCode::OK);
    let master = body_string(response).await;
    assert!(master.starts_with("#EXTM3U\n"));
    assert!(master.contains("320k.m3u8"));
}
