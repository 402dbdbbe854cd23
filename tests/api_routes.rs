//! HTTP surface driven through the router with a mock presentation server.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use bbb_recording::api::{self, AppState};
use bbb_recording::config::{
    DeliveryConfig, FetcherConfig, DownloaderKind, MergeConfig, RemoteStorageConfig, StorageConfig,
};
use bbb_recording::delivery::{DeliveryService, LogNotifier};
use bbb_recording::recording::{
    AssetFetcher, Combiner, FfmpegMerge, HttpTransport, PipelineConfig, RecordingPipeline,
};
use bbb_recording::storage::RecordingUploader;
use httpmock::prelude::*;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const MEETING_ID: &str = "0123456789abcdef0123456789abcdef01234567-1700000000000";

fn app(dir: &TempDir, server: &MockServer) -> Router {
    let fetcher_config = FetcherConfig {
        downloader: DownloaderKind::Http,
        timeout_seconds: 10,
        ..FetcherConfig::default()
    };
    let pipeline = RecordingPipeline::new(
        PipelineConfig {
            downloads_dir: dir.path().to_path_buf(),
            presentation_server: server.address().to_string(),
            template_dir: None,
            template_version: "3.1.1".to_string(),
        },
        AssetFetcher::new(Box::new(HttpTransport::new(&fetcher_config).unwrap())),
        Combiner::new(
            Box::new(FfmpegMerge::new(MergeConfig::default())),
            &StorageConfig::default(),
        ),
    );
    let delivery = DeliveryService::new(
        DeliveryConfig {
            download_server: "https://downloads.example.org".to_string(),
            ..DeliveryConfig::default()
        },
        Box::new(LogNotifier),
    );
    let uploader = RecordingUploader::new(&RemoteStorageConfig {
        api_url: server.base_url(),
        ..RemoteStorageConfig::default()
    })
    .unwrap();

    api::router(AppState::new(pipeline, delivery, uploader))
}

fn serve_recording_without_deskshare(server: &MockServer) {
    let base = format!("/presentation/{MEETING_ID}");
    let metadata = format!("{base}/metadata.xml");
    let webcams = format!("{base}/video/webcams.mp4");
    let deskshare = format!("{base}/deskshare/deskshare.mp4");
    server.mock(move |when, then| {
        when.method(GET).path(metadata.as_str());
        then.status(200)
            .body("<recording><start_time>1700000000000</start_time></recording>");
    });
    server.mock(move |when, then| {
        when.method(GET).path(webcams.as_str());
        then.status(200).body("webcams");
    });
    server.mock(move |when, then| {
        when.method(GET).path(deskshare.as_str());
        then.status(404);
    });
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn post_recording(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/recordings")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn version_endpoint() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start_async().await;

    let (status, body) = send(app(&dir, &server), get("/version")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "bbb-recording");
}

#[tokio::test]
async fn post_recording_downloads_packages_and_notifies() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start_async().await;
    serve_recording_without_deskshare(&server);
    let url = format!("http://bbb.example.org/playback/presentation/2.3/{MEETING_ID}");

    let (status, body) = send(
        app(&dir, &server),
        post_recording(json!({ "url": url, "name": "Weekly", "email": "ana@example.org" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["run_key"], "Weekly-00000");
    assert_eq!(body["already_existed"], false);
    assert_eq!(body["combined"], false);
    assert_eq!(
        body["download_link"],
        "https://downloads.example.org/Weekly-00000/Weekly-00000.zip"
    );
    assert_eq!(body["notification"], "sent");
    let workdir = dir.path().join("Weekly-00000");
    assert!(workdir.join("Weekly-00000.zip").is_file());
    assert!(workdir.join("EMAIL_SENT.txt").is_file());

    let (status, body) = send(
        app(&dir, &server),
        post_recording(json!({ "url": url, "name": "Weekly", "email": "ana@example.org" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["already_existed"], true);
    assert_eq!(body["combined"], Value::Null);
    assert_eq!(body["notification"], "already_sent");
}

#[tokio::test]
async fn recording_status_reports_ledger() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start_async().await;
    serve_recording_without_deskshare(&server);
    let url = format!("http://bbb.example.org/playback/presentation/2.3/{MEETING_ID}");
    send(
        app(&dir, &server),
        post_recording(json!({ "url": url, "name": "Weekly" })),
    )
    .await;

    let (status, body) = send(app(&dir, &server), get("/recordings/Weekly-00000")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["complete"], true);
    assert_eq!(body["ledger"]["meeting_id"], MEETING_ID);
    assert_eq!(body["ledger"]["downloaded_files"]["video/webcams.mp4"], true);
    assert_eq!(body["ledger"]["downloaded_files"]["deskshare/deskshare.mp4"], false);

    let (status, body) = send(app(&dir, &server), get("/recordings/Unknown-12345")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], true);
}

#[tokio::test]
async fn unparseable_url_is_not_found() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start_async().await;

    let (status, body) = send(
        app(&dir, &server),
        post_recording(json!({ "url": "https://bbb.example.org/playback/", "name": "Weekly" })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], true);
}

#[tokio::test]
async fn name_leaving_downloads_dir_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start_async().await;
    serve_recording_without_deskshare(&server);
    let url = format!("http://bbb.example.org/playback/presentation/2.3/{MEETING_ID}");

    let (status, body) = send(
        app(&dir, &server),
        post_recording(json!({ "url": url, "name": "../victim" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], true);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

    let (status, _) = send(app(&dir, &server), get("/recordings/a%5Cb")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn recipient_with_header_break_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start_async().await;
    serve_recording_without_deskshare(&server);
    let url = format!("http://bbb.example.org/playback/presentation/2.3/{MEETING_ID}");

    let (status, body) = send(
        app(&dir, &server),
        post_recording(json!({
            "url": url,
            "name": "Weekly",
            "email": "ana@example.org\r\nBcc: mallory@evil.example",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], true);
    assert!(!dir.path().join("Weekly-00000").exists());
}

#[tokio::test]
async fn upload_requires_valid_bearer() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start_async().await;

    let request = Request::builder()
        .uri("/upload/recording?folder_path=Recordings&recording_url=https://x/y.zip")
        .header("x-bearer", "not json")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app(&dir, &server), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], true);
}

#[tokio::test]
async fn upload_copies_recording_into_drive() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.path("/remote.php/dav/files/ana/Recordings");
        then.status(201);
    });
    server.mock(|when, then| {
        when.method(GET).path("/files/Weekly-00000.zip");
        then.status(200).body("zip-bytes");
    });
    let upload = server.mock(|when, then| {
        when.method(PUT)
            .path("/remote.php/dav/files/ana/Recordings/Weekly-00000.zip")
            .header("authorization", "Bearer secret");
        then.status(201);
    });

    let uri = format!(
        "/upload/recording?folder_path=Recordings&recording_url={}",
        server.url("/files/Weekly-00000.zip")
    );
    let request = Request::builder()
        .uri(uri)
        .header("x-bearer", r#"{"user": "ana", "token": "secret"}"#)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app(&dir, &server), request).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["code"], 201);
    upload.assert();
}
