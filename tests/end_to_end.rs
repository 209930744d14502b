mod common;

use std::{net::SocketAddr, sync::Arc};

use pretty_assertions::assert_eq;
use tokio::net::TcpListener;
use tubeproxy::picker::{
    FormatChoice, Picker, PickerError, download_label, filename_from_content_disposition,
};
use url::Url;

use common::{AUDIO_PAYLOAD, FakeExtractor, app_with};

async fn spawn_server(extractor: Arc<FakeExtractor>) -> (SocketAddr, tempfile::TempDir) {
    let static_root = tempfile::tempdir().unwrap();
    let app = app_with(extractor, static_root.path().to_path_buf());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        app.serve_on(listener).await.unwrap();
    });

    (addr, static_root)
}

fn picker_for(addr: SocketAddr) -> Picker {
    Picker::new(Url::parse(&format!("http://{addr}/")).unwrap())
}

#[tokio::test]
async fn pick_audio_and_download_it() {
    let extractor = FakeExtractor::sample();
    let (addr, _static_root) = spawn_server(extractor.clone()).await;
    let picker = picker_for(addr);

    let view = picker
        .initialize(&format!("http://{addr}/?v=abc"))
        .await
        .unwrap();
    assert_eq!(view.formats.len(), 2);
    assert_eq!(view.metadata_line(), "Someone • 1:02:05");

    let audio = view.option(FormatChoice::Audio).unwrap();
    assert_eq!(download_label(audio), "Download 128kbps Audio (1.5 KB)");
    let video = view.option(FormatChoice::Video).unwrap();
    assert_eq!(download_label(video), "Download 1080p (1.0 MB)");

    let url = picker.download_url(&view, FormatChoice::Audio).unwrap();
    let response = reqwest::get(url).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.headers()[reqwest::header::CONTENT_TYPE], "audio/mpeg");

    let filename = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .and_then(filename_from_content_disposition)
        .unwrap();
    assert!(filename.ends_with(".mp3"), "{filename}");

    let body = response.bytes().await.unwrap();
    assert_eq!(&body[..], AUDIO_PAYLOAD);

    // One resolution for the picker, one more for the download.
    assert_eq!(extractor.info_calls(), 2);
}

#[tokio::test]
async fn server_error_message_reaches_the_picker() {
    let (addr, _static_root) = spawn_server(FakeExtractor::failing()).await;

    let error = picker_for(addr).initialize("abc").await.unwrap_err();
    assert!(matches!(error, PickerError::Server(_)));
    assert_eq!(error.to_string(), "Failed to fetch video information");
}

#[tokio::test]
async fn missing_video_id_stops_before_any_request() {
    let extractor = FakeExtractor::sample();
    let (addr, _static_root) = spawn_server(extractor.clone()).await;

    let error = picker_for(addr)
        .initialize(&format!("http://{addr}/"))
        .await
        .unwrap_err();
    assert!(matches!(error, PickerError::MissingVideoId));
    assert_eq!(extractor.info_calls(), 0);
}

#[tokio::test]
async fn empty_candidate_list_is_no_valid_formats() {
    let extractor = FakeExtractor::sample();
    extractor.replace_formats(Vec::new());
    let (addr, _static_root) = spawn_server(extractor).await;

    let error = picker_for(addr).initialize("abc").await.unwrap_err();
    assert_eq!(error.to_string(), "No valid formats available for this video");
}
