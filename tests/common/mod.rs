#![allow(dead_code)]

use std::{
    collections::HashMap,
    io,
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use axum::body::Bytes;
use futures::StreamExt;
use tubeproxy::{
    app::App,
    config::AppConfig,
    extractor::{
        ByteStream, EncodingDescriptor, ExtractError, Extractor, Thumbnail, VideoDetails,
        VideoInfo,
    },
};

pub const AUDIO_PAYLOAD: &[u8] = b"ID3-not-really-an-mp3-but-close-enough";
pub const VIDEO_PAYLOAD: &[u8] = b"\x00\x00\x00\x18ftypmp42-video-bytes";

/// In-memory stand-in for yt-dlp.
pub struct FakeExtractor {
    info: Mutex<Option<VideoInfo>>,
    payloads: HashMap<u32, &'static [u8]>,
    info_calls: AtomicUsize,
}

impl FakeExtractor {
    pub fn sample() -> Arc<Self> {
        Arc::new(Self {
            info: Mutex::new(Some(sample_info())),
            payloads: HashMap::from([(22, VIDEO_PAYLOAD), (140, AUDIO_PAYLOAD)]),
            info_calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            info: Mutex::new(None),
            payloads: HashMap::new(),
            info_calls: AtomicUsize::new(0),
        })
    }

    pub fn replace_formats(&self, formats: Vec<EncodingDescriptor>) {
        if let Some(info) = self.info.lock().unwrap().as_mut() {
            info.formats = formats;
        }
    }

    pub fn info_calls(&self) -> usize {
        self.info_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn get_info(&self, _video_id: &str) -> Result<VideoInfo, ExtractError> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        self.info
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ExtractError::Failed("ERROR: Video unavailable".to_string()))
    }

    async fn stream(&self, _video_id: &str, itag: u32) -> Result<ByteStream, ExtractError> {
        let chunks: Vec<io::Result<Bytes>> = match self.payloads.get(&itag) {
            Some(payload) => payload
                .chunks(7)
                .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
                .collect(),
            None => vec![Err(io::Error::other("HTTP Error 403: Forbidden"))],
        };
        Ok(futures::stream::iter(chunks).boxed())
    }
}

pub fn descriptor(
    itag: u32,
    container: &str,
    has_video: bool,
    has_audio: bool,
    quality_label: Option<&str>,
    audio_bitrate_kbps: Option<u32>,
) -> EncodingDescriptor {
    EncodingDescriptor {
        itag,
        container: container.to_string(),
        has_video,
        has_audio,
        quality_label: quality_label.map(ToString::to_string),
        audio_bitrate_kbps,
        content_length: None,
    }
}

pub fn sample_info() -> VideoInfo {
    let mut best_video = descriptor(22, "mp4", true, true, Some("1080p"), Some(192));
    best_video.content_length = Some(1_048_576);
    let mut best_audio = descriptor(140, "mp4", false, true, None, Some(128));
    best_audio.content_length = Some(1536);

    VideoInfo {
        details: VideoDetails {
            title: "Clip: The <Movie>".to_string(),
            author: "Someone".to_string(),
            length_seconds: 3725,
            thumbnails: vec![Thumbnail {
                url: "https://i.ytimg.com/vi/abc/default.jpg".to_string(),
            }],
        },
        formats: vec![
            descriptor(43, "webm", true, true, Some("2160p"), Some(192)),
            descriptor(18, "mp4", true, true, Some("360p"), Some(96)),
            best_video,
            descriptor(137, "mp4", true, false, Some("1440p"), None),
            descriptor(139, "mp4", false, true, None, Some(48)),
            best_audio,
            descriptor(251, "webm", false, true, None, Some(160)),
        ],
    }
}

pub fn app_with(extractor: Arc<FakeExtractor>, static_root: PathBuf) -> App {
    let config = AppConfig {
        static_root,
        ..AppConfig::default()
    };
    App::with_extractor(config, extractor)
}
