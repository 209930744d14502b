use std::{io, pin::Pin};

use async_trait::async_trait;
use axum::body::Bytes;
use futures::Stream;

/// Bytes of one encoding, in order, as the collaborator produces them.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + 'static>>;

/// One encoding of a video as reported by the extraction collaborator.
///
/// Never mutated once produced; resolution only filters, orders and projects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingDescriptor {
    pub itag: u32,
    pub container: String,
    pub has_video: bool,
    pub has_audio: bool,
    pub quality_label: Option<String>,
    pub audio_bitrate_kbps: Option<u32>,
    pub content_length: Option<u64>,
}

impl EncodingDescriptor {
    pub fn is_audio_video(&self) -> bool {
        self.has_video && self.has_audio
    }

    pub fn is_audio_only(&self) -> bool {
        !self.has_video && self.has_audio
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Thumbnail {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoDetails {
    pub title: String,
    pub author: String,
    pub length_seconds: u64,
    pub thumbnails: Vec<Thumbnail>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoInfo {
    pub details: VideoDetails,
    pub formats: Vec<EncodingDescriptor>,
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("yt-dlp is not installed or not on PATH")]
    NotInstalled,
    #[error("could not run yt-dlp: {0}")]
    Spawn(#[source] io::Error),
    #[error("{0}")]
    Failed(String),
    #[error("unexpected yt-dlp output: {0}")]
    InvalidOutput(#[from] serde_json::Error),
}

/// The external library that talks to the video platform.
///
/// Every call goes to the platform; implementations must not cache.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn get_info(&self, video_id: &str) -> Result<VideoInfo, ExtractError>;

    async fn stream(&self, video_id: &str, itag: u32) -> Result<ByteStream, ExtractError>;
}
