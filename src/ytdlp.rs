use std::{io::ErrorKind, process::Stdio};

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::{Child, Command},
};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::{
    config::ExtractorConfig,
    extractor::{
        ByteStream, EncodingDescriptor, ExtractError, Extractor, Thumbnail, VideoDetails,
        VideoInfo,
    },
};

const ACCEPT_LANGUAGE: &str = "Accept-Language:en-US,en;q=0.9";

/// [`Extractor`] backed by the `yt-dlp` command line tool.
#[derive(Debug, Clone)]
pub struct YtDlp {
    config: ExtractorConfig,
}

#[derive(Debug, Deserialize)]
struct YtDlpVideoInfo {
    title: Option<String>,
    uploader: Option<String>,
    channel: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<YtDlpThumbnail>,
    #[serde(default)]
    formats: Vec<YtDlpFormat>,
}

#[derive(Debug, Deserialize)]
struct YtDlpThumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    format_id: String,
    ext: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    height: Option<u32>,
    fps: Option<f32>,
    format_note: Option<String>,
    abr: Option<f32>,
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
}

impl YtDlp {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.config.yt_dlp_path);
        command
            .arg("--no-playlist")
            .arg("--no-warnings")
            .arg("--user-agent")
            .arg(&self.config.user_agent)
            .arg("--add-header")
            .arg(ACCEPT_LANGUAGE)
            .stdin(Stdio::null());
        command
    }

    async fn run(&self, mut command: Command) -> Result<std::process::Output, ExtractError> {
        let output = command.output().await.map_err(spawn_error)?;

        if !output.status.success() {
            return Err(ExtractError::Failed(run_error_message(&output.stderr)));
        }

        Ok(output)
    }
}

#[async_trait]
impl Extractor for YtDlp {
    async fn get_info(&self, video_id: &str) -> Result<VideoInfo, ExtractError> {
        let url = self.config.watch_url(video_id);
        let mut command = self.command();
        command.arg("-J").arg(&url);

        debug!("Fetching metadata for {url}");
        let output = self.run(command).await?;
        let info: YtDlpVideoInfo = serde_json::from_slice(&output.stdout)?;
        Ok(info.into_video_info())
    }

    async fn stream(&self, video_id: &str, itag: u32) -> Result<ByteStream, ExtractError> {
        let url = self.config.watch_url(video_id);
        let mut command = self.command();
        command
            .arg("--quiet")
            .arg("--no-part")
            .arg("-f")
            .arg(itag.to_string())
            .arg("-o")
            .arg("-")
            .arg(&url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(spawn_error)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractError::Failed("yt-dlp stdout was not captured".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("yt-dlp: {line}");
                }
            });
        }

        info!("Streaming itag {itag} of {url}");
        Ok(child_output_stream(ReaderStream::new(stdout), child))
    }
}

/// Forwards stdout chunks and turns a failed exit into a trailing error.
///
/// Dropping the stream drops the child, which kills the process.
fn child_output_stream(
    reader: ReaderStream<tokio::process::ChildStdout>,
    child: Child,
) -> ByteStream {
    futures::stream::unfold(Some((reader, child)), |state| async move {
        let (mut reader, mut child) = state?;
        match reader.next().await {
            Some(Ok(chunk)) => Some((Ok(chunk), Some((reader, child)))),
            Some(Err(error)) => Some((Err(error), None)),
            None => match child.wait().await {
                Ok(status) if status.success() => None,
                Ok(status) => Some((
                    Err(std::io::Error::other(format!("yt-dlp exited with {status}"))),
                    None,
                )),
                Err(error) => Some((Err(error), None)),
            },
        }
    })
    .boxed()
}

impl YtDlpVideoInfo {
    fn into_video_info(self) -> VideoInfo {
        let mut thumbnails: Vec<Thumbnail> = self
            .thumbnails
            .into_iter()
            .map(|thumbnail| Thumbnail { url: thumbnail.url })
            .collect();
        if thumbnails.is_empty()
            && let Some(url) = self.thumbnail
        {
            thumbnails.push(Thumbnail { url });
        }

        VideoInfo {
            details: VideoDetails {
                title: self.title.unwrap_or_default(),
                author: self.uploader.or(self.channel).unwrap_or_default(),
                length_seconds: self
                    .duration
                    .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
                    .map(|seconds| seconds as u64)
                    .unwrap_or_default(),
                thumbnails,
            },
            formats: self.formats.iter().filter_map(to_descriptor).collect(),
        }
    }
}

/// Only numeric format ids are itags; storyboards and manifests are dropped.
fn to_descriptor(format: &YtDlpFormat) -> Option<EncodingDescriptor> {
    let itag = format.format_id.trim().parse::<u32>().ok()?;
    let has_video = has_video(format);

    Some(EncodingDescriptor {
        itag,
        container: container_for_ext(format.ext.as_deref()),
        has_video,
        has_audio: has_audio(format),
        quality_label: if has_video {
            quality_label(format)
        } else {
            None
        },
        audio_bitrate_kbps: format
            .abr
            .filter(|abr| abr.is_finite() && *abr > 0.0)
            .map(|abr| abr.round() as u32),
        content_length: format
            .filesize
            .or(format.filesize_approx)
            .filter(|bytes| bytes.is_finite() && *bytes > 0.0)
            .map(|bytes| bytes as u64),
    })
}

// m4a is an MP4 container holding only audio.
fn container_for_ext(ext: Option<&str>) -> String {
    match ext.map(str::to_ascii_lowercase) {
        Some(ext) if ext == "m4a" => "mp4".to_string(),
        Some(ext) => ext,
        None => String::new(),
    }
}

fn quality_label(format: &YtDlpFormat) -> Option<String> {
    match format.height {
        Some(height) => {
            let fps = format.fps.unwrap_or_default().round() as u32;
            if fps > 30 {
                Some(format!("{height}p{fps}"))
            } else {
                Some(format!("{height}p"))
            }
        }
        None => format.format_note.clone(),
    }
}

fn has_video(format: &YtDlpFormat) -> bool {
    matches!(format.vcodec.as_deref(), Some(value) if value != "none")
}

fn has_audio(format: &YtDlpFormat) -> bool {
    matches!(format.acodec.as_deref(), Some(value) if value != "none")
}

fn spawn_error(error: std::io::Error) -> ExtractError {
    if error.kind() == ErrorKind::NotFound {
        ExtractError::NotInstalled
    } else {
        ExtractError::Spawn(error)
    }
}

fn run_error_message(stderr: &[u8]) -> String {
    let message = String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("yt-dlp could not complete the operation")
        .to_string();

    if message.to_ascii_lowercase().contains("unsupported url") {
        "Unsupported or invalid video URL".to_string()
    } else {
        message
    }
}
