//! Client side of the format picker.
//!
//! Fetches `/api/video-info`, validates the payload against a declared
//! schema, and offers exactly two choices: the best MP4 and the best audio.
//! Downloading itself is left to whatever follows the returned URL.

use std::fmt;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::resolver::MP4_CONTAINER;

pub const VIDEO_OPTION_LABEL: &str = "Highest Quality MP4";
pub const AUDIO_OPTION_LABEL: &str = "Highest Quality MP3";
const SERVER_ERROR_FALLBACK: &str = "Failed to fetch video info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FormatChoice {
    Video,
    Audio,
}

impl FormatChoice {
    pub fn label(self) -> &'static str {
        match self {
            Self::Video => VIDEO_OPTION_LABEL,
            Self::Audio => AUDIO_OPTION_LABEL,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Video => "mp4",
            Self::Audio => "mp3",
        }
    }
}

impl fmt::Display for FormatChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

/// The payload did not have the shape the picker can work with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientDataError {
    #[error("Invalid format data received")]
    InvalidData,
    #[error("No valid formats available for this video")]
    NoValidFormats,
}

#[derive(Debug, thiserror::Error)]
pub enum PickerError {
    #[error("No video ID provided")]
    MissingVideoId,
    #[error("{0}")]
    Server(String),
    #[error("Failed to load video information")]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Data(#[from] ClientDataError),
    #[error("No {0} format available")]
    Unavailable(FormatChoice),
    #[error("Invalid server URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LooseInteger {
    Number(u64),
    Text(String),
}

impl LooseInteger {
    fn value(&self) -> Option<u64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }
}

/// One entry of `formats` as sent by the server.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FormatEntry {
    itag: Option<LooseInteger>,
    container: Option<String>,
    has_video: Option<bool>,
    has_audio: Option<bool>,
    quality: Option<String>,
    content_length: Option<LooseInteger>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickerFormat {
    pub itag: u32,
    pub container: String,
    pub has_video: bool,
    pub has_audio: bool,
    pub quality: Option<String>,
    pub content_length: Option<u64>,
}

impl FormatEntry {
    fn into_format(self) -> Option<PickerFormat> {
        let itag = self
            .itag
            .as_ref()
            .and_then(LooseInteger::value)
            .and_then(|itag| u32::try_from(itag).ok())
            .filter(|itag| *itag != 0)?;
        let container = self.container.filter(|container| !container.is_empty())?;

        Some(PickerFormat {
            itag,
            container,
            has_video: self.has_video?,
            has_audio: self.has_audio?,
            quality: self.quality,
            content_length: self.content_length.as_ref().and_then(LooseInteger::value),
        })
    }
}

impl PickerFormat {
    fn is_offerable(&self) -> bool {
        self.container == MP4_CONTAINER
            && ((self.has_video && self.has_audio) || (!self.has_video && self.has_audio))
    }
}

/// What the picker shows after a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickerView {
    pub video_id: String,
    pub title: String,
    pub author: Option<String>,
    pub duration_seconds: u64,
    pub thumbnail: Option<String>,
    pub formats: Vec<PickerFormat>,
}

impl PickerView {
    pub fn from_payload(video_id: &str, payload: &Value) -> Result<Self, ClientDataError> {
        let entries = payload
            .get("formats")
            .and_then(Value::as_array)
            .ok_or(ClientDataError::InvalidData)?;

        let formats: Vec<PickerFormat> = entries
            .iter()
            .filter_map(|entry| {
                let format = serde_json::from_value::<FormatEntry>(entry.clone())
                    .ok()
                    .and_then(FormatEntry::into_format);
                if format.is_none() {
                    debug!("Discarding invalid format entry: {entry}");
                }
                format
            })
            .filter(PickerFormat::is_offerable)
            .collect();

        if formats.is_empty() {
            return Err(ClientDataError::NoValidFormats);
        }

        let text = |key: &str| {
            payload
                .get(key)
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
                .map(ToString::to_string)
        };

        Ok(Self {
            video_id: video_id.to_string(),
            title: text("title").unwrap_or_else(|| "Untitled".to_string()),
            author: text("author"),
            duration_seconds: payload
                .get("duration")
                .and_then(|value| value.as_u64().or_else(|| value.as_f64().map(|v| v.max(0.0) as u64)))
                .unwrap_or(0),
            thumbnail: text("thumbnail"),
            formats,
        })
    }

    pub fn options(&self) -> [FormatChoice; 2] {
        [FormatChoice::Video, FormatChoice::Audio]
    }

    /// The retained entry bound to `choice`, if the server offered one.
    pub fn option(&self, choice: FormatChoice) -> Option<&PickerFormat> {
        self.formats.iter().find(|format| match choice {
            FormatChoice::Video => format.has_video,
            FormatChoice::Audio => !format.has_video,
        })
    }

    pub fn metadata_line(&self) -> String {
        metadata_line(self.author.as_deref(), self.duration_seconds)
    }
}

pub fn metadata_line(author: Option<&str>, duration_seconds: u64) -> String {
    format!(
        "{} • {}",
        author.filter(|author| !author.is_empty()).unwrap_or("Unknown"),
        format_duration(duration_seconds)
    )
}

/// Caption of the download action once a format is selected.
pub fn download_label(format: &PickerFormat) -> String {
    let quality = format
        .quality
        .as_deref()
        .filter(|quality| !quality.is_empty())
        .unwrap_or("Best Quality");
    let size = format_file_size(format.content_length);

    if size.is_empty() {
        format!("Download {quality}")
    } else {
        format!("Download {quality} ({size})")
    }
}

pub fn download_url(base: &Url, video_id: &str, itag: u32) -> Result<Url, url::ParseError> {
    let mut url = base.join("/api/download")?;
    url.query_pairs_mut()
        .append_pair("v", video_id)
        .append_pair("itag", &itag.to_string());
    Ok(url)
}

/// Reads the `v` parameter of a page location, or takes a bare id as is.
pub fn video_id_from_location(location: &str) -> Option<String> {
    let location = location.trim();
    if location.is_empty() {
        return None;
    }

    match Url::parse(location) {
        Ok(url) => url
            .query_pairs()
            .find(|(key, _)| key == "v")
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty()),
        Err(_) if !location.contains(['?', '/', '&', '=']) => Some(location.to_string()),
        Err(_) => None,
    }
}

/// Binary-prefixed size with one decimal, or `""` when unknown or zero.
pub fn format_file_size(bytes: Option<u64>) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    let Some(bytes) = bytes.filter(|bytes| *bytes > 0) else {
        return String::new();
    };

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    let rounded = (size * 10.0).round() / 10.0;
    format!("{rounded:.1} {}", UNITS[unit])
}

/// `m:ss`, or `h:mm:ss` from one hour up.
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

/// Name declared by a `Content-Disposition` header, preferring `filename*`.
pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    let mut plain = None;

    for part in header_parameters(header) {
        let Some((name, value)) = part.split_once('=') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();

        if name.eq_ignore_ascii_case("filename*") {
            let encoded = value
                .split_once("''")
                .map(|(_, encoded)| encoded)
                .unwrap_or(value);
            if let Ok(decoded) = urlencoding::decode(encoded) {
                return Some(decoded.into_owned());
            }
        } else if name.eq_ignore_ascii_case("filename") {
            plain = Some(unquote(value));
        }
    }

    plain.filter(|name| !name.is_empty())
}

/// Splits on `;` outside quoted strings.
fn header_parameters(header: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (index, character) in header.char_indices() {
        match character {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                parts.push(header[start..index].trim());
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(header[start..].trim());

    parts
}

fn unquote(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .map(|rest| rest.strip_suffix('"').unwrap_or(rest))
    else {
        return value.to_string();
    };

    let mut unquoted = String::with_capacity(inner.len());
    let mut characters = inner.chars();
    while let Some(character) = characters.next() {
        if character == '\\' {
            if let Some(next) = characters.next() {
                unquoted.push(next);
            }
        } else {
            unquoted.push(character);
        }
    }
    unquoted
}

/// HTTP client for the picker flow.
#[derive(Debug, Clone)]
pub struct Picker {
    client: reqwest::Client,
    base_url: Url,
}

impl Picker {
    pub fn new(base_url: Url) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// Resolves the video named by `location` with a single request.
    pub async fn initialize(&self, location: &str) -> Result<PickerView, PickerError> {
        let video_id = video_id_from_location(location).ok_or(PickerError::MissingVideoId)?;

        let mut url = self.base_url.join("/api/video-info")?;
        url.query_pairs_mut().append_pair("v", &video_id);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        let payload = serde_json::from_str::<Value>(&body).ok();

        if !status.is_success() {
            let message = payload
                .as_ref()
                .and_then(|payload| payload.get("error"))
                .and_then(Value::as_str)
                .filter(|message| !message.is_empty())
                .unwrap_or(SERVER_ERROR_FALLBACK);
            return Err(PickerError::Server(message.to_string()));
        }

        let payload = payload.ok_or(ClientDataError::InvalidData)?;
        Ok(PickerView::from_payload(&video_id, &payload)?)
    }

    /// Where the download action sends the user for `choice`.
    pub fn download_url(&self, view: &PickerView, choice: FormatChoice) -> Result<Url, PickerError> {
        let format = view
            .option(choice)
            .ok_or(PickerError::Unavailable(choice))?;
        Ok(download_url(&self.base_url, &view.video_id, format.itag)?)
    }
}
