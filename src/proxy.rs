use axum::{
    body::Body,
    http::{
        HeaderMap, HeaderValue,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use tracing::{error, info, warn};

use crate::{
    error::{ApiError, Error},
    extractor::{ByteStream, Extractor},
};

const FORBIDDEN_FILENAME_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const FALLBACK_TITLE: &str = "download";

/// A matched encoding whose stream has produced its first chunk.
pub struct PreparedDownload {
    pub filename: String,
    pub content_type: &'static str,
    pub body: ByteStream,
}

impl std::fmt::Debug for PreparedDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedDownload")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Declared name of the downloaded file.
///
/// The extension comes from `has_video` alone: audio-only encodings are
/// labeled `.mp3` whatever their real container is.
pub fn derive_filename(title: &str, has_video: bool) -> String {
    let sanitized: String = title
        .chars()
        .filter(|character| !FORBIDDEN_FILENAME_CHARS.contains(character))
        .collect();
    let stem = if sanitized.is_empty() {
        FALLBACK_TITLE
    } else {
        sanitized.as_str()
    };
    let extension = if has_video { "mp4" } else { "mp3" };

    format!("{stem}.{extension}")
}

pub fn content_type_for(has_video: bool) -> &'static str {
    if has_video { "video/mp4" } else { "audio/mpeg" }
}

pub fn build_content_disposition(filename: &str) -> String {
    if is_plain_header_text(filename) {
        return format!("attachment; filename=\"{filename}\"");
    }

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii_fallback(filename),
        urlencoding::encode(filename)
    )
}

fn is_plain_header_text(value: &str) -> bool {
    value
        .bytes()
        .all(|byte| (b' '..=b'~').contains(&byte) && byte != b'"' && byte != b'\\')
}

fn ascii_fallback(value: &str) -> String {
    let sanitized: String = value
        .chars()
        .map(|character| {
            if character == ' ' || (character.is_ascii_graphic() && !matches!(character, '"' | '\\')) {
                character
            } else {
                '_'
            }
        })
        .collect();

    let compact = sanitized.trim();
    if compact.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        compact.to_string()
    }
}

/// Re-resolves the video, matches `itag` and opens the encoding's stream.
///
/// Nothing from an earlier resolution is trusted. The first chunk is awaited
/// here so a stream that fails immediately can still become an error response.
pub async fn prepare_download(
    extractor: &dyn Extractor,
    video_id: &str,
    itag: &str,
) -> Result<PreparedDownload, Error> {
    let info = extractor.get_info(video_id).await.map_err(|error| {
        warn!("Error fetching video info for download of {video_id:?}: {error}");
        Error::FetchFailure(error)
    })?;

    let format = itag
        .trim()
        .parse::<u32>()
        .ok()
        .and_then(|itag| info.formats.iter().find(|format| format.itag == itag))
        .ok_or_else(|| {
            warn!("Format {itag:?} not offered for {video_id:?}");
            Error::InvalidFormat {
                itag: itag.to_string(),
            }
        })?;

    let filename = derive_filename(&info.details.title, format.has_video);
    let content_type = content_type_for(format.has_video);

    let mut stream = extractor
        .stream(video_id, format.itag)
        .await
        .map_err(|error| Error::DownloadFailed(error.to_string()))?;

    let body: ByteStream = match stream.next().await {
        Some(Ok(first)) => futures::stream::once(async move { Ok(first) })
            .chain(stream)
            .boxed(),
        Some(Err(error)) => return Err(Error::DownloadFailed(error.to_string())),
        None => futures::stream::empty().boxed(),
    };

    info!("Starting download of {filename:?} (itag {})", format.itag);
    Ok(PreparedDownload {
        filename,
        content_type,
        body,
    })
}

impl PreparedDownload {
    pub fn headers(&self) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(self.content_type));
        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_str(&build_content_disposition(&self.filename))
                .map_err(|_| ApiError::internal("Could not build the download header"))?,
        );
        Ok(headers)
    }
}

impl IntoResponse for PreparedDownload {
    fn into_response(self) -> Response {
        let headers = match self.headers() {
            Ok(headers) => headers,
            Err(error) => return error.into_response(),
        };

        let filename = self.filename;
        // Headers are committed from here on; a failure can only end the body.
        let body = self.body.map(move |chunk| {
            if let Err(error) = &chunk {
                error!("Stream error while sending {filename:?}: {error}");
            }
            chunk
        });

        (headers, Body::from_stream(body)).into_response()
    }
}
