use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::extractor::ExtractError;

pub const FETCH_FAILED_MESSAGE: &str = "Failed to fetch video information";
pub const INVALID_FORMAT_MESSAGE: &str = "Invalid format selected";
pub const DOWNLOAD_FAILED_MESSAGE: &str = "Download failed";

/// Failures of the resolver and the download proxy.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("could not fetch video metadata: {0}")]
    FetchFailure(#[source] ExtractError),
    #[error("format {itag:?} is not offered for this video")]
    InvalidFormat { itag: String },
    #[error("download stream failed: {0}")]
    DownloadFailed(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    /// Every `/api/video-info` failure reads the same to the caller.
    pub fn from_video_info(_error: Error) -> Self {
        Self::internal(FETCH_FAILED_MESSAGE)
    }

    pub fn from_download(error: Error) -> Self {
        match error {
            Error::InvalidFormat { .. } => Self::bad_request(INVALID_FORMAT_MESSAGE),
            Error::FetchFailure(_) | Error::DownloadFailed(_) => {
                Self::internal(DOWNLOAD_FAILED_MESSAGE)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });

        (self.status, body).into_response()
    }
}
