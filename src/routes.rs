use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use crate::{
    app::AppState,
    error::{ApiError, Error},
    extractor::ExtractError,
    proxy::{self, PreparedDownload},
    resolver::{self, VideoInfoResponse},
};

#[derive(Debug, Deserialize)]
pub struct VideoInfoQuery {
    v: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    v: Option<String>,
    itag: Option<String>,
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

pub async fn video_info(
    State(state): State<AppState>,
    Query(query): Query<VideoInfoQuery>,
) -> Result<Json<VideoInfoResponse>, ApiError> {
    let video_id = require_video_id(query.v).map_err(ApiError::from_video_info)?;

    let summary = resolver::resolve(state.extractor.as_ref(), &video_id)
        .await
        .map_err(ApiError::from_video_info)?;

    Ok(Json(summary.to_response()))
}

pub async fn download(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<PreparedDownload, ApiError> {
    let video_id = require_video_id(query.v).map_err(ApiError::from_download)?;
    let itag = query.itag.unwrap_or_default();

    proxy::prepare_download(state.extractor.as_ref(), &video_id, &itag)
        .await
        .map_err(|error| {
            if let Error::DownloadFailed(_) = &error {
                tracing::error!("Download error for {video_id:?}: {error}");
            }
            ApiError::from_download(error)
        })
}

// There is nothing to resolve without an id.
fn require_video_id(video_id: Option<String>) -> Result<String, Error> {
    video_id
        .as_deref()
        .and_then(crate::config::non_empty)
        .map(ToString::to_string)
        .ok_or_else(|| {
            tracing::warn!("Request without a video id");
            Error::FetchFailure(ExtractError::Failed("missing video id".to_string()))
        })
}
