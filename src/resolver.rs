//! Reduces the collaborator's encoding list to the best MP4 audio+video
//! encoding and the best MP4 audio-only encoding.

use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    error::Error,
    extractor::{EncodingDescriptor, Extractor, VideoInfo},
};

pub const MP4_CONTAINER: &str = "mp4";

/// The video as shown to the picker. Lives for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSummary {
    pub title: String,
    pub author: String,
    pub duration_seconds: u64,
    pub thumbnail_url: String,
    /// At most one audio+video entry followed by at most one audio-only entry.
    pub candidate_encodings: Vec<EncodingDescriptor>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Candidates<'a> {
    pub video: Option<&'a EncodingDescriptor>,
    pub audio: Option<&'a EncodingDescriptor>,
}

/// `GET /api/video-info` response body.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VideoInfoResponse {
    pub title: String,
    pub formats: Vec<FormatResponse>,
    pub thumbnail: String,
    pub duration: u64,
    pub author: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FormatResponse {
    pub itag: u32,
    pub container: String,
    pub has_video: bool,
    pub has_audio: bool,
    pub quality: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<String>,
}

/// Numeric value of a quality label: its leading run of digits.
///
/// `"1080p"` is 1080, `"720p60"` is 720. Labels without leading digits, or
/// whose digits overflow, count as 0. Digits after the first non-digit are
/// ignored rather than concatenated, so a frame-rate suffix never outranks a
/// higher resolution (`"1080p60"` stays below `"2160p"`).
pub fn parse_quality_label(label: &str) -> u64 {
    let digits: String = label
        .trim_start()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().unwrap_or(0)
}

fn video_rank(format: &EncodingDescriptor) -> u64 {
    format
        .quality_label
        .as_deref()
        .map(parse_quality_label)
        .unwrap_or(0)
}

fn audio_rank(format: &EncodingDescriptor) -> u64 {
    format.audio_bitrate_kbps.map(u64::from).unwrap_or(0)
}

/// Highest key wins; among equal keys the earliest item wins.
fn first_max_by_key<'a, I, F>(items: I, key: F) -> Option<&'a EncodingDescriptor>
where
    I: IntoIterator<Item = &'a EncodingDescriptor>,
    F: Fn(&EncodingDescriptor) -> u64,
{
    items
        .into_iter()
        .fold(None, |best: Option<(u64, &'a EncodingDescriptor)>, item| {
            let rank = key(item);
            match best {
                Some((best_rank, _)) if best_rank >= rank => best,
                _ => Some((rank, item)),
            }
        })
        .map(|(_, item)| item)
}

pub fn select_candidates(formats: &[EncodingDescriptor]) -> Candidates<'_> {
    let mp4 = || formats.iter().filter(|format| format.container == MP4_CONTAINER);

    Candidates {
        video: first_max_by_key(mp4().filter(|format| format.is_audio_video()), video_rank),
        audio: first_max_by_key(mp4().filter(|format| format.is_audio_only()), audio_rank),
    }
}

impl VideoSummary {
    pub fn from_info(info: &VideoInfo) -> Self {
        let candidates = select_candidates(&info.formats);
        let candidate_encodings: Vec<EncodingDescriptor> = candidates
            .video
            .into_iter()
            .chain(candidates.audio)
            .cloned()
            .collect();

        Self {
            title: info.details.title.clone(),
            author: info.details.author.clone(),
            duration_seconds: info.details.length_seconds,
            thumbnail_url: info
                .details
                .thumbnails
                .first()
                .map(|thumbnail| thumbnail.url.clone())
                .unwrap_or_default(),
            candidate_encodings,
        }
    }

    pub fn to_response(&self) -> VideoInfoResponse {
        VideoInfoResponse {
            title: self.title.clone(),
            formats: self
                .candidate_encodings
                .iter()
                .map(FormatResponse::from_candidate)
                .collect(),
            thumbnail: self.thumbnail_url.clone(),
            duration: self.duration_seconds,
            author: self.author.clone(),
        }
    }
}

impl FormatResponse {
    fn from_candidate(format: &EncodingDescriptor) -> Self {
        let quality = if format.has_video {
            format
                .quality_label
                .clone()
                .unwrap_or_else(|| "Highest Quality".to_string())
        } else {
            format!("{}kbps Audio", format.audio_bitrate_kbps.unwrap_or(0))
        };

        Self {
            itag: format.itag,
            container: format.container.clone(),
            has_video: format.has_video,
            has_audio: format.has_audio,
            quality,
            content_length: format.content_length.map(|bytes| bytes.to_string()),
        }
    }
}

/// Fetches the encoding list afresh and picks the candidates.
///
/// An empty candidate list is a valid result; only a failed collaborator call
/// is an error.
pub async fn resolve(extractor: &dyn Extractor, video_id: &str) -> Result<VideoSummary, Error> {
    let info = extractor.get_info(video_id).await.map_err(|error| {
        warn!("Error fetching video info for {video_id:?}: {error}");
        Error::FetchFailure(error)
    })?;

    let summary = VideoSummary::from_info(&info);
    debug!(
        "Highest quality formats for {video_id:?}: {:?}",
        summary.candidate_encodings
    );

    Ok(summary)
}

#[cfg(test)]
pub(crate) mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::extractor::{Thumbnail, VideoDetails};

    pub(crate) fn av(itag: u32, label: Option<&str>) -> EncodingDescriptor {
        EncodingDescriptor {
            itag,
            container: MP4_CONTAINER.to_string(),
            has_video: true,
            has_audio: true,
            quality_label: label.map(ToString::to_string),
            audio_bitrate_kbps: Some(96),
            content_length: None,
        }
    }

    pub(crate) fn audio(itag: u32, kbps: Option<u32>) -> EncodingDescriptor {
        EncodingDescriptor {
            itag,
            container: MP4_CONTAINER.to_string(),
            has_video: false,
            has_audio: true,
            quality_label: None,
            audio_bitrate_kbps: kbps,
            content_length: None,
        }
    }

    fn itag(format: Option<&EncodingDescriptor>) -> Option<u32> {
        format.map(|format| format.itag)
    }

    #[test]
    fn quality_label_uses_leading_digits() {
        assert_eq!(parse_quality_label("1080p"), 1080);
        assert_eq!(parse_quality_label("720p60"), 720);
        assert_eq!(parse_quality_label("144p HDR"), 144);
        assert_eq!(parse_quality_label("hd720"), 0);
        assert_eq!(parse_quality_label(""), 0);
        assert_eq!(parse_quality_label("99999999999999999999999p"), 0);
        assert!(parse_quality_label("1080p60") < parse_quality_label("2160p"));
    }

    #[test]
    fn picks_highest_quality_video() {
        let formats = vec![av(18, Some("360p")), av(22, Some("720p")), av(37, Some("480p"))];
        assert_eq!(itag(select_candidates(&formats).video), Some(22));
    }

    #[test]
    fn video_ties_go_to_first_in_input_order() {
        let formats = vec![av(1, Some("720p")), av(2, Some("720p60")), av(3, None), av(4, None)];
        assert_eq!(itag(select_candidates(&formats).video), Some(1));

        let unlabeled = vec![av(3, None), av(4, Some("garbage"))];
        assert_eq!(itag(select_candidates(&unlabeled).video), Some(3));
    }

    #[test]
    fn picks_highest_bitrate_audio_with_missing_as_zero() {
        let formats = vec![audio(139, Some(48)), audio(140, Some(128)), audio(141, None)];
        assert_eq!(itag(select_candidates(&formats).audio), Some(140));

        let unknown = vec![audio(7, None), audio(8, Some(0))];
        assert_eq!(itag(select_candidates(&unknown).audio), Some(7));
    }

    #[test]
    fn ignores_non_mp4_and_video_only_encodings() {
        let mut webm = av(43, Some("2160p"));
        webm.container = "webm".to_string();
        let mut video_only = av(137, Some("1080p"));
        video_only.has_audio = false;
        let mut webm_audio = audio(251, Some(160));
        webm_audio.container = "webm".to_string();

        let formats = vec![webm, video_only, webm_audio, av(18, Some("360p"))];
        let candidates = select_candidates(&formats);
        assert_eq!(itag(candidates.video), Some(18));
        assert_eq!(itag(candidates.audio), None);
    }

    #[test]
    fn missing_categories_are_not_an_error() {
        let only_audio = [audio(140, Some(128))];
        let candidates = select_candidates(&only_audio);
        assert_eq!(candidates.video, None);
        assert_eq!(itag(candidates.audio), Some(140));
        assert_eq!(select_candidates(&[]), Candidates::default());
    }

    #[test]
    fn summary_orders_video_before_audio() {
        let info = VideoInfo {
            details: VideoDetails {
                title: "Clip".to_string(),
                author: "Someone".to_string(),
                length_seconds: 65,
                thumbnails: vec![
                    Thumbnail {
                        url: "https://img/1.jpg".to_string(),
                    },
                    Thumbnail {
                        url: "https://img/2.jpg".to_string(),
                    },
                ],
            },
            formats: vec![audio(140, Some(128)), av(22, Some("1080p"))],
        };

        let summary = VideoSummary::from_info(&info);
        let itags: Vec<u32> = summary.candidate_encodings.iter().map(|f| f.itag).collect();
        assert_eq!(itags, vec![22, 140]);
        assert_eq!(summary.thumbnail_url, "https://img/1.jpg");
        assert_eq!(summary.duration_seconds, 65);
    }

    #[test]
    fn response_uses_wire_field_names() {
        let mut video = av(22, Some("1080p"));
        video.content_length = Some(1_048_576);
        let summary = VideoSummary {
            title: "Clip".to_string(),
            author: "Someone".to_string(),
            duration_seconds: 5,
            thumbnail_url: "https://img/1.jpg".to_string(),
            candidate_encodings: vec![video, audio(140, Some(128)), av(18, None)],
        };

        let json = serde_json::to_value(summary.to_response()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "title": "Clip",
                "formats": [
                    {"itag": 22, "container": "mp4", "hasVideo": true, "hasAudio": true,
                     "quality": "1080p", "contentLength": "1048576"},
                    {"itag": 140, "container": "mp4", "hasVideo": false, "hasAudio": true,
                     "quality": "128kbps Audio"},
                    {"itag": 18, "container": "mp4", "hasVideo": true, "hasAudio": true,
                     "quality": "Highest Quality"}
                ],
                "thumbnail": "https://img/1.jpg",
                "duration": 5,
                "author": "Someone"
            })
        );
    }
}
