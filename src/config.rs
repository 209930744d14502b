use std::{collections::HashSet, path::PathBuf, sync::Arc};

use axum::http::{HeaderValue, Method, header::CONTENT_DISPOSITION};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, info};
use url::Url;

use crate::error::ApiError;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_STATIC_ROOT: &str = "public";
pub const DEFAULT_YT_DLP_PATH: &str = "yt-dlp";
pub const DEFAULT_WATCH_URL_BASE: &str = "https://www.youtube.com/watch?v=";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Settings read once at startup and handed to [`crate::app::App`] by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: String,
    pub static_root: PathBuf,
    /// Normalized origins; empty means any origin may call the API.
    pub allowed_origins: Vec<String>,
    pub extractor: ExtractorConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorConfig {
    pub yt_dlp_path: PathBuf,
    pub watch_url_base: String,
    pub user_agent: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: PathBuf::from(DEFAULT_YT_DLP_PATH),
            watch_url_base: DEFAULT_WATCH_URL_BASE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ExtractorConfig {
    pub fn watch_url(&self, video_id: &str) -> String {
        format!("{}{}", self.watch_url_base, video_id)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            static_root: PathBuf::from(DEFAULT_STATIC_ROOT),
            allowed_origins: Vec::new(),
            extractor: ExtractorConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let read = |name: &str| lookup(name).and_then(|value| non_empty(&value).map(ToString::to_string));

        let bind_addr = resolve_bind_addr(read("APP_ADDR"), read("PORT"));
        let static_root = read("STATIC_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_ROOT));

        let allowed_origins = read("ALLOWED_ORIGINS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(|origin| {
                        normalize_origin(origin).ok_or_else(|| {
                            ApiError::internal(format!(
                                "Invalid origin in ALLOWED_ORIGINS: {origin}. Use values like https://example.com"
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        let defaults = ExtractorConfig::default();
        let extractor = ExtractorConfig {
            yt_dlp_path: read("YT_DLP_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.yt_dlp_path),
            watch_url_base: read("WATCH_URL_BASE").unwrap_or(defaults.watch_url_base),
            user_agent: read("EXTRACTOR_USER_AGENT").unwrap_or(defaults.user_agent),
        };

        Ok(Self {
            bind_addr,
            static_root,
            allowed_origins,
            extractor,
        })
    }

    pub fn cors_layer(&self) -> CorsLayer {
        let layer = CorsLayer::new()
            .allow_methods([Method::GET])
            .allow_headers(Any)
            .expose_headers([CONTENT_DISPOSITION]);

        if self.allowed_origins.is_empty() {
            info!("ALLOWED_ORIGINS not set, accepting requests from any origin");
            return layer.allow_origin(Any);
        }

        let allowed_origins = Arc::new(self.allowed_origins.iter().cloned().collect::<HashSet<_>>());
        info!(
            "CORS allow-list loaded with {} origin(s): {:?}",
            allowed_origins.len(),
            self.allowed_origins
        );

        layer.allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _| {
                let normalized = origin.to_str().ok().and_then(normalize_origin);
                let allowed = normalized
                    .as_ref()
                    .is_some_and(|value| allowed_origins.contains(value));
                debug!(
                    "CORS origin check raw={:?} normalized={:?} allowed={}",
                    origin, normalized, allowed
                );
                allowed
            },
        ))
    }
}

fn resolve_bind_addr(app_addr: Option<String>, port: Option<String>) -> String {
    if let Some(configured) = app_addr {
        return configured;
    }

    if let Some(port) = port.and_then(|value| value.trim().parse::<u16>().ok()) {
        return format!("0.0.0.0:{port}");
    }

    DEFAULT_BIND_ADDR.to_string()
}

pub fn normalize_origin(value: &str) -> Option<String> {
    let parsed = Url::parse(value).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let scheme = parsed.scheme();
    let default_port = match scheme {
        "http" => 80,
        "https" => 443,
        _ => return None,
    };

    if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
        return None;
    }

    match parsed.port() {
        Some(port) if port != default_port => Some(format!("{scheme}://{host}:{port}")),
        _ => Some(format!("{scheme}://{host}")),
    }
}

pub(crate) fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
