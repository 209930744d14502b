use std::sync::Arc;

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::info;

use crate::{
    config::AppConfig,
    error::ApiError,
    extractor::Extractor,
    routes,
    ytdlp::YtDlp,
};

/// Per-request handle to the collaborator. Holds no mutable state.
#[derive(Clone)]
pub struct AppState {
    pub extractor: Arc<dyn Extractor>,
}

/// The server, built once at startup from its configuration.
pub struct App {
    config: AppConfig,
    extractor: Arc<dyn Extractor>,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        let extractor = Arc::new(YtDlp::new(config.extractor.clone()));
        Self::with_extractor(config, extractor)
    }

    pub fn with_extractor(config: AppConfig, extractor: Arc<dyn Extractor>) -> Self {
        Self { config, extractor }
    }

    pub fn router(&self) -> Router {
        let state = AppState {
            extractor: Arc::clone(&self.extractor),
        };

        Router::new()
            .route("/api/health", get(routes::health))
            .route("/api/video-info", get(routes::video_info))
            .route("/api/download", get(routes::download))
            .with_state(state)
            .fallback_service(ServeDir::new(&self.config.static_root))
            .layer(self.config.cors_layer())
            .layer(TraceLayer::new_for_http())
    }

    pub async fn serve(self) -> Result<(), ApiError> {
        let addr = self.config.bind_addr.clone();
        let listener = TcpListener::bind(&addr).await.map_err(|error| {
            ApiError::internal(format!("Could not bind {addr}: {error}"))
        })?;

        self.serve_on(listener).await
    }

    pub async fn serve_on(self, listener: TcpListener) -> Result<(), ApiError> {
        let router = self.router();
        if let Ok(addr) = listener.local_addr() {
            info!(
                "Server running at http://{addr} serving {:?}",
                self.config.static_root
            );
        }

        axum::serve(listener, router)
            .await
            .map_err(|error| ApiError::internal(format!("HTTP server error: {error}")))
    }
}
