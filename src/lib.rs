//! Looks up a video's encodings through `yt-dlp`, keeps the best MP4 and the
//! best audio-only encoding, and proxies the chosen one to the browser.

pub mod app;
pub mod config;
pub mod error;
pub mod extractor;
pub mod picker;
pub mod proxy;
pub mod resolver;
pub mod routes;
pub mod ytdlp;
