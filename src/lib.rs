//! muxdl - concurrent multi-stream media downloads.
//!
//! A download session fetches every selected stream of one media item in
//! parallel, reports a single throttled progress figure for all of them, and
//! hands the finished files to a conversion (one stream) or merge (several
//! streams) backend. Any stream failure or a cancel tears the whole session
//! down and removes its partial files.
//!
//! # Example
//!
//! ```no_run
//! use muxdl::{AppConfig, Downloader, DownloadEvent, StartRequest};
//!
//! # async fn example() -> muxdl::Result<()> {
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let downloader = Downloader::from_config(AppConfig::load()?, tx)?;
//!
//! let request = StartRequest::from_manifest("clip.json".as_ref())?;
//! let session = downloader.start_download(request)?;
//!
//! while let Some(event) = rx.recv().await {
//!     if let DownloadEvent::UpdateDownload { props, .. } = &event {
//!         println!("{props:?}");
//!     }
//!     if event.status().is_some_and(|s| s.is_terminal()) {
//!         break;
//!     }
//! }
//! println!("session {} ended as {:?}", session.id(), session.wait().await);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod coordinator;
pub mod download;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod format;
pub mod fs;
pub mod media;
pub mod naming;
pub mod postprocess;
pub mod progress;
pub mod registry;
pub mod session;
pub mod throttle;

#[cfg(feature = "api")]
pub mod api;
#[cfg(feature = "cli")]
pub mod cli;

// Re-export main types for convenience
pub use config::{AppConfig, DownloadConfig, Settings};
pub use download::Downloader;
pub use error::{Error, FetchError, Result};
pub use events::{DownloadEvent, DownloadPatch, SessionStatus};
pub use fetcher::{HttpSource, StreamBody, StreamSource};
pub use format::{format_bytes, format_duration, format_speed};
pub use fs::{FileSystem, TokioFileSystem};
pub use media::{DownloadItem, PlaylistContext, SessionId, StartRequest, StreamDescriptor};
pub use naming::{destination_path, sanitize_title};
pub use postprocess::{FfmpegPostProcessor, PostProcessor};
pub use registry::SessionRegistry;
pub use session::{CancelOutcome, SessionHandle};
