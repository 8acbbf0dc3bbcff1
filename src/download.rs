//! Command entry points: start and cancel downloads.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use crate::config::AppConfig;
use crate::error::Result;
use crate::events::EventSender;
use crate::fetcher::{HttpSource, StreamSource};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::media::{DownloadItem, PlaylistContext, SessionId, StartRequest, StreamDescriptor};
use crate::postprocess::{FfmpegPostProcessor, PostProcessor};
use crate::registry::SessionRegistry;
use crate::session::{CancelOutcome, DownloadSession, SessionContext, SessionHandle};

/// Starts download sessions and routes cancel requests to them.
///
/// Every session's `add-download` and `update-download` events go to the
/// channel given at construction.
pub struct Downloader<F: FileSystem = TokioFileSystem> {
    config: AppConfig,
    source: Arc<dyn StreamSource>,
    post: Arc<dyn PostProcessor>,
    fs: Arc<F>,
    events: EventSender,
    registry: SessionRegistry,
}

impl Downloader<TokioFileSystem> {
    /// Creates a downloader with the default file system.
    #[must_use]
    pub fn new(
        config: AppConfig,
        source: Arc<dyn StreamSource>,
        post: Arc<dyn PostProcessor>,
        events: EventSender,
    ) -> Self {
        Self::with_fs(config, source, post, TokioFileSystem, events)
    }

    /// Creates a downloader fetching over HTTP and post-processing with ffmpeg.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: AppConfig, events: EventSender) -> Result<Self> {
        let source = Arc::new(HttpSource::new()?);
        let post = Arc::new(FfmpegPostProcessor::new(config.postprocess.ffmpeg_path.clone()));
        Ok(Self::new(config, source, post, events))
    }
}

impl<F: FileSystem> Downloader<F> {
    /// Creates a downloader with a custom file system implementation.
    #[must_use]
    pub fn with_fs(
        config: AppConfig,
        source: Arc<dyn StreamSource>,
        post: Arc<dyn PostProcessor>,
        fs: F,
        events: EventSender,
    ) -> Self {
        Self {
            config,
            source,
            post,
            fs: Arc::new(fs),
            events,
            registry: SessionRegistry::new(),
        }
    }

    /// Returns the application configuration.
    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Returns the registry of active sessions.
    #[must_use]
    pub const fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Starts downloading every stream of `request.video`.
    ///
    /// Returns as soon as the session is registered; progress and the outcome arrive
    /// on the event channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoStreams`](crate::Error::NoStreams) if no stream was selected.
    pub fn start_download(&self, request: StartRequest) -> Result<SessionHandle> {
        let ctx = SessionContext {
            settings: self.config.settings(),
            config: self.config.download.clone(),
            source: Arc::clone(&self.source),
            post: Arc::clone(&self.post),
            fs: Arc::clone(&self.fs),
            events: self.events.clone(),
            registry: self.registry.clone(),
        };
        DownloadSession::start(request, ctx)
    }

    /// Starts a session from its parts and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoStreams`](crate::Error::NoStreams) if `streams` is empty.
    pub fn start(
        &self,
        item: DownloadItem,
        streams: Vec<StreamDescriptor>,
        format: &str,
        playlist: Option<PlaylistContext>,
    ) -> Result<SessionId> {
        let request = StartRequest {
            playlist,
            format: format.to_string(),
            video: item,
            sources: streams,
        };
        self.start_download(request).map(|handle| handle.id())
    }

    /// Cancels a session. Unknown or already finishing sessions are left alone.
    pub fn cancel_download(&self, id: SessionId) -> CancelOutcome {
        let outcome = self.registry.cancel(id);
        log::debug!("Cancel {id}: {outcome:?}");
        outcome
    }

    /// Cancels every session that is still downloading.
    pub fn cancel_all(&self) {
        self.registry.cancel_all();
    }

    /// Cancels every session and waits, up to `grace`, until all of them have cleaned up.
    ///
    /// Sessions already converting are allowed to finish within the same bound.
    /// Returns `false` if some session was still running when `grace` ran out.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let handles = self.registry.handles();
        if handles.is_empty() {
            return true;
        }

        log::info!("Stopping {} active session(s)", handles.len());
        for handle in &handles {
            handle.cancel();
        }
        let all_done = join_all(handles.iter().map(|handle| handle.wait()));
        let settled = tokio::time::timeout(grace, all_done).await.is_ok();
        if !settled {
            log::warn!("{} session(s) still running after {grace:?}", self.registry.len());
        }
        settled
    }
}
