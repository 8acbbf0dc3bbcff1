//! A download session: every stream of one media item, from first byte to finished file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{DownloadConfig, Settings};
use crate::coordinator::{CompletionCoordinator, Transition};
use crate::error::{Error, Result};
use crate::events::{DownloadAdded, DownloadEvent, DownloadPatch, EventSender, SessionStatus};
use crate::fetcher::{FetchEvent, FetchEventKind, StreamFetcher, StreamSource};
use crate::fs::FileSystem;
use crate::media::{SessionId, StartRequest};
use crate::naming::{destination_path, is_valid_extension};
use crate::postprocess::PostProcessor;
use crate::progress::ProgressSnapshot;
use crate::registry::SessionRegistry;
use crate::throttle::Throttle;

/// Result of asking a session to cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The session was downloading and will stop.
    Requested,
    /// The session already entered conversion or a terminal status; nothing changes.
    AlreadyFinishing,
    /// No active session has that id.
    NotFound,
}

/// Status cell shared by a session and its handles.
type StatusCell = Arc<watch::Sender<SessionStatus>>;

/// Addressable handle to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    cancel: CancellationToken,
    status: StatusCell,
}

impl SessionHandle {
    pub(crate) const fn new(id: SessionId, cancel: CancellationToken, status: StatusCell) -> Self {
        Self { id, cancel, status }
    }

    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Latest status. Terminal statuses are only reported after cleanup finished.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Stops the session if it is still downloading.
    ///
    /// Once conversion has started the request is ignored and the session runs to
    /// completion.
    pub fn cancel(&self) -> CancelOutcome {
        let mut outcome = CancelOutcome::AlreadyFinishing;
        // Checked under the cell's lock so it cannot interleave with `enter_convert`.
        self.status.send_if_modified(|status| {
            if *status == SessionStatus::Progress {
                self.cancel.cancel();
                outcome = CancelOutcome::Requested;
            }
            false
        });
        if outcome == CancelOutcome::AlreadyFinishing {
            log::debug!("Ignoring cancel for session {} in {:?}", self.id, self.status());
        }
        outcome
    }

    /// Waits until the session has reached a terminal status and cleaned up.
    pub async fn wait(&self) -> SessionStatus {
        let mut status = self.status.subscribe();
        let reached = status.wait_for(|s| s.is_terminal()).await.map(|s| *s);
        reached.unwrap_or_else(|_| *status.borrow())
    }
}

/// Moves a downloading session to `convert` unless a cancel got there first.
fn enter_convert(status: &watch::Sender<SessionStatus>, cancel: &CancellationToken) -> bool {
    status.send_if_modified(|status| {
        if cancel.is_cancelled() || *status != SessionStatus::Progress {
            false
        } else {
            *status = SessionStatus::Convert;
            true
        }
    })
}

/// Collaborators shared by every session a [`Downloader`](crate::Downloader) starts.
pub struct SessionContext<F: FileSystem> {
    pub settings: Settings,
    pub config: DownloadConfig,
    pub source: Arc<dyn StreamSource>,
    pub post: Arc<dyn PostProcessor>,
    pub fs: Arc<F>,
    pub events: EventSender,
    pub registry: SessionRegistry,
}

/// How the download phase ended.
enum Ending {
    Converting(ProgressSnapshot),
    Failed(String),
    Cancelled,
}

/// One user-initiated download of one or more streams of a media item.
pub struct DownloadSession<F: FileSystem> {
    id: SessionId,
    request: StartRequest,
    ctx: SessionContext<F>,
    cancel: CancellationToken,
    status: StatusCell,
    temp_dir: PathBuf,
}

impl<F: FileSystem> DownloadSession<F> {
    /// Registers a new session, publishes `add-download` and starts fetching in the
    /// background. Returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoStreams`] if the request names no streams, or
    /// [`Error::InvalidExtension`] if its format or a stream container is not a plain
    /// file extension.
    pub fn start(request: StartRequest, ctx: SessionContext<F>) -> Result<SessionHandle> {
        if request.sources.is_empty() {
            return Err(Error::NoStreams);
        }
        let extensions = std::iter::once(&request.format)
            .chain(request.sources.iter().map(|s| &s.container));
        for ext in extensions {
            if !is_valid_extension(ext) {
                return Err(Error::InvalidExtension(ext.clone()));
            }
        }

        let id = SessionId::new();
        let (status, _) = watch::channel(SessionStatus::Progress);
        let status = Arc::new(status);
        let cancel = CancellationToken::new();
        let handle = SessionHandle::new(id, cancel.clone(), Arc::clone(&status));

        log::info!(
            "Session {id} started: \"{}\" ({} stream(s), {})",
            request.video.title,
            request.sources.len(),
            request.format
        );

        ctx.registry.insert(handle.clone());
        let _ = ctx.events.send(DownloadEvent::AddDownload(DownloadAdded::new(
            id,
            request.video.clone(),
            request.sources.clone(),
            chrono::Utc::now().timestamp_millis(),
        )));

        let temp_dir = ctx.settings.temporary_directory.join(id.to_string());
        let session = Self {
            id,
            request,
            ctx,
            cancel,
            status,
            temp_dir,
        };
        tokio::spawn(session.run());

        Ok(handle)
    }

    fn publish(&self, props: DownloadPatch) {
        let _ = self.ctx.events.send(DownloadEvent::UpdateDownload { id: self.id, props });
    }

    async fn run(self) {
        if let Err(e) = self.ctx.fs.create_dir_all(&self.temp_dir).await {
            log::error!(
                "Session {}: cannot create {}: {e}",
                self.id,
                self.temp_dir.display()
            );
            self.terminate(SessionStatus::Errored, &[], DownloadPatch::errored(Some(e.to_string())))
                .await;
            return;
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let fetchers: Vec<StreamFetcher> = self
            .request
            .sources
            .iter()
            .enumerate()
            .map(|(index, descriptor)| {
                let path = self
                    .temp_dir
                    .join(format!("{}.{}", Uuid::new_v4(), descriptor.container));
                StreamFetcher::spawn(
                    index,
                    descriptor.clone(),
                    path,
                    Arc::clone(&self.ctx.source),
                    Arc::clone(&self.ctx.fs),
                    tx.clone(),
                )
            })
            .collect();
        drop(tx);

        let paths: Vec<PathBuf> = fetchers.iter().map(|f| f.path().to_path_buf()).collect();
        let mut coordinator = CompletionCoordinator::new(fetchers.len(), std::time::Instant::now());
        let mut throttle = Throttle::new(self.ctx.config.throttle_window());

        let ending = loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    if coordinator.on_cancel() == Transition::Cancel {
                        break Ending::Cancelled;
                    }
                }
                event = rx.recv() => {
                    let Some(FetchEvent { stream, kind }) = event else {
                        break Ending::Failed("every stream stopped without finishing".to_string());
                    };
                    let transition = match kind {
                        FetchEventKind::Progress { received, estimated_size, .. } => {
                            let now = std::time::Instant::now();
                            coordinator.on_progress(stream, received, estimated_size, now)
                        }
                        FetchEventKind::End => coordinator.on_end(stream),
                        FetchEventKind::Error(cause) => coordinator.on_error(stream, &cause),
                    };
                    match transition {
                        Transition::Ignore => {}
                        Transition::Progress(snapshot) => throttle.offer(snapshot, Instant::now()),
                        Transition::Convert(snapshot) => break Ending::Converting(snapshot),
                        Transition::Abort { stream, cause } => {
                            log::error!("Session {}: stream {stream} failed: {cause}", self.id);
                            break Ending::Failed(cause);
                        }
                        Transition::Cancel => break Ending::Cancelled,
                    }
                }
                () = sleep_until(throttle.deadline()) => {
                    if let Some(snapshot) = throttle.take_due(Instant::now()) {
                        self.publish(DownloadPatch::progress(
                            snapshot.progress,
                            snapshot.speed,
                            snapshot.size,
                        ));
                    }
                }
            }
        };
        throttle.clear();

        match ending {
            Ending::Converting(snapshot) if enter_convert(&self.status, &self.cancel) => {
                join_all(fetchers.into_iter().map(StreamFetcher::join)).await;
                self.post_process(&mut coordinator, snapshot, &paths).await;
            }
            Ending::Converting(_) | Ending::Cancelled => {
                log::info!("Session {} cancelled", self.id);
                self.teardown(fetchers).await;
                self.terminate(SessionStatus::Cancelled, &paths, DownloadPatch::cancelled())
                    .await;
            }
            Ending::Failed(cause) => {
                self.teardown(fetchers).await;
                self.terminate(SessionStatus::Errored, &paths, DownloadPatch::errored(Some(cause)))
                    .await;
            }
        }
    }

    /// Aborts every fetcher and waits for all of them to release their files.
    async fn teardown(&self, fetchers: Vec<StreamFetcher>) {
        for fetcher in &fetchers {
            fetcher.destroy();
        }
        join_all(fetchers.into_iter().map(StreamFetcher::join)).await;
    }

    async fn post_process(
        &self,
        coordinator: &mut CompletionCoordinator,
        snapshot: ProgressSnapshot,
        paths: &[PathBuf],
    ) {
        self.publish(DownloadPatch::convert(snapshot.progress, snapshot.size));

        let dest = destination_path(
            &self.ctx.settings,
            &self.request.video,
            self.request.playlist.as_ref(),
            &self.request.format,
        );
        log::info!("Session {}: post-processing into {}", self.id, dest.display());

        let result = self.run_backend(paths, &dest).await;
        match coordinator.on_post_processed(result.is_ok()) {
            Some(SessionStatus::Finish) => {
                log::info!("Session {} finished: {}", self.id, dest.display());
                let patch = DownloadPatch::finish(chrono::Utc::now().timestamp_millis(), &dest);
                self.terminate(SessionStatus::Finish, paths, patch).await;
            }
            _ => {
                let reason = result.err().map(|e| e.to_string());
                log::error!(
                    "Session {}: {}",
                    self.id,
                    reason.as_deref().unwrap_or("post-processing failed")
                );
                let cleanup: &[PathBuf] = if self.ctx.config.cleanup_on_post_process_error {
                    paths
                } else {
                    log::warn!("Session {}: keeping {}", self.id, self.temp_dir.display());
                    &[]
                };
                self.terminate(SessionStatus::Errored, cleanup, DownloadPatch::errored(reason))
                    .await;
            }
        }
    }

    async fn run_backend(&self, paths: &[PathBuf], dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.ctx.fs.create_dir_all(parent).await?;
        }
        match paths {
            [single] => self.ctx.post.convert(single, dest).await,
            parts => self.ctx.post.merge(&self.temp_dir, parts, dest).await,
        }
    }

    /// Removes temporary files, unregisters the session and publishes its final status.
    async fn terminate(&self, status: SessionStatus, paths: &[PathBuf], patch: DownloadPatch) {
        for path in paths {
            if let Err(e) = self.ctx.fs.remove_file(path).await {
                log::warn!("Session {}: failed to remove {}: {e}", self.id, path.display());
            }
        }
        if !paths.is_empty() {
            if let Err(e) = self.ctx.fs.remove_empty_dir(&self.temp_dir).await {
                log::warn!(
                    "Session {}: failed to remove {}: {e}",
                    self.id,
                    self.temp_dir.display()
                );
            }
        }

        self.ctx.registry.remove(self.id);
        self.status.send_replace(status);
        self.publish(patch);
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
