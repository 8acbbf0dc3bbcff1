//! Single-stream transfers into temporary files.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::fs::FileSystem;
use crate::media::StreamDescriptor;

/// An opened remote stream.
pub struct StreamBody {
    /// Size estimate known before the first byte, if any.
    pub size: Option<u64>,
    pub chunks: BoxStream<'static, Result<Bytes, FetchError>>,
}

/// Opens the byte stream behind a descriptor.
#[async_trait]
pub trait StreamSource: Send + Sync + 'static {
    /// Starts transferring the variant described by `descriptor`.
    async fn open(&self, descriptor: &StreamDescriptor) -> Result<StreamBody, FetchError>;
}

/// Fetches stream variants over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    /// Creates a source with a pooled client.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new() -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }

    /// Creates a source around an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StreamSource for HttpSource {
    async fn open(&self, descriptor: &StreamDescriptor) -> Result<StreamBody, FetchError> {
        let response = self
            .client
            .get(&descriptor.url)
            .send()
            .await?
            .error_for_status()?;

        let size = descriptor.declared_size.or_else(|| response.content_length());
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(FetchError::from))
            .boxed();

        Ok(StreamBody { size, chunks })
    }
}

/// What a running fetcher reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchEventKind {
    /// More bytes landed on disk.
    Progress {
        delta: u64,
        received: u64,
        estimated_size: u64,
    },
    /// The whole stream was written.
    End,
    /// The transfer stopped early.
    Error(FetchError),
}

/// A fetcher event tagged with the stream's position in the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchEvent {
    pub stream: usize,
    pub kind: FetchEventKind,
}

/// One running stream transfer.
///
/// Exactly one of `End` or `Error` is reported, after any number of `Progress` events.
pub struct StreamFetcher {
    index: usize,
    path: PathBuf,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl StreamFetcher {
    /// Spawns the transfer of `descriptor` into `path`.
    pub fn spawn<F: FileSystem>(
        index: usize,
        descriptor: StreamDescriptor,
        path: PathBuf,
        source: Arc<dyn StreamSource>,
        fs: Arc<F>,
        events: mpsc::UnboundedSender<FetchEvent>,
    ) -> Self {
        let token = CancellationToken::new();
        let task = {
            let token = token.clone();
            let path = path.clone();
            tokio::spawn(async move {
                let work = transfer(
                    index,
                    &descriptor,
                    &path,
                    source.as_ref(),
                    fs.as_ref(),
                    &events,
                );
                let result = tokio::select! {
                    res = work => res,
                    () = token.cancelled() => Err(FetchError::Cancelled),
                };

                let kind = match result {
                    Ok(()) => FetchEventKind::End,
                    Err(e) => {
                        if !e.is_cancelled() {
                            log::warn!("Stream {} ({}) failed: {e}", index, descriptor.variant_id);
                        }
                        FetchEventKind::Error(e)
                    }
                };
                let _ = events.send(FetchEvent { stream: index, kind });
            })
        };

        Self {
            index,
            path,
            token,
            task,
        }
    }

    /// Temporary file this fetcher writes to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Aborts the transfer; it then reports [`FetchError::Cancelled`]. Safe to call repeatedly.
    pub fn destroy(&self) {
        self.token.cancel();
    }

    /// Waits until the transfer task has exited and released its file.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            log::error!("Stream {} task panicked: {e}", self.index);
        }
    }
}

async fn transfer<F: FileSystem>(
    index: usize,
    descriptor: &StreamDescriptor,
    path: &Path,
    source: &dyn StreamSource,
    fs: &F,
    events: &mpsc::UnboundedSender<FetchEvent>,
) -> Result<(), FetchError> {
    let mut body = source.open(descriptor).await?;
    let mut file = fs.create_file(path).await?;

    let mut received = 0u64;
    let mut estimated_size = body.size.unwrap_or(0);

    while let Some(chunk) = body.chunks.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;

        let delta = chunk.len() as u64;
        received += delta;
        estimated_size = estimated_size.max(received);
        let _ = events.send(FetchEvent {
            stream: index,
            kind: FetchEventKind::Progress {
                delta,
                received,
                estimated_size,
            },
        });
    }

    file.flush().await?;
    Ok(())
}
