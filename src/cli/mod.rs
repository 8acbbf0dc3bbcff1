//! CLI mode: download the items described by manifest files with progress bars.

mod progress;

use std::collections::HashMap;
use std::path::PathBuf;

use indicatif::{MultiProgress, ProgressBar};
use tokio::sync::mpsc;

use crate::events::{DownloadEvent, DownloadPatch, SessionStatus};
use crate::format::{format_elapsed_ms, format_speed};
use crate::media::{SessionId, StartRequest};
use crate::{AppConfig, Downloader};

use progress::{SessionOutcome, make_progress_bar, print_summary};

/// Display state of one running session.
struct Tracked {
    title: String,
    bar: ProgressBar,
    started_ms: i64,
    progress: u64,
}

impl Tracked {
    fn apply(&mut self, props: &DownloadPatch) {
        if let Some(size) = props.size {
            self.bar.set_length(size.max(1));
        }
        if let Some(progress) = props.progress {
            self.progress = progress;
            self.bar.set_position(progress);
        }
        if let Some(speed) = props.speed {
            self.bar.set_prefix(format_speed(speed));
        }
        if props.status == Some(SessionStatus::Convert) {
            self.bar.set_prefix("converting");
        }
    }

    fn finish(self, props: DownloadPatch) -> SessionOutcome {
        let status = props.status.unwrap_or(SessionStatus::Errored);
        match status {
            SessionStatus::Finish => self.bar.finish_and_clear(),
            _ => self.bar.abandon(),
        }
        SessionOutcome {
            title: self.title,
            status,
            bytes: self.progress,
            elapsed: props
                .end_timestamp
                .map(|end| format_elapsed_ms(self.started_ms, end)),
            destination: props.destination_file,
            reason: props.reason,
        }
    }
}

/// Reads every manifest before anything starts, so a typo aborts the whole run.
fn load_manifests(paths: &[PathBuf]) -> crate::Result<Vec<StartRequest>> {
    paths
        .iter()
        .map(|path| {
            StartRequest::from_manifest(path).inspect_err(|e| {
                log::error!("Cannot read manifest {}: {e}", path.display());
            })
        })
        .collect()
}

/// Downloads every manifest concurrently.
///
/// Returns `true` when every session finished.
///
/// # Errors
///
/// Returns an error if a manifest is invalid or the downloader cannot be built.
pub async fn run(config: AppConfig, manifests: Vec<PathBuf>) -> crate::Result<bool> {
    let requests = load_manifests(&manifests)?;
    if requests.is_empty() {
        println!("Nothing to download.");
        return Ok(true);
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let downloader = Downloader::from_config(config, tx)?;
    let multi = MultiProgress::new();

    let mut titles: HashMap<SessionId, String> = HashMap::new();
    let mut outcomes = Vec::new();
    for request in requests {
        let title = request.video.title.clone();
        match downloader.start_download(request) {
            Ok(handle) => {
                titles.insert(handle.id(), title);
            }
            Err(e) => outcomes.push(SessionOutcome {
                title,
                status: SessionStatus::Errored,
                bytes: 0,
                elapsed: None,
                destination: None,
                reason: Some(e.to_string()),
            }),
        }
    }

    let mut tracked: HashMap<SessionId, Tracked> = HashMap::new();
    let mut remaining = titles.len();
    let mut interrupted = false;

    while remaining > 0 {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    DownloadEvent::AddDownload(added) => {
                        let title = titles.get(&added.id).cloned().unwrap_or_default();
                        let bar = multi.add(make_progress_bar(&title));
                        tracked.insert(added.id, Tracked {
                            title,
                            bar,
                            started_ms: added.start_timestamp,
                            progress: 0,
                        });
                    }
                    DownloadEvent::UpdateDownload { id, props } => {
                        if props.status.is_some_and(SessionStatus::is_terminal) {
                            if let Some(session) = tracked.remove(&id) {
                                outcomes.push(session.finish(props));
                                remaining -= 1;
                            }
                        } else if let Some(session) = tracked.get_mut(&id) {
                            session.apply(&props);
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                log::info!("Received SIGINT, cancelling downloads");
                interrupted = true;
                downloader.cancel_all();
            }
        }
    }

    multi.clear().ok();
    print_summary(&outcomes);

    Ok(outcomes.iter().all(|o| o.status == SessionStatus::Finish))
}
