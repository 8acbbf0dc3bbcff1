//! Status events published to the UI/event transport.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::media::{DownloadItem, SessionId, StreamDescriptor};

/// Lifecycle status of a download session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Progress,
    Convert,
    Finish,
    Errored,
    Cancelled,
}

impl SessionStatus {
    /// Returns true for finish, errored and cancelled.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finish | Self::Errored | Self::Cancelled)
    }
}

/// Payload of the `add-download` event, emitted once when a session starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadAdded {
    pub id: SessionId,
    pub destination: Option<PathBuf>,
    pub sources: Vec<StreamDescriptor>,
    pub size: u64,
    pub speed: u64,
    pub progress: u64,
    pub status: SessionStatus,
    pub start_timestamp: i64,
    pub video: DownloadItem,
}

impl DownloadAdded {
    /// Builds the initial payload for a freshly started session.
    #[must_use]
    pub fn new(
        id: SessionId,
        video: DownloadItem,
        sources: Vec<StreamDescriptor>,
        start_timestamp: i64,
    ) -> Self {
        Self {
            id,
            destination: None,
            sources,
            size: 1,
            speed: 0,
            progress: 0,
            status: SessionStatus::Progress,
            start_timestamp,
            video,
        }
    }
}

/// Partial update applied to a session's displayed state.
///
/// Only the fields that changed are serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_file: Option<PathBuf>,
    /// Human-readable failure cause, only present on `errored`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl DownloadPatch {
    /// `{progress, speed, size}`
    #[must_use]
    pub fn progress(progress: u64, speed: u64, size: u64) -> Self {
        Self {
            progress: Some(progress),
            speed: Some(speed),
            size: Some(size),
            ..Self::default()
        }
    }

    /// `{progress, size, status: "convert"}`
    #[must_use]
    pub fn convert(progress: u64, size: u64) -> Self {
        Self {
            progress: Some(progress),
            size: Some(size),
            status: Some(SessionStatus::Convert),
            ..Self::default()
        }
    }

    /// `{status: "finish", endTimestamp, destinationFile}`
    #[must_use]
    pub fn finish(end_timestamp: i64, destination_file: &Path) -> Self {
        Self {
            status: Some(SessionStatus::Finish),
            end_timestamp: Some(end_timestamp),
            destination_file: Some(destination_file.to_path_buf()),
            ..Self::default()
        }
    }

    /// `{status: "errored"}`
    #[must_use]
    pub fn errored(reason: Option<String>) -> Self {
        Self {
            status: Some(SessionStatus::Errored),
            reason,
            ..Self::default()
        }
    }

    /// `{status: "cancelled"}`
    #[must_use]
    pub fn cancelled() -> Self {
        Self {
            status: Some(SessionStatus::Cancelled),
            ..Self::default()
        }
    }
}

/// Events pushed from download sessions to the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum DownloadEvent {
    /// A session was accepted and started.
    AddDownload(DownloadAdded),
    /// A session's state changed.
    UpdateDownload { id: SessionId, props: DownloadPatch },
}

impl DownloadEvent {
    /// Returns the session this event belongs to.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        match self {
            Self::AddDownload(added) => added.id,
            Self::UpdateDownload { id, .. } => *id,
        }
    }

    /// Returns the status carried by this event, if it carries one.
    #[must_use]
    pub const fn status(&self) -> Option<SessionStatus> {
        match self {
            Self::AddDownload(added) => Some(added.status),
            Self::UpdateDownload { props, .. } => props.status,
        }
    }
}

/// Sending half of the session event channel.
pub type EventSender = mpsc::UnboundedSender<DownloadEvent>;

/// Receiving half of the session event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<DownloadEvent>;
