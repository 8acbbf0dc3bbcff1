//! Resolved media descriptions handed to a download session.
//!
//! These values come from the catalog resolver and are treated as immutable
//! snapshots once a session starts.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One selectable encoded variant of the source media.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDescriptor {
    /// Opaque stream selector assigned by the resolver.
    pub variant_id: String,
    /// Container of the variant, used as the temporary file's extension.
    pub container: String,
    /// Where the variant's bytes are fetched from.
    pub url: String,
    /// Size announced by the resolver, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_size: Option<u64>,
}

/// The media item a session downloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadItem {
    /// Canonical page URL of the item.
    pub url: String,
    #[serde(default)]
    pub thumbnail_url: String,
    /// Duration in seconds.
    #[serde(default)]
    pub duration: f64,
    pub title: String,
    #[serde(default)]
    pub author: String,
}

/// Playlist the item was selected from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistContext {
    pub title: String,
}

/// Body of a start command, and the format of CLI manifest files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    #[serde(default)]
    pub playlist: Option<PlaylistContext>,
    /// Container of the finished file.
    pub format: String,
    pub video: DownloadItem,
    pub sources: Vec<StreamDescriptor>,
}

impl StartRequest {
    /// Reads a start request from a JSON manifest file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid manifest.
    pub fn from_manifest(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

/// Identifier of a download session, unique for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_request_parses_camel_case() {
        let json = r#"{
            "playlist": { "title": "Road trip" },
            "format": "mp4",
            "video": {
                "url": "https://media.example/watch?v=abc",
                "thumbnailUrl": "https://media.example/abc.jpg",
                "duration": 212,
                "title": "Highway",
                "author": "Someone"
            },
            "sources": [
                { "variantId": "137", "container": "mp4", "url": "https://cdn.example/v", "declaredSize": 1000 },
                { "variantId": "140", "container": "m4a", "url": "https://cdn.example/a" }
            ]
        }"#;

        let request: StartRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.playlist.unwrap().title, "Road trip");
        assert_eq!(request.video.thumbnail_url, "https://media.example/abc.jpg");
        assert!((request.video.duration - 212.0).abs() < f64::EPSILON);
        assert_eq!(request.sources.len(), 2);
        assert_eq!(request.sources[0].declared_size, Some(1000));
        assert_eq!(request.sources[1].declared_size, None);
    }

    #[test]
    fn session_id_round_trips_through_strings() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert_ne!(SessionId::new(), id);
        assert!("not-a-uuid".parse::<SessionId>().is_err());
    }

    #[test]
    fn session_id_serializes_as_plain_string() {
        let id = SessionId::new();
        assert_eq!(serde_json::to_string(&id).unwrap(), format!("\"{id}\""));
    }
}
