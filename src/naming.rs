//! Destination file naming.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::Settings;
use crate::media::{DownloadItem, PlaylistContext};

static FORBIDDEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[/\\?%*:|"<>]"#).expect("forbidden-character pattern is valid"));

static SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" {2,}").expect("space-run pattern is valid"));

/// Name used when sanitising leaves nothing behind.
const FALLBACK_NAME: &str = "untitled";

/// Makes a title safe to use as a single path component.
///
/// Each of `/ \ ? % * : | " < >` becomes a space, runs of spaces collapse to one,
/// and leading/trailing spaces are dropped.
#[must_use]
pub fn sanitize_title(title: &str) -> String {
    let replaced = FORBIDDEN.replace_all(title, " ");
    SPACES.replace_all(&replaced, " ").trim().to_string()
}

/// A single path component: sanitised, never empty and never `.` or `..`.
fn component(name: &str) -> String {
    let clean = sanitize_title(name);
    if clean.is_empty() || clean == "." || clean == ".." {
        FALLBACK_NAME.to_string()
    } else {
        clean
    }
}

/// Returns true if `ext` can be used as a file extension as is.
///
/// Only short ASCII alphanumeric names qualify, which rules out separators and `..`.
#[must_use]
pub fn is_valid_extension(ext: &str) -> bool {
    (1..=16).contains(&ext.len()) && ext.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Builds the final path of a finished download.
///
/// `<download dir>[/<author>][/<playlist>]/<title>.<format>`; the author directory is
/// added when `create_channel_directory` is set and the playlist directory when a
/// playlist is given and `create_playlist_directory` is set.
#[must_use]
pub fn destination_path(
    settings: &Settings,
    item: &DownloadItem,
    playlist: Option<&PlaylistContext>,
    format: &str,
) -> PathBuf {
    let mut path = settings.download_directory.clone();

    if settings.create_channel_directory && !item.author.trim().is_empty() {
        path.push(component(&item.author));
    }
    if let Some(playlist) = playlist.filter(|_| settings.create_playlist_directory) {
        path.push(component(&playlist.title));
    }

    path.push(format!("{}.{format}", component(&item.title)));
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(channel: bool, playlist: bool) -> Settings {
        Settings {
            temporary_directory: PathBuf::from("/tmp/muxdl"),
            download_directory: PathBuf::from("/downloads"),
            create_channel_directory: channel,
            create_playlist_directory: playlist,
        }
    }

    fn item(title: &str, author: &str) -> DownloadItem {
        DownloadItem {
            url: "https://media.example/watch?v=abc".to_string(),
            thumbnail_url: String::new(),
            duration: 10.0,
            title: title.to_string(),
            author: author.to_string(),
        }
    }

    #[test]
    fn sanitize_replaces_forbidden_and_collapses_spaces() {
        assert_eq!(sanitize_title("My//Video:  Part*1"), "My Video Part 1");
    }

    #[test]
    fn sanitize_covers_every_forbidden_character() {
        assert_eq!(
            sanitize_title(r#"a/b\c?d%e*f:g|h"i<j>k"#),
            "a b c d e f g h i j k"
        );
    }

    #[test]
    fn sanitize_leaves_clean_titles_alone() {
        assert_eq!(sanitize_title("Plain title (live) [4K]"), "Plain title (live) [4K]");
        assert_eq!(sanitize_title("  padded  "), "padded");
    }

    #[test]
    fn destination_is_flat_by_default() {
        let path =
            destination_path(&settings(false, true), &item("Clip: One", "Band"), None, "mp4");
        assert_eq!(path, PathBuf::from("/downloads/Clip One.mp4"));
    }

    #[test]
    fn destination_nests_author_and_playlist() {
        let playlist = PlaylistContext {
            title: "Tour/2024".to_string(),
        };
        let path = destination_path(
            &settings(true, true),
            &item("Song", "The <Band>"),
            Some(&playlist),
            "mp3",
        );
        assert_eq!(path, PathBuf::from("/downloads/The Band/Tour 2024/Song.mp3"));
    }

    #[test]
    fn playlist_directory_can_be_disabled() {
        let playlist = PlaylistContext {
            title: "Tour".to_string(),
        };
        let path =
            destination_path(&settings(false, false), &item("Song", ""), Some(&playlist), "mp3");
        assert_eq!(path, PathBuf::from("/downloads/Song.mp3"));
    }

    #[test]
    fn blank_author_adds_no_directory_and_empty_title_falls_back() {
        let path = destination_path(&settings(true, true), &item("???", "  "), None, "webm");
        assert_eq!(path, PathBuf::from("/downloads/untitled.webm"));
    }

    #[test]
    fn dot_components_stay_inside_download_directory() {
        let playlist = PlaylistContext {
            title: "..".to_string(),
        };
        let path =
            destination_path(&settings(true, true), &item(".", ".."), Some(&playlist), "mp4");

        assert_eq!(path, PathBuf::from("/downloads/untitled/untitled/untitled.mp4"));
        assert!(path.starts_with("/downloads"));
        assert!(path.components().all(|c| !matches!(
            c,
            std::path::Component::ParentDir | std::path::Component::CurDir
        )));
    }

    #[test]
    fn extensions_must_be_plain() {
        assert!(is_valid_extension("mp4"));
        assert!(is_valid_extension("m4a"));
        assert!(!is_valid_extension(""));
        assert!(!is_valid_extension("mp4/../../../etc/x"));
        assert!(!is_valid_extension(".."));
        assert!(!is_valid_extension(r"mp4\x"));
        assert!(!is_valid_extension("tar.gz"));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn sanitized_titles_are_clean(title in ".*") {
                let clean = sanitize_title(&title);
                prop_assert!(!FORBIDDEN.is_match(&clean));
                prop_assert!(!clean.contains("  "));
            }

            #[test]
            fn destinations_never_leave_download_directory(
                title in ".*",
                author in ".*",
                playlist in ".*",
            ) {
                let playlist = PlaylistContext { title: playlist };
                let path = destination_path(
                    &settings(true, true),
                    &item(&title, &author),
                    Some(&playlist),
                    "mkv",
                );
                prop_assert!(path.starts_with("/downloads"));
                prop_assert!(path.components().all(|c| !matches!(
                    c,
                    std::path::Component::ParentDir | std::path::Component::CurDir
                )));
            }
        }
    }
}
