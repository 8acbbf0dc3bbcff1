//! Configuration types for download sessions.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the download pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Minimum interval between two published progress updates for one session, in milliseconds.
    pub throttle_ms: u64,
    /// Whether temporary files are removed when conversion or merging fails.
    pub cleanup_on_post_process_error: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            throttle_ms: 500,
            cleanup_on_post_process_error: true,
        }
    }
}

impl DownloadConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the throttling window in milliseconds.
    #[must_use]
    pub const fn with_throttle_ms(mut self, ms: u64) -> Self {
        self.throttle_ms = ms;
        self
    }

    /// Sets whether temporary files are removed after a post-processing failure.
    #[must_use]
    pub const fn with_cleanup_on_post_process_error(mut self, cleanup: bool) -> Self {
        self.cleanup_on_post_process_error = cleanup;
        self
    }

    /// Returns the throttling window.
    #[must_use]
    pub const fn throttle_window(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

/// Directories used while downloading and for finished files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Directory where in-flight stream files are written.
    pub temporary_directory: PathBuf,
    /// Directory where finished files are saved.
    pub download_directory: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            temporary_directory: std::env::temp_dir().join("muxdl"),
            download_directory: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

/// Controls how destination directories are nested.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Nest finished files under a directory named after the author.
    pub create_channel_directory: bool,
    /// Nest finished files under a directory named after the playlist, when there is one.
    pub create_playlist_directory: bool,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            create_channel_directory: false,
            create_playlist_directory: true,
        }
    }
}

/// API server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API server bind address.
    pub host: String,
    /// API server port.
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9724,
        }
    }
}

/// Conversion backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessConfig {
    /// Path to the ffmpeg executable.
    pub ffmpeg_path: PathBuf,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub download: DownloadConfig,
    pub paths: PathConfig,
    pub naming: NamingConfig,
    pub api: ApiConfig,
    pub postprocess: PostProcessConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the config file location: `$MUXDL_CONFIG`, else `<config dir>/muxdl/config.toml`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("MUXDL_CONFIG") {
            PathBuf::from(path)
        } else {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("muxdl")
                .join("config.toml")
        }
    }

    /// Loads configuration from the default location, falling back to defaults
    /// when no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> crate::Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Loads configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> crate::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                log::info!("Loaded config from {}", path.display());
                Ok(toml::from_str(&contents)?)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Takes the per-session settings snapshot.
    #[must_use]
    pub fn settings(&self) -> Settings {
        Settings {
            temporary_directory: self.paths.temporary_directory.clone(),
            download_directory: self.paths.download_directory.clone(),
            create_channel_directory: self.naming.create_channel_directory,
            create_playlist_directory: self.naming.create_playlist_directory,
        }
    }
}

/// Settings read once when a session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub temporary_directory: PathBuf,
    pub download_directory: PathBuf,
    pub create_channel_directory: bool,
    pub create_playlist_directory: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_download_config() {
        let config = DownloadConfig::default();
        assert_eq!(config.throttle_ms, 500);
        assert_eq!(config.throttle_window(), Duration::from_millis(500));
        assert!(config.cleanup_on_post_process_error);
    }

    #[test]
    fn download_config_builder_pattern() {
        let config = DownloadConfig::new()
            .with_throttle_ms(50)
            .with_cleanup_on_post_process_error(false);

        assert_eq!(config.throttle_ms, 50);
        assert!(!config.cleanup_on_post_process_error);
    }

    #[test]
    fn default_path_config() {
        let config = PathConfig::default();
        assert!(config.temporary_directory.ends_with("muxdl"));
    }

    #[test]
    fn default_api_config() {
        let config = ApiConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9724);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [naming]
            create_channel_directory = true

            [paths]
            download_directory = "/media/videos"
            "#,
        )
        .unwrap();

        assert!(config.naming.create_channel_directory);
        assert!(config.naming.create_playlist_directory);
        assert_eq!(config.paths.download_directory, PathBuf::from("/media/videos"));
        assert_eq!(config.download.throttle_ms, 500);
        assert_eq!(config.api.port, 9724);
    }

    #[test]
    fn load_from_missing_file_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = AppConfig::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.download.throttle_ms, 500);
    }

    #[test]
    fn load_from_rejects_invalid_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[download\nthrottle_ms = ").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(crate::Error::Config(_))
        ));
    }

    #[test]
    fn settings_snapshot_copies_paths_and_naming() {
        let mut config = AppConfig::default();
        config.paths.temporary_directory = PathBuf::from("/tmp/x");
        config.naming.create_channel_directory = true;

        let settings = config.settings();
        assert_eq!(settings.temporary_directory, PathBuf::from("/tmp/x"));
        assert!(settings.create_channel_directory);
        assert!(settings.create_playlist_directory);
    }
}
