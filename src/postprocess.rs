//! Conversion and merge backends run once every stream is on disk.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Error, Result};

/// Turns downloaded stream files into the finished file.
#[async_trait]
pub trait PostProcessor: Send + Sync + 'static {
    /// Converts a single downloaded stream into `dest`.
    async fn convert(&self, temp: &Path, dest: &Path) -> Result<()>;

    /// Merges several downloaded streams, all living in `parts_dir`, into `dest`.
    async fn merge(&self, parts_dir: &Path, parts: &[PathBuf], dest: &Path) -> Result<()>;
}

/// Post-processing through an ffmpeg executable.
#[derive(Debug, Clone)]
pub struct FfmpegPostProcessor {
    ffmpeg: PathBuf,
}

impl Default for FfmpegPostProcessor {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegPostProcessor {
    /// Uses the ffmpeg binary at `ffmpeg`.
    #[must_use]
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    /// Arguments for converting one input into `dest`.
    #[must_use]
    pub fn convert_args(temp: &Path, dest: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            temp.to_string_lossy().into_owned(),
            dest.to_string_lossy().into_owned(),
        ]
    }

    /// Arguments for muxing every input's streams into `dest` without re-encoding.
    #[must_use]
    pub fn merge_args(parts: &[PathBuf], dest: &Path) -> Vec<String> {
        let mut args = vec!["-y".to_string(), "-loglevel".to_string(), "error".to_string()];
        for part in parts {
            args.push("-i".to_string());
            args.push(part.to_string_lossy().into_owned());
        }
        for i in 0..parts.len() {
            args.push("-map".to_string());
            args.push(i.to_string());
        }
        args.push("-c".to_string());
        args.push("copy".to_string());
        args.push(dest.to_string_lossy().into_owned());
        args
    }

    async fn run(&self, args: Vec<String>) -> Result<()> {
        log::debug!("Running {} {}", self.ffmpeg.display(), args.join(" "));
        let output = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                Error::PostProcess(format!("failed to run {}: {e}", self.ffmpeg.display()))
            })?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(Error::PostProcess(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr.trim()
            )))
        }
    }
}

#[async_trait]
impl PostProcessor for FfmpegPostProcessor {
    async fn convert(&self, temp: &Path, dest: &Path) -> Result<()> {
        self.run(Self::convert_args(temp, dest)).await
    }

    async fn merge(&self, parts_dir: &Path, parts: &[PathBuf], dest: &Path) -> Result<()> {
        log::debug!("Merging {} parts from {}", parts.len(), parts_dir.display());
        self.run(Self::merge_args(parts, dest)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_args_end_with_destination() {
        let args =
            FfmpegPostProcessor::convert_args(Path::new("/tmp/a.webm"), Path::new("/out/a.mp3"));
        assert_eq!(args, ["-y", "-loglevel", "error", "-i", "/tmp/a.webm", "/out/a.mp3"]);
    }

    #[test]
    fn merge_args_map_every_input() {
        let parts = vec![PathBuf::from("/tmp/v.mp4"), PathBuf::from("/tmp/a.m4a")];
        let args = FfmpegPostProcessor::merge_args(&parts, Path::new("/out/x.mkv"));
        assert_eq!(
            args,
            [
                "-y", "-loglevel", "error", "-i", "/tmp/v.mp4", "-i", "/tmp/a.m4a", "-map", "0",
                "-map", "1", "-c", "copy", "/out/x.mkv"
            ]
        );
    }

    #[tokio::test]
    async fn missing_binary_is_a_post_process_error() {
        let backend = FfmpegPostProcessor::new("/nonexistent/ffmpeg-muxdl-test");
        let err = backend
            .convert(Path::new("/tmp/in"), Path::new("/tmp/out"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PostProcess(_)));
    }
}
