//! Media probing and segmentation through ffprobe/ffmpeg

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::debug;

use crate::chunking::TimeRange;
use crate::config::ToolConfig;

/// Failure reported by an external media tool
#[derive(thiserror::Error, Debug)]
pub enum MediaToolError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("unusable output: {0}")]
    Output(String),
}

/// A media file on disk
#[derive(Debug, Clone)]
pub struct MediaFile {
    path: PathBuf,
}

impl MediaFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size on disk, queried on demand
    pub async fn size_bytes(&self) -> std::io::Result<u64> {
        Ok(tokio::fs::metadata(&self.path).await?.len())
    }

    /// Extension including the leading dot, or empty
    pub fn dotted_extension(&self) -> String {
        self.path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default()
    }

    /// File name used when uploading
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string())
    }
}

/// Reports the playback length of a media file
#[async_trait]
pub trait DurationProbe: Send + Sync {
    /// Duration in seconds; always positive on success
    async fn duration(&self, media: &Path) -> Result<f64, MediaToolError>;
}

/// Materialises a time range of a media file as a standalone file
#[async_trait]
pub trait Segmenter: Send + Sync {
    async fn cut(&self, source: &Path, range: TimeRange, output: &Path) -> Result<(), MediaToolError>;
}

/// ffprobe/ffmpeg backed implementation of both capabilities
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for FfmpegTool {
    fn default() -> Self {
        Self::new(&ToolConfig::default())
    }
}

impl FfmpegTool {
    pub fn new(config: &ToolConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg.clone(),
            ffprobe: config.ffprobe.clone(),
        }
    }

    pub fn ffmpeg(&self) -> &Path {
        &self.ffmpeg
    }

    pub fn ffprobe(&self) -> &Path {
        &self.ffprobe
    }

    /// Arguments for cutting `range` out of `source` without re-encoding
    pub fn segment_args(source: &Path, range: TimeRange, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            source.to_string_lossy().into_owned(),
            "-ss".to_string(),
            range.start.to_string(),
            "-t".to_string(),
            range.length.to_string(),
            "-c".to_string(),
            "copy".to_string(),
            output.to_string_lossy().into_owned(),
        ]
    }
}

#[async_trait]
impl DurationProbe for FfmpegTool {
    async fn duration(&self, media: &Path) -> Result<f64, MediaToolError> {
        let program = self.ffprobe.display().to_string();
        debug!("Probing duration: {} {}", program, media.display());

        let output = tokio::process::Command::new(&self.ffprobe)
            .args(["-v", "error", "-print_format", "json", "-show_format"])
            .arg(media)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| MediaToolError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(MediaToolError::Exit {
                program,
                status: output.status,
                stderr: stderr_tail(&output.stderr),
            });
        }

        let json_str = String::from_utf8(output.stdout)
            .map_err(|e| MediaToolError::Output(format!("ffprobe output is not UTF-8: {}", e)))?;
        parse_probe_duration(&json_str)
    }
}

#[async_trait]
impl Segmenter for FfmpegTool {
    async fn cut(&self, source: &Path, range: TimeRange, output: &Path) -> Result<(), MediaToolError> {
        let program = self.ffmpeg.display().to_string();
        let args = Self::segment_args(source, range, output);
        debug!("Executing command: {} {}", program, args.join(" "));

        let result = tokio::process::Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| MediaToolError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !result.status.success() {
            return Err(MediaToolError::Exit {
                program,
                status: result.status,
                stderr: stderr_tail(&result.stderr),
            });
        }

        Ok(())
    }
}

/// Extract `format.duration` from `ffprobe -print_format json -show_format` output
pub fn parse_probe_duration(json_str: &str) -> Result<f64, MediaToolError> {
    let ffprobe_data: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| MediaToolError::Output(format!("failed to parse ffprobe output: {}", e)))?;

    let raw = &ffprobe_data["format"]["duration"];
    let duration = match raw {
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    }
    .ok_or_else(|| MediaToolError::Output(format!("no numeric duration in ffprobe output: {}", raw)))?;

    if !duration.is_finite() || duration <= 0.0 {
        return Err(MediaToolError::Output(format!(
            "duration must be positive, got {}",
            duration
        )));
    }

    Ok(duration)
}

/// Last few lines of a tool's stderr, enough to explain a failure
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(3);
    lines[start..].join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_probe_duration() {
        let json = r#"{"format": {"filename": "talk.mp3", "duration": "3671.370000"}}"#;
        assert_eq!(parse_probe_duration(json).unwrap(), 3671.37);

        let numeric = r#"{"format": {"duration": 12.5}}"#;
        assert_eq!(parse_probe_duration(numeric).unwrap(), 12.5);
    }

    #[test]
    fn test_parse_probe_duration_rejects_bad_values() {
        for json in [
            r#"{"format": {"duration": "N/A"}}"#,
            r#"{"format": {"duration": "0.000000"}}"#,
            r#"{"format": {"duration": "-3"}}"#,
            r#"{"format": {}}"#,
            r#"{}"#,
            "not json",
        ] {
            assert!(
                matches!(parse_probe_duration(json), Err(MediaToolError::Output(_))),
                "accepted {}",
                json
            );
        }
    }

    #[test]
    fn test_segment_args_copy_without_reencoding() {
        let args = FfmpegTool::segment_args(
            Path::new("/media/interview.m4a"),
            TimeRange::new(40.0, 40.0),
            Path::new("/tmp/chunk.m4a"),
        );

        assert_eq!(
            args,
            vec![
                "-y", "-i", "/media/interview.m4a", "-ss", "40", "-t", "40", "-c", "copy",
                "/tmp/chunk.m4a"
            ]
        );
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr = b"line one\n\nline two\nline three\nline four\n";
        assert_eq!(stderr_tail(stderr), "line two | line three | line four");
    }

    #[tokio::test]
    async fn test_media_file_helpers() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("episode.mp3");
        tokio::fs::write(&path, vec![0u8; 2048]).await.unwrap();

        let media = MediaFile::new(&path);
        assert_eq!(media.size_bytes().await.unwrap(), 2048);
        assert_eq!(media.dotted_extension(), ".mp3");
        assert_eq!(media.file_name(), "episode.mp3");

        assert_eq!(MediaFile::new("/tmp/noext").dotted_extension(), "");
    }

    #[tokio::test]
    async fn test_missing_ffprobe_is_spawn_error() {
        let tool = FfmpegTool::new(&ToolConfig {
            ffmpeg: PathBuf::from("/nonexistent/ffmpeg"),
            ffprobe: PathBuf::from("/nonexistent/ffprobe"),
        });

        let err = tool.duration(Path::new("missing.mp3")).await.unwrap_err();
        assert!(matches!(err, MediaToolError::Spawn { .. }));

        let err = tool
            .cut(Path::new("missing.mp3"), TimeRange::new(0.0, 1.0), Path::new("out.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaToolError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_abandoned_probe_kills_ffprobe() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let marker = temp_dir.path().join("finished");
        let script = temp_dir.path().join("ffprobe");
        std::fs::write(
            &script,
            format!("#!/bin/sh\nsleep 2\ntouch '{}'\n", marker.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let tool = FfmpegTool::new(&ToolConfig {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: script,
        });

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(500),
            tool.duration(Path::new("episode.mp3")),
        )
        .await;
        assert!(result.is_err());

        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        assert!(!marker.exists());
    }
}
