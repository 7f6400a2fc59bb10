//! Remote speech-to-text capability

pub mod openai;
pub mod retry;

pub use openai::OpenAiTranscriber;
pub use retry::RetryPolicy;

use async_trait::async_trait;
use std::fmt;
use std::path::Path;

use crate::media::MediaFile;
use crate::FailureCause;

/// A rejected or failed transcription request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionFault {
    pub cause: FailureCause,
    pub message: String,
}

impl TranscriptionFault {
    pub fn new(cause: FailureCause, message: impl Into<String>) -> Self {
        Self {
            cause,
            message: message.into(),
        }
    }
}

impl fmt::Display for TranscriptionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.cause, self.message)
    }
}

impl std::error::Error for TranscriptionFault {}

/// Contents of one media file, ready to submit
#[derive(Debug, Clone, Default)]
pub struct AudioUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl AudioUpload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Read a whole file from disk
    pub async fn read(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::new(MediaFile::new(path).file_name(), bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Submits one media file and returns its transcript text
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, upload: AudioUpload) -> Result<String, TranscriptionFault>;

    /// Model identifier sent with each request
    fn model(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upload_reads_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("chunk-01.mp3");
        tokio::fs::write(&path, b"ID3fake").await.unwrap();

        let upload = AudioUpload::read(&path).await.unwrap();
        assert_eq!(upload.file_name, "chunk-01.mp3");
        assert_eq!(upload.len(), 7);
        assert!(!upload.is_empty());
    }

    #[test]
    fn test_fault_display() {
        let fault = TranscriptionFault::new(FailureCause::RateLimit, "slow down");
        assert_eq!(fault.to_string(), "rate limited: slow down");
    }
}
