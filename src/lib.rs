//! Chunkscribe - size-aware transcription of long audio files
//!
//! Files larger than the provider's upload limit are cut into time ranges,
//! each range is materialised as a standalone segment with ffmpeg, and the
//! per-segment transcripts are joined back together in time order.

pub mod chunking;
pub mod config;
pub mod media;
pub mod pipeline;
pub mod transcription;

use std::fmt;

// Re-export main types for easy access
pub use crate::chunking::{ChunkPlan, TimeRange};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::media::{DurationProbe, FfmpegTool, MediaFile, Segmenter};
pub use crate::pipeline::{
    LoggingObserver, PipelineStage, ProgressEvent, ProgressObserver, Transcript,
    TranscriptionPipeline,
};
pub use crate::transcription::{
    AudioUpload, OpenAiTranscriber, RetryPolicy, Transcriber, TranscriptionFault,
};

/// Result type for transcription runs
pub type Result<T> = std::result::Result<T, TranscribeError>;

/// Why a transcription request was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    Auth,
    RateLimit,
    Network,
    PayloadTooLarge,
    Malformed,
}

impl FailureCause {
    /// Causes that may succeed when the same request is sent again
    pub fn is_transient(&self) -> bool {
        matches!(self, FailureCause::RateLimit | FailureCause::Network)
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureCause::Auth => "authentication rejected",
            FailureCause::RateLimit => "rate limited",
            FailureCause::Network => "network failure",
            FailureCause::PayloadTooLarge => "payload too large",
            FailureCause::Malformed => "malformed response",
        };
        f.write_str(name)
    }
}

/// Suffix naming the failing chunk, empty when the whole file was submitted
fn chunk_label(chunk: &Option<usize>) -> String {
    match chunk {
        Some(chunk) => format!(" (chunk {})", chunk),
        None => String::new(),
    }
}

/// Error types for transcription runs.
///
/// Chunk numbers are 1-based ordinals in time order.
#[derive(thiserror::Error, Debug)]
pub enum TranscribeError {
    #[error("Missing API credential: set OPENAI_API_KEY or transcription.api_key")]
    MissingCredential,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Probe failed for {path}: {reason}")]
    ProbeFailure { path: String, reason: String },

    #[error("Segmentation failed for chunk {chunk}: {reason}")]
    SegmentationFailure { chunk: usize, reason: String },

    #[error("Transcription failed{}: {cause}: {message}", chunk_label(.chunk))]
    TranscriptionFailure {
        chunk: Option<usize>,
        cause: FailureCause,
        message: String,
    },

    #[error("{operation} timed out after {seconds}s{}", chunk_label(.chunk))]
    Timeout {
        operation: String,
        chunk: Option<usize>,
        seconds: u64,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TranscribeError {
    /// Short class name shown by the CLI
    pub fn class(&self) -> &'static str {
        match self {
            TranscribeError::MissingCredential => "MissingCredential",
            TranscribeError::InvalidInput(_) => "InvalidInput",
            TranscribeError::ProbeFailure { .. } => "ProbeFailure",
            TranscribeError::SegmentationFailure { .. } => "SegmentationFailure",
            TranscribeError::TranscriptionFailure { .. } => "TranscriptionFailure",
            TranscribeError::Timeout { .. } => "Timeout",
            TranscribeError::Configuration(_) => "Configuration",
            TranscribeError::Io(_) => "Io",
        }
    }

    /// Chunk ordinal the failure is attributed to, if any
    pub fn chunk(&self) -> Option<usize> {
        match self {
            TranscribeError::SegmentationFailure { chunk, .. } => Some(*chunk),
            TranscribeError::TranscriptionFailure { chunk, .. } => *chunk,
            TranscribeError::Timeout { chunk, .. } => *chunk,
            _ => None,
        }
    }
}
