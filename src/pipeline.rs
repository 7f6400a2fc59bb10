//! Sizing, planning, segmenting and transcribing one input file

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempPath;
use tracing::{debug, info, warn};

use crate::chunking::{self, TimeRange};
use crate::config::Config;
use crate::media::{DurationProbe, FfmpegTool, MediaFile, Segmenter};
use crate::transcription::{AudioUpload, OpenAiTranscriber, RetryPolicy, Transcriber};
use crate::{Result, TranscribeError};

/// Where a run currently is. Chunk numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineStage {
    Sizing,
    /// File fits under the threshold and is submitted as-is
    Direct,
    Probing,
    Planning,
    Segmenting { chunk: usize, total: usize },
    Transcribing { chunk: usize, total: usize },
    Joined,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Stage(PipelineStage),
    Planned { chunks: usize, chunk_seconds: f64 },
    ChunkTranscribed { chunk: usize, total: usize, characters: usize },
}

/// Receives progress events from a running pipeline
pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

/// Renders progress through `tracing`
#[derive(Debug, Clone, Default)]
pub struct LoggingObserver;

impl ProgressObserver for LoggingObserver {
    fn on_event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Stage(PipelineStage::Sizing) => info!("🔍 Checking file size..."),
            ProgressEvent::Stage(PipelineStage::Direct) => {
                info!("📤 File is within size limit. Transcribing directly...")
            }
            ProgressEvent::Stage(PipelineStage::Probing) => {
                info!("✂️ File is larger than the limit. Probing duration...")
            }
            ProgressEvent::Stage(PipelineStage::Segmenting { chunk, total }) => {
                debug!("Cutting chunk {}/{}", chunk, total)
            }
            ProgressEvent::Stage(PipelineStage::Transcribing { chunk, total }) => {
                info!("🎤 Transcribing chunk {}/{}", chunk, total)
            }
            ProgressEvent::Stage(PipelineStage::Failed) => warn!("❌ Transcription run failed"),
            ProgressEvent::Stage(stage) => debug!("Stage: {:?}", stage),
            ProgressEvent::Planned {
                chunks,
                chunk_seconds,
            } => info!("📊 Splitting into {} chunks of {:.1}s", chunks, chunk_seconds),
            ProgressEvent::ChunkTranscribed {
                chunk,
                total,
                characters,
            } => info!("✅ Chunk {}/{} done ({} characters)", chunk, total, characters),
        }
    }
}

/// Final transcript of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    text: String,
    chunk_count: usize,
    model: String,
    processing_time: Duration,
}

impl Transcript {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// Number of transcription calls made (1 when no split was needed)
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn processing_time(&self) -> Duration {
        self.processing_time
    }
}

/// Join per-chunk transcripts in time order
pub fn join_transcripts(texts: &[String]) -> String {
    texts.join("\n")
}

/// Temporary segment file, deleted when dropped
struct Segment {
    path: TempPath,
}

impl Segment {
    fn create(dir: &Path, chunk: usize, extension: &str) -> std::io::Result<Self> {
        let file = tempfile::Builder::new()
            .prefix(&format!("chunkscribe-{:03}-", chunk))
            .suffix(extension)
            .tempfile_in(dir)?;
        Ok(Self {
            path: file.into_temp_path(),
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn remove(self) {
        let path = self.path.to_path_buf();
        if let Err(e) = self.path.close() {
            warn!("Failed to remove segment {}: {}", path.display(), e);
        }
    }
}

/// Sequential transcription pipeline
pub struct TranscriptionPipeline {
    config: Config,
    probe: Box<dyn DurationProbe>,
    segmenter: Box<dyn Segmenter>,
    transcriber: Box<dyn Transcriber>,
    observer: Arc<dyn ProgressObserver>,
    retry: RetryPolicy,
}

impl TranscriptionPipeline {
    pub fn new(
        config: Config,
        probe: Box<dyn DurationProbe>,
        segmenter: Box<dyn Segmenter>,
        transcriber: Box<dyn Transcriber>,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config.transcription);
        Self {
            config,
            probe,
            segmenter,
            transcriber,
            observer: Arc::new(LoggingObserver),
            retry,
        }
    }

    /// Pipeline backed by ffmpeg/ffprobe and the configured HTTP endpoint
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let tool = FfmpegTool::new(&config.tools);
        let transcriber = OpenAiTranscriber::new(&config.transcription)?;
        Ok(Self::new(
            config,
            Box::new(tool.clone()),
            Box::new(tool),
            Box::new(transcriber),
        ))
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Transcribe `input`, splitting it first when it exceeds the threshold.
    ///
    /// Any chunk failure aborts the run; collected text is discarded and
    /// every temporary segment is removed before the error is returned.
    pub async fn run(&self, input: &Path) -> Result<Transcript> {
        let started = Instant::now();
        let result = self.execute(input, started).await;

        match &result {
            Ok(_) => self.emit_stage(PipelineStage::Done),
            Err(_) => self.emit_stage(PipelineStage::Failed),
        }
        result
    }

    async fn execute(&self, input: &Path, started: Instant) -> Result<Transcript> {
        self.check_credential()?;

        self.emit_stage(PipelineStage::Sizing);
        let media = MediaFile::new(input);
        let total_size = media.size_bytes().await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                TranscribeError::InvalidInput(format!("input not found: {}", input.display()))
            }
            _ => TranscribeError::Io(e),
        })?;
        let threshold = self.config.chunking.threshold_bytes;
        debug!("Input {} is {} bytes (threshold {})", input.display(), total_size, threshold);

        if !chunking::requires_split(total_size, threshold)? {
            self.emit_stage(PipelineStage::Direct);
            let upload = AudioUpload::read(media.path()).await?;
            let text = self.transcribe(upload, None).await?;
            return Ok(self.finish(text, 1, started));
        }

        self.emit_stage(PipelineStage::Probing);
        let duration = self
            .bounded("probe", None, self.probe.duration(media.path()))
            .await?
            .map_err(|e| TranscribeError::ProbeFailure {
                path: input.display().to_string(),
                reason: e.to_string(),
            })?;
        if !duration.is_finite() || duration <= 0.0 {
            return Err(TranscribeError::ProbeFailure {
                path: input.display().to_string(),
                reason: format!("duration must be positive, got {}", duration),
            });
        }

        self.emit_stage(PipelineStage::Planning);
        let plan = chunking::plan(total_size, threshold, duration)?.ok_or_else(|| {
            TranscribeError::InvalidInput(format!(
                "{} bytes does not exceed the {} byte threshold",
                total_size, threshold
            ))
        })?;
        self.observer.on_event(&ProgressEvent::Planned {
            chunks: plan.len(),
            chunk_seconds: plan.chunk_length(),
        });

        let segment_dir = self.config.chunking.segment_dir();
        tokio::fs::create_dir_all(&segment_dir).await?;

        let total = plan.len();
        let mut texts = Vec::with_capacity(total);
        for (index, range) in plan.iter().enumerate() {
            let chunk = index + 1;
            let text = self
                .process_chunk(&media, &segment_dir, *range, chunk, total)
                .await?;
            self.observer.on_event(&ProgressEvent::ChunkTranscribed {
                chunk,
                total,
                characters: text.chars().count(),
            });
            texts.push(text);
        }

        self.emit_stage(PipelineStage::Joined);
        Ok(self.finish(join_transcripts(&texts), total, started))
    }

    /// Cut, submit and delete one segment
    async fn process_chunk(
        &self,
        media: &MediaFile,
        segment_dir: &Path,
        range: TimeRange,
        chunk: usize,
        total: usize,
    ) -> Result<String> {
        self.emit_stage(PipelineStage::Segmenting { chunk, total });
        let segment = Segment::create(segment_dir, chunk, &media.dotted_extension())?;
        debug!(
            "Chunk {}/{}: [{:.3}s, {:.3}s) -> {}",
            chunk,
            total,
            range.start,
            range.end(),
            segment.path().display()
        );

        self.bounded(
            "segmentation",
            Some(chunk),
            self.segmenter.cut(media.path(), range, segment.path()),
        )
        .await?
        .map_err(|e| TranscribeError::SegmentationFailure {
            chunk,
            reason: e.to_string(),
        })?;

        let upload = AudioUpload::read(segment.path()).await?;
        let threshold = self.config.chunking.threshold_bytes;
        if upload.len() as u64 > threshold {
            warn!(
                "⚠️ Chunk {}/{} is {} bytes, above the {} byte threshold; submitting anyway",
                chunk,
                total,
                upload.len(),
                threshold
            );
        }

        self.emit_stage(PipelineStage::Transcribing { chunk, total });
        let result = self.transcribe(upload, Some(chunk)).await;
        segment.remove();
        result
    }

    /// Submit one upload, retrying transient faults per the retry policy
    async fn transcribe(&self, upload: AudioUpload, chunk: Option<usize>) -> Result<String> {
        let file_name = upload.file_name.clone();
        let mut pending = upload;
        let mut attempt = 0;
        loop {
            // Keep a copy only while another attempt is still possible
            let request = if attempt < self.retry.max_retries() {
                pending.clone()
            } else {
                std::mem::take(&mut pending)
            };
            let outcome = self
                .bounded("transcription", chunk, self.transcriber.transcribe(request))
                .await?;

            match outcome {
                Ok(text) => return Ok(text),
                Err(fault) => match self.retry.backoff(&fault, attempt) {
                    Some(delay) => {
                        warn!(
                            "🔄 Retrying {} in {:?} ({}, attempt {}/{})",
                            file_name,
                            delay,
                            fault,
                            attempt + 1,
                            self.retry.max_retries()
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        return Err(TranscribeError::TranscriptionFailure {
                            chunk,
                            cause: fault.cause,
                            message: fault.message,
                        })
                    }
                },
            }
        }
    }

    async fn bounded<T, F>(&self, operation: &str, chunk: Option<usize>, call: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        let limit = self.config.transcription.timeout();
        tokio::time::timeout(limit, call)
            .await
            .map_err(|_| TranscribeError::Timeout {
                operation: operation.to_string(),
                chunk,
                seconds: limit.as_secs(),
            })
    }

    fn check_credential(&self) -> Result<()> {
        match self.config.transcription.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(()),
            _ => Err(TranscribeError::MissingCredential),
        }
    }

    fn finish(&self, text: String, chunk_count: usize, started: Instant) -> Transcript {
        Transcript {
            text,
            chunk_count,
            model: self.transcriber.model().to_string(),
            processing_time: started.elapsed(),
        }
    }

    fn emit_stage(&self, stage: PipelineStage) {
        self.observer.on_event(&ProgressEvent::Stage(stage));
    }
}
