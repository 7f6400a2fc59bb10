use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::{AudioUpload, Transcriber, TranscriptionFault};
use crate::config::TranscriptionConfig;
use crate::{FailureCause, Result, TranscribeError};

/// OpenAI-compatible `/audio/transcriptions` client
pub struct OpenAiTranscriber {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl OpenAiTranscriber {
    pub fn new(config: &TranscriptionConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(TranscribeError::MissingCredential)?;

        // The pipeline enforces the overall per-call timeout.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TranscribeError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            model: config.model.clone(),
            language: config.language.clone(),
        })
    }

    fn build_form(&self, upload: AudioUpload) -> std::result::Result<reqwest::multipart::Form, TranscriptionFault> {
        let mime = mime_for(Path::new(&upload.file_name));
        let part = reqwest::multipart::Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(mime)
            .map_err(|e| TranscriptionFault::new(FailureCause::Malformed, e.to_string()))?;

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "json");

        Ok(match &self.language {
            Some(language) => form.text("language", language.clone()),
            None => form,
        })
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    async fn transcribe(&self, upload: AudioUpload) -> std::result::Result<String, TranscriptionFault> {
        let file_name = upload.file_name.clone();
        debug!("POST {} ({}, {} bytes)", self.endpoint, file_name, upload.len());
        let form = self.build_form(upload)?;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscriptionFault::new(FailureCause::Network, e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TranscriptionFault::new(FailureCause::Network, e.to_string()))?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let text = parse_response(&body)?;
        info!("✅ Transcribed {}: {} characters", file_name, text.len());
        Ok(text)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Map an unsuccessful HTTP status to a failure cause
pub fn classify_status(status: StatusCode, body: &str) -> TranscriptionFault {
    let cause = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FailureCause::Auth,
        StatusCode::PAYLOAD_TOO_LARGE => FailureCause::PayloadTooLarge,
        StatusCode::TOO_MANY_REQUESTS => FailureCause::RateLimit,
        s if s.is_server_error() => FailureCause::Network,
        _ => FailureCause::Malformed,
    };
    TranscriptionFault::new(cause, format!("API error {}: {}", status, excerpt(body)))
}

/// Extract the transcript from a `response_format=json` body
pub fn parse_response(body: &str) -> std::result::Result<String, TranscriptionFault> {
    serde_json::from_str::<TranscriptionResponse>(body)
        .map(|r| r.text)
        .map_err(|e| {
            TranscriptionFault::new(
                FailureCause::Malformed,
                format!("unexpected response ({}): {}", e, excerpt(body)),
            )
        })
}

fn excerpt(body: &str) -> &str {
    let body = body.trim();
    match body.char_indices().nth(300) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp3" | "mpga" | "mpeg" => "audio/mpeg",
        "mp4" | "m4a" => "audio/mp4",
        "wav" => "audio/wav",
        "webm" => "audio/webm",
        "ogg" | "oga" => "audio/ogg",
        "flac" => "audio/flac",
        _ => "application/octet-stream",
    }
}
