//! Analyzer capability: turns one answer recording into a score in [0,1].
//!
//! Two concrete implementations, selected once at startup by
//! `analyzer.mode`: a remote HTTP service and an in-process fixed-score
//! analyzer for development and tests. There is no runtime fallback chain;
//! if the configured analyzer fails, the submission fails.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::config::AnalyzerConfig;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("Analyzer unreachable: {0}")]
    Unreachable(String),

    #[error("Analyzer timed out after {0:?}")]
    Timeout(Duration),

    #[error("Analyzer rejected the sample: {0}")]
    Rejected(String),

    #[error("Analyzer returned a malformed response: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-file analyzer output.
#[derive(Debug, Clone)]
pub struct AnalysisOutput {
    pub score: f32,

    /// Optional artifact produced alongside the score, e.g. a
    /// mel-spectrogram image rendered by the model pipeline.
    pub artifact: Option<Vec<u8>>,

    pub model_version: Option<String>,
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, wav_path: &Path) -> Result<AnalysisOutput, AnalyzerError>;
}

/// Builds the analyzer selected by configuration.
pub fn build_analyzer(
    config: &AnalyzerConfig,
    http_client: reqwest::Client,
) -> Box<dyn Analyzer> {
    match config.mode.as_str() {
        "fixed" => Box::new(FixedAnalyzer {
            score: config.fixed_score,
            model_version: config.model_version.clone(),
        }),
        _ => Box::new(RemoteAnalyzer {
            client: http_client,
            base_url: config.service_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.request_timeout_seconds),
            model_version: config.model_version.clone(),
        }),
    }
}

// ============================================================================
// Remote HTTP analyzer
// ============================================================================

#[derive(Debug, Deserialize)]
struct RemoteResult {
    score: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct RemoteResponse {
    success: bool,
    score: Option<f32>,
    result: Option<RemoteResult>,
    mel_b64: Option<String>,
    message: Option<String>,
    model_version: Option<String>,
}

pub struct RemoteAnalyzer {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    model_version: String,
}

impl RemoteAnalyzer {
    async fn post_sample(&self, wav_path: &Path) -> Result<RemoteResponse, AnalyzerError> {
        let bytes = tokio::fs::read(wav_path).await?;
        let file_name = wav_path
            .file_name()
            .map_or_else(|| "answer.wav".to_string(), |n| n.to_string_lossy().into_owned());

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/wav")
            .map_err(|e| AnalyzerError::Malformed(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let request = self
            .client
            .post(format!("{}/system/voice-analysis", self.base_url))
            .multipart(form)
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| AnalyzerError::Timeout(self.timeout))?
            .map_err(|e| AnalyzerError::Unreachable(e.to_string()))?;

        response
            .json::<RemoteResponse>()
            .await
            .map_err(|e| AnalyzerError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl Analyzer for RemoteAnalyzer {
    async fn analyze(&self, wav_path: &Path) -> Result<AnalysisOutput, AnalyzerError> {
        let response = self.post_sample(wav_path).await?;

        if !response.success {
            return Err(AnalyzerError::Rejected(
                response
                    .message
                    .unwrap_or_else(|| "analysis failed".to_string()),
            ));
        }

        // The service reports the score either top-level or nested under
        // `result`, depending on its version.
        let score = response
            .score
            .or_else(|| response.result.as_ref().and_then(|r| r.score))
            .ok_or_else(|| AnalyzerError::Malformed("missing score".to_string()))?;

        if !(0.0..=1.0).contains(&score) {
            return Err(AnalyzerError::Malformed(format!(
                "score out of range: {score}"
            )));
        }

        let artifact = match response.mel_b64 {
            Some(b64) => {
                use base64::Engine;
                Some(
                    base64::engine::general_purpose::STANDARD
                        .decode(b64.as_bytes())
                        .map_err(|e| AnalyzerError::Malformed(e.to_string()))?,
                )
            }
            None => None,
        };

        Ok(AnalysisOutput {
            score,
            artifact,
            model_version: response
                .model_version
                .or_else(|| Some(self.model_version.clone())),
        })
    }
}

// ============================================================================
// In-process fixed analyzer (dev/test)
// ============================================================================

/// Deterministic analyzer returning a configured score for every sample.
/// Stands in for the model pipeline when no analysis service is available.
pub struct FixedAnalyzer {
    pub score: f32,
    pub model_version: String,
}

#[async_trait]
impl Analyzer for FixedAnalyzer {
    async fn analyze(&self, wav_path: &Path) -> Result<AnalysisOutput, AnalyzerError> {
        // Still require the staged file to exist so the staging/cleanup
        // contract is exercised the same way as in remote mode.
        tokio::fs::metadata(wav_path).await?;

        Ok(AnalysisOutput {
            score: self.score,
            artifact: None,
            model_version: Some(self.model_version.clone()),
        })
    }
}
