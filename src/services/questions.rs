//! QuestionSource capability: the day's shared question recordings.
//!
//! Regeneration (LLM question text, TTS synthesis, the midnight cadence) is
//! owned by an external job; this service only reads whatever currently
//! exists under the questions root.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuestionError {
    #[error("Question file not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One question recording available for the current day.
#[derive(Debug, Clone)]
pub struct QuestionAudio {
    pub name: String,
    pub path: PathBuf,
}

#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// The current question set, at most the configured count, in order.
    async fn current_questions(&self) -> Result<Vec<QuestionAudio>, QuestionError>;

    /// Resolve one question file by name. Must reject anything that is not
    /// a plain file name (path traversal).
    async fn resolve(&self, name: &str) -> Result<QuestionAudio, QuestionError>;
}

/// Reads `a1.wav..aN.wav` under the configured questions root. Missing files
/// are skipped rather than errors: the external generator may still be
/// filling the day's set.
pub struct FsQuestionSource {
    root: PathBuf,
    count: usize,
}

impl FsQuestionSource {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, count: usize) -> Self {
        Self {
            root: root.into(),
            count: count.max(1),
        }
    }

    fn is_plain_wav_name(name: &str) -> bool {
        !name.is_empty()
            && name.ends_with(".wav")
            && !name.contains('/')
            && !name.contains('\\')
            && !name.contains("..")
    }
}

#[async_trait]
impl QuestionSource for FsQuestionSource {
    async fn current_questions(&self) -> Result<Vec<QuestionAudio>, QuestionError> {
        let mut available = Vec::new();

        for i in 1..=self.count {
            let name = format!("a{i}.wav");
            let path = self.root.join(&name);

            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() && meta.len() > 0 => {
                    available.push(QuestionAudio { name, path });
                }
                _ => {}
            }
        }

        Ok(available)
    }

    async fn resolve(&self, name: &str) -> Result<QuestionAudio, QuestionError> {
        if !Self::is_plain_wav_name(name) {
            return Err(QuestionError::NotFound(name.to_string()));
        }

        let path = self.root.join(name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(QuestionAudio {
                name: name.to_string(),
                path,
            }),
            _ => Err(QuestionError::NotFound(name.to_string())),
        }
    }
}
