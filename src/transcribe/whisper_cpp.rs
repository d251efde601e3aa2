use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

use crate::config::{MediaConfig, TranscriberConfig};
use crate::error::{Result, EpisubError};
use crate::media::{AudioExtractor, ToolCommand};
use super::{Transcriber, TranscribeRequest, TranscriptionModel, common::install_artifact};

/// whisper.cpp implementation (`whisper-cli`)
pub struct WhisperCppTranscriber {
    config: TranscriberConfig,
    audio: AudioExtractor,
}

impl WhisperCppTranscriber {
    pub fn new(config: TranscriberConfig, media: MediaConfig) -> Self {
        Self {
            config,
            audio: AudioExtractor::new(media),
        }
    }

    /// Resolve a model name to a ggml file; names ending in `.bin` are paths already
    pub fn model_path(&self, model: &TranscriptionModel) -> PathBuf {
        if model.name.ends_with(".bin") {
            PathBuf::from(&model.name)
        } else {
            self.config.models_dir.join(format!("ggml-{}.bin", model.name))
        }
    }
}

#[async_trait]
impl Transcriber for WhisperCppTranscriber {
    async fn transcribe(&self, request: &TranscribeRequest, model: &TranscriptionModel) -> Result<()> {
        let model_path = self.model_path(model);
        if !model_path.exists() {
            return Err(EpisubError::Transcriber(format!(
                "whisper.cpp model not found: {}",
                model_path.display()
            )));
        }

        let temp_dir = tempfile::tempdir()
            .map_err(|e| EpisubError::Transcriber(format!("Failed to create temp directory: {}", e)))?;
        let audio_path = temp_dir.path().join("audio.wav");
        self.audio.extract(&request.media_url, &audio_path).await?;

        info!("Running whisper.cpp with model {}", model_path.display());
        let stem = temp_dir.path().join("transcript");
        ToolCommand::new(
            &self.config.whisper_cpp_binary,
            "whisper.cpp transcription",
            EpisubError::Transcriber,
        )
        .opt("-m", model_path.to_string_lossy())
        .opt("-l", request.language.as_str())
        .opt("-f", audio_path.to_string_lossy())
        .arg("-osrt")
        .opt("-of", stem.to_string_lossy())
        .execute()
        .await?;

        install_artifact(&stem.with_extension("srt"), &request.output_path).await
    }
}
