use async_trait::async_trait;
use tracing::info;

use crate::config::{MediaConfig, TranscriberConfig};
use crate::error::{Result, EpisubError};
use crate::media::{AudioExtractor, ToolCommand};
use super::{Transcriber, TranscribeRequest, TranscriptionModel, common::install_artifact};

/// OpenAI Whisper python implementation (`whisper`)
pub struct OpenAITranscriber {
    config: TranscriberConfig,
    audio: AudioExtractor,
}

impl OpenAITranscriber {
    pub fn new(config: TranscriberConfig, media: MediaConfig) -> Self {
        Self {
            config,
            audio: AudioExtractor::new(media),
        }
    }
}

#[async_trait]
impl Transcriber for OpenAITranscriber {
    async fn transcribe(&self, request: &TranscribeRequest, model: &TranscriptionModel) -> Result<()> {
        let temp_dir = tempfile::tempdir()
            .map_err(|e| EpisubError::Transcriber(format!("Failed to create temp directory: {}", e)))?;
        let audio_path = temp_dir.path().join("audio.wav");
        self.audio.extract(&request.media_url, &audio_path).await?;

        info!("Running OpenAI whisper with model {}", model.name);
        ToolCommand::new(&self.config.openai_binary, "OpenAI whisper transcription", EpisubError::Transcriber)
            .path_arg(&audio_path)
            .opt("--model", model.name.as_str())
            .opt("--language", request.language.as_str())
            .opt("--task", "transcribe")
            .opt("--output_format", "srt")
            .opt("--output_dir", temp_dir.path().to_string_lossy())
            .opt("--verbose", "False")
            .execute()
            .await?;

        // whisper names its output after the input file
        install_artifact(&temp_dir.path().join("audio.srt"), &request.output_path).await
    }
}
