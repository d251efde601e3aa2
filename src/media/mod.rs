// Media access for the transcription stage
//
// - Commands: external tool invocation and the ffmpeg command builder
// - AudioExtractor: turns a catalog media URL into a local wav file

pub mod commands;

use std::path::Path;
use tracing::info;

pub use commands::*;

use crate::config::MediaConfig;
use crate::error::Result;

/// Extracts whisper-ready audio from catalog media
#[derive(Debug, Clone)]
pub struct AudioExtractor {
    config: MediaConfig,
}

impl AudioExtractor {
    pub fn new(config: MediaConfig) -> Self {
        Self { config }
    }

    pub async fn extract(&self, media_url: &str, audio_path: &Path) -> Result<()> {
        info!("Extracting audio from {} to {}", media_url, audio_path.display());

        MediaCommandBuilder::new(&self.config.binary_path)
            .extract_audio(media_url, audio_path, self.config.sample_rate)
            .execute()
            .await?;

        info!("Audio extraction completed");
        Ok(())
    }
}
