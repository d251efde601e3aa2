// Transcription implementations behind a common trait
//
// - WhisperCpp: whisper.cpp command line with a ggml model file
// - OpenAI: OpenAI Whisper python command line
//
// Both pull audio from the media URL with ffmpeg first and write an SRT file
// to the path the caller asks for.

pub mod common;
pub mod openai;
pub mod whisper_cpp;

use async_trait::async_trait;
use std::path::PathBuf;

pub use common::*;
use crate::config::{MediaConfig, TranscriberConfig, TranscriberImplementation};
use crate::error::Result;

/// The transcription model a run uses. Immutable for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionModel {
    pub implementation: TranscriberImplementation,
    /// Model size or name handed to the engine
    pub name: String,
    /// Output and state namespace; changing it starts a fresh tree
    pub namespace: String,
}

impl TranscriptionModel {
    pub fn from_config(config: &TranscriberConfig) -> Self {
        Self {
            implementation: config.implementation,
            name: config.model.clone(),
            namespace: config.namespace.clone().unwrap_or_else(|| config.model.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranscribeRequest {
    pub media_url: String,
    /// Language hint for the engine (e.g. `zh`)
    pub language: String,
    pub output_path: PathBuf,
}

/// Turns a media URL into a subtitle file
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, request: &TranscribeRequest, model: &TranscriptionModel) -> Result<()>;
}

/// Factory for creating transcriber instances
pub struct TranscriberFactory;

impl TranscriberFactory {
    pub fn create_transcriber(
        implementation: TranscriberImplementation,
        config: TranscriberConfig,
        media: MediaConfig,
    ) -> Box<dyn Transcriber> {
        match implementation {
            TranscriberImplementation::WhisperCpp => {
                Box::new(whisper_cpp::WhisperCppTranscriber::new(config, media))
            }
            TranscriberImplementation::OpenAI => {
                Box::new(openai::OpenAITranscriber::new(config, media))
            }
        }
    }
}
