// Translation of transcript files
//
// - Common: Ollama client and prompt handling
// - Ollama: cue-by-cue SRT translation through Ollama

pub mod common;
pub mod ollama;

use async_trait::async_trait;
use std::path::PathBuf;

pub use common::*;
use crate::config::TranslateConfig;
use crate::error::Result;

/// The translation model a run uses. Immutable for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationModel {
    pub name: String,
    /// Attempts per cue beyond the first
    pub max_retries: u32,
}

impl TranslationModel {
    pub fn from_config(config: &TranslateConfig) -> Self {
        Self {
            name: config.model.clone(),
            max_retries: config.max_retries,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranslateRequest {
    pub source_path: PathBuf,
    pub source_label: String,
    pub target_tag: String,
    pub target_label: String,
    pub output_path: PathBuf,
}

/// Turns one subtitle file into another language
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, request: &TranslateRequest, model: &TranslationModel) -> Result<()>;
}

/// Factory for creating translator instances
pub struct TranslatorFactory;

impl TranslatorFactory {
    pub fn create_translator(config: &TranslateConfig) -> Result<Box<dyn Translator>> {
        Ok(Box::new(ollama::OllamaTranslator::new(OllamaClient::new(config)?)))
    }
}
