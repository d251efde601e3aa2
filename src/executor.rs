//! Stage executors: run one transcription or translation and report a typed
//! outcome. Engine errors never escape from here.

use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

use crate::config::LanguageEntry;
use crate::error::Result;
use crate::transcribe::{Transcriber, TranscribeRequest, TranscriptionModel};
use crate::translate::{Translator, TranslateRequest, TranslationModel};
use crate::unit::{OutputLayout, UnitKey};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The artifact exists and is non-empty
    Succeeded,
    Failed { reason: String },
    TimedOut,
}

/// True when `path` is a non-empty file
pub async fn artifact_ready(path: &Path) -> bool {
    match fs::metadata(path).await {
        Ok(metadata) => metadata.is_file() && metadata.len() > 0,
        Err(_) => false,
    }
}

pub struct StageExecutor {
    transcriber: Box<dyn Transcriber>,
    translator: Box<dyn Translator>,
    layout: OutputLayout,
    /// Language hint handed to the transcriber
    language_hint: String,
    timeout: Option<Duration>,
}

impl StageExecutor {
    pub fn new(
        transcriber: Box<dyn Transcriber>,
        translator: Box<dyn Translator>,
        layout: OutputLayout,
        language_hint: &str,
    ) -> Self {
        Self {
            transcriber,
            translator,
            layout,
            language_hint: language_hint.to_string(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    pub async fn run_transcribe(
        &self,
        model: &TranscriptionModel,
        media_url: &str,
        episode: &str,
    ) -> StageOutcome {
        let key = UnitKey::transcribe(&model.namespace, episode);
        let request = TranscribeRequest {
            media_url: media_url.to_string(),
            language: self.language_hint.clone(),
            output_path: self.layout.path_for(&key),
        };

        self.guarded(&key, &request.output_path, self.transcriber.transcribe(&request, model))
            .await
    }

    pub async fn run_translate(
        &self,
        model: &TranscriptionModel,
        translation: &TranslationModel,
        source_label: &str,
        source_path: &Path,
        target: &LanguageEntry,
        episode: &str,
    ) -> StageOutcome {
        let key = UnitKey::translate(&model.namespace, &target.tag, episode);
        let request = TranslateRequest {
            source_path: source_path.to_path_buf(),
            source_label: source_label.to_string(),
            target_tag: target.tag.clone(),
            target_label: target.label.clone(),
            output_path: self.layout.path_for(&key),
        };

        self.guarded(&key, &request.output_path, self.translator.translate(&request, translation))
            .await
    }

    async fn guarded<F>(&self, key: &UnitKey, output_path: &Path, work: F) -> StageOutcome
    where
        F: Future<Output = Result<()>>,
    {
        if let Some(parent) = output_path.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                warn!(unit = %key, "Cannot create {}: {}", parent.display(), e);
                return StageOutcome::Failed { reason: e.to_string() };
            }
        }

        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(unit = %key, stage = %key.stage(), "Stage exceeded {:?}", limit);
                    return StageOutcome::TimedOut;
                }
            },
            None => work.await,
        };

        match result {
            Ok(()) if artifact_ready(output_path).await => {
                debug!(unit = %key, "Stage produced {}", output_path.display());
                StageOutcome::Succeeded
            }
            Ok(()) => {
                let reason = format!("{} is missing or empty", output_path.display());
                warn!(unit = %key, stage = %key.stage(), "Stage reported success but {}", reason);
                StageOutcome::Failed { reason }
            }
            Err(e) => {
                warn!(unit = %key, stage = %key.stage(), "Stage failed: {}", e);
                StageOutcome::Failed { reason: e.to_string() }
            }
        }
    }
}
