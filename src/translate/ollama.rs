use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{Result, EpisubError};
use crate::subtitle::{Cue, generate_srt, read_srt};
use super::{Translator, TranslateRequest, TranslationModel, common::OllamaClient};

/// Translates an SRT file cue by cue, keeping the timings
pub struct OllamaTranslator {
    client: OllamaClient,
}

impl OllamaTranslator {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }

    async fn translate_cue(
        &self,
        cue: &Cue,
        previous: Option<&str>,
        request: &TranslateRequest,
        model: &TranslationModel,
    ) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..=model.max_retries {
            match self.client.translate_text(
                &model.name,
                &cue.text,
                &request.source_label,
                &request.target_label,
                previous,
            ).await {
                Ok(translation) => return Ok(translation),
                Err(e) => {
                    warn!("Cue translation attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| EpisubError::Translation("no translation attempt made".to_string())))
    }
}

#[async_trait]
impl Translator for OllamaTranslator {
    async fn translate(&self, request: &TranslateRequest, model: &TranslationModel) -> Result<()> {
        let cues = read_srt(&request.source_path).await?;
        if cues.is_empty() {
            return Err(EpisubError::MissingArtifact(format!(
                "{} holds no cues",
                request.source_path.display()
            )));
        }

        info!(
            "Translating {} cues from {} to {}",
            cues.len(),
            request.source_label,
            request.target_label
        );

        let mut translated = Vec::with_capacity(cues.len());
        for (idx, cue) in cues.iter().enumerate() {
            let previous = idx.checked_sub(1).map(|p| cues[p].text.as_str());
            let text = self.translate_cue(cue, previous, request, model).await?;
            debug!("[{}/{}] {} -> {}", idx + 1, cues.len(), cue.text, text);

            translated.push(Cue {
                start: cue.start,
                end: cue.end,
                text,
            });
        }

        generate_srt(&translated, &request.output_path).await
    }
}
