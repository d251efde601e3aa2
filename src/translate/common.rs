use std::time::Duration;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::config::TranslateConfig;
use crate::error::{Result, EpisubError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
    pub done: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationResult {
    pub text: String,
}

/// Thin client for the Ollama generate API
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    endpoint: String,
}

impl OllamaClient {
    pub fn new(config: &TranslateConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// Translate one piece of text, asking for a JSON formatted answer
    pub async fn translate_text(
        &self,
        model: &str,
        text: &str,
        source_label: &str,
        target_label: &str,
        context: Option<&str>,
    ) -> Result<String> {
        let request = GenerateRequest {
            model: model.to_string(),
            prompt: build_translation_prompt(text, source_label, target_label, context),
            stream: false,
            format: "json".to_string(),
        };

        let url = format!("{}/api/generate", self.endpoint);
        debug!("Sending translation request to: {}", url);

        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| EpisubError::Translation(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(EpisubError::Translation(format!(
                "Ollama API error {}: {}", status, error_text
            )));
        }

        let generated: GenerateResponse = response.json().await
            .map_err(|e| EpisubError::Translation(format!("Failed to parse response: {}", e)))?;

        let raw_response = generated.response.trim();
        debug!("Raw Ollama response: {}", raw_response);

        if raw_response.is_empty() {
            return Err(EpisubError::Translation("Empty translation received".to_string()));
        }

        if let Ok(result) = serde_json::from_str::<TranslationResult>(raw_response) {
            let text = result.text.trim();
            if text.is_empty() {
                return Err(EpisubError::Translation("Empty translation received".to_string()));
            }
            return Ok(text.to_string());
        }

        Ok(clean_translation_response(raw_response))
    }

    /// Check that Ollama answers and the model is pulled
    pub async fn check_availability(&self, model: &str) -> Result<()> {
        let url = format!("{}/api/show", self.endpoint);

        let response = self.client
            .post(&url)
            .json(&json!({ "name": model }))
            .send()
            .await
            .map_err(|e| EpisubError::Translation(format!("Failed to connect to Ollama: {}", e)))?;

        if response.status().is_success() {
            info!("Ollama model '{}' is available", model);
            Ok(())
        } else {
            Err(EpisubError::Translation(format!(
                "Ollama model '{}' not found. Please pull the model first: ollama pull {}",
                model, model
            )))
        }
    }
}

/// Build the translation prompt; `context` is the preceding cue, never translated
pub fn build_translation_prompt(
    text: &str,
    source_label: &str,
    target_label: &str,
    context: Option<&str>,
) -> String {
    let mut prompt = format!(
        "You are a professional subtitle translator.\n\
         \n\
         Translate the subtitle line from {} to {} ONLY. Do not translate to any other language.\n\
         \n\
         Return ONLY the translation in JSON format as {{\"text\":\"your {} translation here\"}}.\n\
         Do not include any explanations, alternatives, or text in other languages.\n\
         \n\
         [Text to translate]\n\
         {}\n\
         \n",
        source_label, target_label, target_label, text
    );

    if let Some(ctx) = context {
        if !ctx.trim().is_empty() {
            prompt.push_str(&format!(
                "[Previous line for reference - DO NOT translate this part]\n\
                 {}\n",
                ctx
            ));
        }
    }

    prompt
}

/// Pull the translation out of a free-form answer when the model ignored the JSON format
pub fn clean_translation_response(response: &str) -> String {
    let lines: Vec<&str> = response.lines().collect();

    for &line in &lines {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        if trimmed.starts_with("Here are") ||
           trimmed.starts_with("Here is") ||
           trimmed.starts_with("Option") ||
           trimmed.starts_with("**Option") ||
           trimmed.starts_with("Translation:") ||
           trimmed.starts_with("- ") ||
           trimmed.starts_with("* ") {
            continue;
        }

        if trimmed.starts_with("**") && trimmed.ends_with("**") {
            continue;
        }

        return trimmed.to_string();
    }

    response.trim().to_string()
}
