use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use crate::error::{Result, EpisubError};
use crate::unit::SOURCE_LANGUAGE;

fn default_catalog_timeout() -> u64 {
    30
}

fn default_translate_timeout() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub catalog: CatalogConfig,
    pub transcriber: TranscriberConfig,
    pub translate: TranslateConfig,
    pub media: MediaConfig,
    pub run: RunConfig,
    /// Target languages, translated in the order listed
    pub languages: Vec<LanguageEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Base URL of the video catalog API
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_catalog_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TranscriberImplementation {
    /// whisper.cpp command line (`whisper-cli`) with a ggml model file
    WhisperCpp,
    /// OpenAI Whisper python command line (`whisper`)
    #[serde(rename = "openai")]
    OpenAI,
}

impl TranscriberImplementation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WhisperCpp => "whisper-cpp",
            Self::OpenAI => "openai",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriberConfig {
    /// Which transcription implementation to run
    pub implementation: TranscriberImplementation,
    /// Model size or name (e.g. `medium`)
    pub model: String,
    /// Language hint handed to whisper for the source audio
    pub language: String,
    /// Path to the whisper.cpp binary
    pub whisper_cpp_binary: String,
    /// Path to the OpenAI whisper binary
    pub openai_binary: String,
    /// Directory holding ggml model files for whisper.cpp
    pub models_dir: PathBuf,
    /// Output namespace override; the model name when unset
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateConfig {
    /// Ollama endpoint URL
    pub endpoint: String,
    /// LLM model to use for translation
    pub model: String,
    /// Maximum retries for a failed cue translation
    pub max_retries: u32,
    /// Human readable name of the transcript language
    pub source_label: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_translate_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Sample rate of the extracted audio handed to whisper
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistPolicy {
    /// Write the state file after every unit decision
    PerUnit,
    /// Write the state file once all units of an episode were attempted
    PerEpisode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Location of the persisted process state
    pub state_file: PathBuf,
    /// Root of the subtitle output tree
    pub output_dir: PathBuf,
    /// How often the state file is written during a run
    pub persist: PersistPolicy,
    /// Deadline for a single transcribe or translate stage
    pub stage_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageEntry {
    /// Directory and state key for the language (e.g. `en`)
    pub tag: String,
    /// Name handed to the translator (e.g. `English`)
    pub label: String,
}

impl LanguageEntry {
    pub fn new(tag: &str, label: &str) -> Self {
        Self {
            tag: tag.to_string(),
            label: label.to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog: CatalogConfig {
                base_url: "https://dyhaojiu.jaxczs.cn/api/video".to_string(),
                timeout_secs: default_catalog_timeout(),
            },
            transcriber: TranscriberConfig {
                implementation: TranscriberImplementation::WhisperCpp,
                model: "medium".to_string(),
                language: "zh".to_string(),
                whisper_cpp_binary: "whisper-cli".to_string(),
                openai_binary: "whisper".to_string(),
                models_dir: PathBuf::from(".episub/models"),
                namespace: None,
            },
            translate: TranslateConfig {
                endpoint: "http://localhost:11434".to_string(),
                model: "llama3.2:3b".to_string(),
                max_retries: 3,
                source_label: "Chinese (Simplified)".to_string(),
                timeout_secs: default_translate_timeout(),
            },
            media: MediaConfig {
                binary_path: "ffmpeg".to_string(),
                sample_rate: 16_000,
            },
            run: RunConfig {
                state_file: PathBuf::from(".episub/state.json"),
                output_dir: PathBuf::from("subtitle"),
                persist: PersistPolicy::PerUnit,
                stage_timeout_secs: None,
            },
            languages: vec![
                LanguageEntry::new("en", "English"),
                LanguageEntry::new("ja", "Japanese"),
                LanguageEntry::new("ko", "Korean"),
                LanguageEntry::new("zh_hant", "Chinese (Traditional)"),
                LanguageEntry::new("vi", "Vietnamese"),
                LanguageEntry::new("th", "Thai"),
                LanguageEntry::new("id", "Indonesian"),
                LanguageEntry::new("es", "Spanish"),
                LanguageEntry::new("fr", "French"),
                LanguageEntry::new("de", "German"),
                LanguageEntry::new("pt", "Portuguese"),
                LanguageEntry::new("ru", "Russian"),
            ],
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EpisubError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)?;

        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| EpisubError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| EpisubError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Reject configurations the batch cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.catalog.base_url.trim().is_empty() {
            return Err(EpisubError::Config("catalog.base_url must not be empty".to_string()));
        }
        if self.transcriber.model.trim().is_empty() {
            return Err(EpisubError::Config("transcriber.model must not be empty".to_string()));
        }
        if self.languages.is_empty() {
            return Err(EpisubError::Config("at least one target language is required".to_string()));
        }

        let mut seen = HashSet::new();
        for language in &self.languages {
            if language.tag.trim().is_empty() {
                return Err(EpisubError::Config("language tag must not be empty".to_string()));
            }
            if language.tag == SOURCE_LANGUAGE {
                return Err(EpisubError::Config(format!(
                    "'{}' is the transcript language and cannot be a translation target",
                    SOURCE_LANGUAGE
                )));
            }
            if !seen.insert(language.tag.as_str()) {
                return Err(EpisubError::Config(format!(
                    "duplicate target language '{}'",
                    language.tag
                )));
            }
        }

        Ok(())
    }

    /// Target languages for a run, optionally restricted to `only`.
    /// The table order is kept regardless of the order of `only`.
    pub fn select_languages(&self, only: Option<&[String]>) -> Result<Vec<LanguageEntry>> {
        let Some(only) = only else {
            return Ok(self.languages.clone());
        };

        for tag in only {
            if !self.languages.iter().any(|l| &l.tag == tag) {
                return Err(EpisubError::Config(format!("unknown target language '{}'", tag)));
            }
        }

        Ok(self
            .languages
            .iter()
            .filter(|l| only.contains(&l.tag))
            .cloned()
            .collect())
    }
}
