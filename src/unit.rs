//! Work unit identity and the deterministic layout of the subtitle output tree.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Language key of the transcript every translation is produced from
pub const SOURCE_LANGUAGE: &str = "zh_hans";

/// Extension of every produced artifact
pub const ARTIFACT_EXTENSION: &str = "srt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Transcribe,
    Translate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Transcribe => write!(f, "transcribe"),
            Stage::Translate => write!(f, "translate"),
        }
    }
}

/// Key of one unit of work in the process state.
///
/// The stage is implied by the language: the source language is always the
/// transcription, every other language a translation of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitKey {
    pub model: String,
    pub language: String,
    pub episode: String,
}

impl UnitKey {
    pub fn new(model: &str, language: &str, episode: &str) -> Self {
        Self {
            model: model.to_string(),
            language: language.to_string(),
            episode: episode.to_string(),
        }
    }

    pub fn transcribe(model: &str, episode: &str) -> Self {
        Self::new(model, SOURCE_LANGUAGE, episode)
    }

    pub fn translate(model: &str, language: &str, episode: &str) -> Self {
        Self::new(model, language, episode)
    }

    pub fn stage(&self) -> Stage {
        if self.language == SOURCE_LANGUAGE {
            Stage::Transcribe
        } else {
            Stage::Translate
        }
    }

}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.model, self.language, self.episode)
    }
}

/// Maps unit keys onto `<root>/<model>/<language>/<episode>.srt`
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn output_path(&self, model: &str, language: &str, episode: &str) -> PathBuf {
        self.root
            .join(path_component(model))
            .join(path_component(language))
            .join(format!("{}.{}", path_component(episode), ARTIFACT_EXTENSION))
    }

    pub fn path_for(&self, key: &UnitKey) -> PathBuf {
        self.output_path(&key.model, &key.language, &key.episode)
    }

    pub fn transcript_path(&self, model: &str, episode: &str) -> PathBuf {
        self.output_path(model, SOURCE_LANGUAGE, episode)
    }
}

/// Encode a catalog-provided value as a single path component.
///
/// `%`, path separators and NUL are percent-escaped, `.` and `..` are escaped
/// whole and the empty string becomes a lone `%`. Distinct values always map
/// to distinct components and [`decode_component`] reverses the mapping.
pub fn path_component(value: &str) -> String {
    match value {
        "" => return "%".to_string(),
        "." => return "%2E".to_string(),
        ".." => return "%2E%2E".to_string(),
        _ => {}
    }

    let mut encoded = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' | '/' | '\\' | '\0' => encoded.push_str(&format!("%{:02X}", c as u32)),
            _ => encoded.push(c),
        }
    }
    encoded
}

/// Inverse of [`path_component`]; `None` for names it never produces
pub fn decode_component(component: &str) -> Option<String> {
    if component == "%" {
        return Some(String::new());
    }

    let mut decoded = String::with_capacity(component.len());
    let mut chars = component.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            decoded.push(c);
            continue;
        }
        let hex: String = chars.by_ref().take(2).collect();
        let byte = u8::from_str_radix(&hex, 16).ok().filter(|_| hex.len() == 2)?;
        decoded.push(char::from(byte));
    }

    (path_component(&decoded) == component).then_some(decoded)
}
