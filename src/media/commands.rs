use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, EpisubError};

/// External tool invocation (ffmpeg, whisper-cli, whisper)
#[derive(Debug, Clone)]
pub struct ToolCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
    error: fn(String) -> EpisubError,
}

impl ToolCommand {
    /// Create a new command; failures are reported through `error`
    pub fn new<S1: Into<String>, S2: Into<String>>(
        binary_path: S1,
        description: S2,
        error: fn(String) -> EpisubError,
    ) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
            error,
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add a path argument
    pub fn path_arg<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add a flag followed by its value
    pub fn opt<S1: Into<String>, S2: Into<String>>(self, flag: S1, value: S2) -> Self {
        self.arg(flag).arg(value)
    }

    /// Execute the command.
    /// The child is killed if the returned future is dropped.
    pub async fn execute(&self) -> Result<()> {
        debug!("Executing: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let output = Command::new(&self.binary_path)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| (self.error)(format!("Failed to execute {}: {}", self.binary_path, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err((self.error)(format!(
                "{} failed ({}): {}",
                self.description,
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

/// Builder for the ffmpeg invocations the pipeline needs
pub struct MediaCommandBuilder {
    binary_path: String,
}

impl MediaCommandBuilder {
    pub fn new<S: Into<String>>(binary_path: S) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Pull mono PCM audio out of a local file or remote URL
    pub fn extract_audio<P: AsRef<Path>>(
        &self,
        media_url: &str,
        audio_path: P,
        sample_rate: u32,
    ) -> ToolCommand {
        ToolCommand::new(&self.binary_path, "Audio extraction", EpisubError::Media)
            .arg("-nostdin")
            .arg("-y")
            .opt("-i", media_url)
            .arg("-vn")
            .opt("-c:a", "pcm_s16le")
            .opt("-ar", sample_rate.to_string())
            .opt("-ac", "1")
            .path_arg(audio_path)
    }
}
