use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transcribe and translate every catalog episode that is not done yet
    Run {
        /// Transcription implementation (whisper-cpp, openai)
        #[arg(short, long)]
        implementation: Option<String>,

        /// Whisper model size or ggml model path
        #[arg(short, long)]
        model: Option<String>,

        /// Ollama model used for translation
        #[arg(long)]
        translation_model: Option<String>,

        /// Restrict the run to these target languages (comma-separated tags)
        #[arg(short, long)]
        languages: Option<String>,

        /// Report the units that would run without running them
        #[arg(long)]
        dry_run: bool,
    },

    /// Show done and pending unit counts from the state file
    Status,

    /// Compare the state file with the subtitle tree
    Verify {
        /// Mark done units whose subtitle file is missing as pending again
        #[arg(long)]
        fix: bool,
    },

    /// List catalog videos and their episodes
    Catalog,

    /// Write the default configuration to a file
    Init {
        /// Destination file
        #[arg(default_value = "config.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
