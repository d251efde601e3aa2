//! Episub - resumable catalog transcription and subtitle translation
//!
//! Walks a remote video catalog, transcribes every episode with whisper and
//! translates the transcript into a fixed table of languages. Progress is
//! kept in a state file so an interrupted batch resumes where it stopped.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod inspect;
pub mod media;
pub mod state;
pub mod subtitle;
pub mod transcribe;
pub mod translate;
pub mod unit;
pub mod workflow;
