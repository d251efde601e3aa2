//! Read-only views over the process state and the output tree, used by the
//! `status` and `verify` commands.

use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::executor::artifact_ready;
use crate::state::{ProcessState, UnitStatus};
use crate::unit::{ARTIFACT_EXTENSION, OutputLayout, UnitKey, decode_component};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRow {
    pub model: String,
    pub language: String,
    pub done: usize,
    pub not_done: usize,
}

/// Done / not-done counts per model and language, sorted
pub fn summarize(state: &ProcessState) -> Vec<StatusRow> {
    let mut counts: BTreeMap<(String, String), (usize, usize)> = BTreeMap::new();

    for (key, status) in state.iter() {
        let entry = counts
            .entry((key.model.clone(), key.language.clone()))
            .or_default();
        if status == UnitStatus::Done {
            entry.0 += 1;
        } else {
            entry.1 += 1;
        }
    }

    counts
        .into_iter()
        .map(|((model, language), (done, not_done))| StatusRow {
            model,
            language,
            done,
            not_done,
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct VerifyReport {
    /// Units marked done whose artifact is missing or empty
    pub missing: Vec<UnitKey>,
    /// Subtitle files in the tree that the state does not mark done
    pub untracked: Vec<PathBuf>,
}

/// Compare the state with the artifacts on disk
pub async fn verify(state: &ProcessState, layout: &OutputLayout) -> VerifyReport {
    let mut report = VerifyReport::default();

    let mut done: Vec<&UnitKey> = state
        .iter()
        .filter(|(key, _)| state.is_done(key))
        .map(|(key, _)| key)
        .collect();
    done.sort();

    for key in done {
        if !artifact_ready(&layout.path_for(key)).await {
            report.missing.push(key.clone());
        }
    }

    for entry in WalkDir::new(layout.root())
        .min_depth(3)
        .max_depth(3)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|e| e.to_str()) != Some(ARTIFACT_EXTENSION)
        {
            continue;
        }

        let Some(key) = key_for(layout, path) else {
            continue;
        };
        if !state.is_done(&key) {
            debug!("Untracked artifact {}", path.display());
            report.untracked.push(path.to_path_buf());
        }
    }

    info!(
        "Verified {} units: {} missing artifacts, {} untracked files",
        state.len(),
        report.missing.len(),
        report.untracked.len()
    );
    report
}

/// Recover `<model>/<language>/<episode>.srt` under the layout root
fn key_for(layout: &OutputLayout, path: &std::path::Path) -> Option<UnitKey> {
    let relative = path.strip_prefix(layout.root()).ok()?;
    let parts: Vec<String> = relative
        .iter()
        .map(|c| c.to_string_lossy().to_string())
        .collect();

    match parts.as_slice() {
        [model, language, _] => {
            let episode = decode_component(&path.file_stem()?.to_string_lossy())?;
            Some(UnitKey::new(
                &decode_component(model)?,
                &decode_component(language)?,
                &episode,
            ))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_summarize_counts_per_language() {
        let mut state = ProcessState::new();
        state.mark_done(&UnitKey::transcribe("m", "1"));
        state.mark_failed(&UnitKey::transcribe("m", "2"));
        state.mark_done(&UnitKey::translate("m", "en", "1"));

        let rows = summarize(&state);
        assert_eq!(
            rows,
            vec![
                StatusRow { model: "m".to_string(), language: "en".to_string(), done: 1, not_done: 0 },
                StatusRow { model: "m".to_string(), language: "zh_hans".to_string(), done: 1, not_done: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn test_verify_finds_missing_and_untracked() {
        let temp = assert_fs::TempDir::new().unwrap();
        let layout = OutputLayout::new(temp.path());

        std::fs::create_dir_all(temp.child("m/zh_hans").path()).unwrap();
        std::fs::create_dir_all(temp.child("m/en").path()).unwrap();
        std::fs::write(temp.child("m/zh_hans/1.srt").path(), "1\n").unwrap();
        std::fs::write(temp.child("m/en/2.srt").path(), "1\n").unwrap();

        let mut state = ProcessState::new();
        state.mark_done(&UnitKey::transcribe("m", "1"));
        state.mark_done(&UnitKey::translate("m", "en", "1"));

        let report = verify(&state, &layout).await;
        assert_eq!(report.missing, vec![UnitKey::translate("m", "en", "1")]);
        assert_eq!(report.untracked, vec![temp.child("m/en/2.srt").path().to_path_buf()]);
    }

    #[tokio::test]
    async fn test_verify_matches_escaped_episode_ids() {
        let temp = assert_fs::TempDir::new().unwrap();
        let layout = OutputLayout::new(temp.path());

        let mut state = ProcessState::new();
        for episode in ["a/b", "a_b"] {
            let key = UnitKey::translate("m", "en", episode);
            let path = layout.path_for(&key);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, format!("1\n{}\n", episode)).unwrap();
            state.mark_done(&key);
        }

        let report = verify(&state, &layout).await;
        assert!(report.missing.is_empty());
        assert!(report.untracked.is_empty());
        assert_eq!(
            std::fs::read_to_string(layout.path_for(&UnitKey::translate("m", "en", "a/b"))).unwrap(),
            "1\na/b\n"
        );
    }
}
