use chrono::{DateTime, Utc};
use indicatif::ProgressBar;
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::catalog::{CatalogWalker, EpisodeRef, HttpCatalogClient, VideoRef};
use crate::config::{Config, LanguageEntry, PersistPolicy};
use crate::error::Result;
use crate::executor::{StageExecutor, StageOutcome, artifact_ready};
use crate::state::{ProcessState, StateStore};
use crate::transcribe::{TranscriberFactory, TranscriptionModel};
use crate::translate::{TranslationModel, TranslatorFactory};
use crate::unit::{OutputLayout, Stage, UnitKey};

/// What a batch run did
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub videos: usize,
    pub episodes: usize,
    pub skipped_no_media: usize,
    /// Units already `Done` before this run
    pub skipped_done: usize,
    pub transcribed: usize,
    pub translated: usize,
    /// Translations not attempted because the transcript is not available
    pub blocked: usize,
    pub failed: Vec<UnitKey>,
    /// Units a dry run would have executed
    pub planned: Vec<UnitKey>,
}

impl BatchReport {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            finished_at: None,
            videos: 0,
            episodes: 0,
            skipped_no_media: 0,
            skipped_done: 0,
            transcribed: 0,
            translated: 0,
            blocked: 0,
            failed: Vec::new(),
            planned: Vec::new(),
        }
    }
}

/// Drives the catalog through transcription and translation, resuming from
/// the persisted state and never aborting on a failed unit
pub struct Workflow {
    walker: CatalogWalker,
    executor: StageExecutor,
    store: StateStore,
    transcription: TranscriptionModel,
    translation: TranslationModel,
    source_label: String,
    languages: Vec<LanguageEntry>,
    persist: PersistPolicy,
    dry_run: bool,
    progress: ProgressBar,
}

impl Workflow {
    pub fn new(
        walker: CatalogWalker,
        executor: StageExecutor,
        store: StateStore,
        transcription: TranscriptionModel,
        translation: TranslationModel,
        source_label: &str,
        languages: Vec<LanguageEntry>,
    ) -> Self {
        Self {
            walker,
            executor,
            store,
            transcription,
            translation,
            source_label: source_label.to_string(),
            languages,
            persist: PersistPolicy::PerUnit,
            dry_run: false,
            progress: ProgressBar::hidden(),
        }
    }

    /// Build the production workflow: HTTP catalog and the configured engines
    pub fn from_config(config: &Config, languages: Vec<LanguageEntry>) -> Result<Self> {
        let transcription = TranscriptionModel::from_config(&config.transcriber);
        let transcriber = TranscriberFactory::create_transcriber(
            transcription.implementation,
            config.transcriber.clone(),
            config.media.clone(),
        );
        let translator = TranslatorFactory::create_translator(&config.translate)?;

        let executor = StageExecutor::new(
            transcriber,
            translator,
            OutputLayout::new(&config.run.output_dir),
            &config.transcriber.language,
        )
        .with_timeout(config.run.stage_timeout_secs.map(std::time::Duration::from_secs));

        let walker = CatalogWalker::new(Box::new(HttpCatalogClient::new(&config.catalog)?));

        Ok(Self::new(
            walker,
            executor,
            StateStore::new(&config.run.state_file),
            transcription,
            TranslationModel::from_config(&config.translate),
            &config.translate.source_label,
            languages,
        )
        .persist_policy(config.run.persist))
    }

    pub fn persist_policy(mut self, persist: PersistPolicy) -> Self {
        self.persist = persist;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Process the whole catalog once.
    ///
    /// Fails without touching anything when another run holds the state file.
    pub async fn run(&self) -> Result<BatchReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "batch",
            run = %run_id,
            engine = self.transcription.implementation.as_str(),
            model = %self.transcription.namespace
        );

        async {
            // dry runs never write the state file
            let _lock = if self.dry_run { None } else { Some(self.store.lock()?) };
            self.run_batch(run_id).await
        }
        .instrument(span)
        .await
    }

    async fn run_batch(&self, run_id: Uuid) -> Result<BatchReport> {
        let mut report = BatchReport::new(run_id);
        let mut state = self.store.load();

        info!(
            "Starting batch: {} target languages, dry run: {}",
            self.languages.len(),
            self.dry_run
        );

        let videos = self.walker.videos().await;
        self.progress.set_length(videos.len() as u64);

        for video in &videos {
            report.videos += 1;
            self.progress.set_message(format!("video {}", video.id));

            for episode in self.walker.episodes(video).await {
                report.episodes += 1;

                if !episode.has_media() {
                    info!(video = %video.id, episode = %episode.id, "Episode has no media, skipping");
                    report.skipped_no_media += 1;
                    continue;
                }

                self.process_episode(&mut state, video, &episode, &mut report).await;

                if self.persist == PersistPolicy::PerEpisode {
                    self.checkpoint(&state);
                }
            }

            self.progress.inc(1);
        }
        self.progress.finish_and_clear();

        if !self.dry_run {
            self.store.persist(&state)?;
        }

        report.finished_at = Some(Utc::now());
        info!(
            "Batch finished: {} videos, {} episodes, {} transcribed, {} translated, {} already done, {} blocked, {} failed",
            report.videos,
            report.episodes,
            report.transcribed,
            report.translated,
            report.skipped_done,
            report.blocked,
            report.failed.len()
        );

        Ok(report)
    }

    async fn process_episode(
        &self,
        state: &mut ProcessState,
        video: &VideoRef,
        episode: &EpisodeRef,
        report: &mut BatchReport,
    ) {
        let model = &self.transcription;
        let transcript_key = UnitKey::transcribe(&model.namespace, &episode.id);

        if state.is_done(&transcript_key) {
            report.skipped_done += 1;
        } else if self.dry_run {
            report.planned.push(transcript_key.clone());
        } else {
            self.begin(state, &transcript_key);
            let outcome = self.executor
                .run_transcribe(model, &episode.media_url, &episode.id)
                .await;
            self.record(state, &transcript_key, outcome, video, report);
        }

        let transcript_path = self.executor.layout().transcript_path(&model.namespace, &episode.id);
        let transcript_ready = state.is_done(&transcript_key) && artifact_ready(&transcript_path).await;
        let mut blocked = 0;

        for target in &self.languages {
            let key = UnitKey::translate(&model.namespace, &target.tag, &episode.id);

            if state.is_done(&key) {
                report.skipped_done += 1;
                continue;
            }
            if self.dry_run {
                report.planned.push(key);
                continue;
            }
            if !transcript_ready {
                blocked += 1;
                continue;
            }

            self.begin(state, &key);
            let outcome = self.executor
                .run_translate(
                    model,
                    &self.translation,
                    &self.source_label,
                    &transcript_path,
                    target,
                    &episode.id,
                )
                .await;
            self.record(state, &key, outcome, video, report);
        }

        if blocked > 0 {
            if state.is_done(&transcript_key) {
                warn!(
                    video = %video.id,
                    episode = %episode.id,
                    "Transcript marked done but {} is missing or empty, {} translations deferred",
                    transcript_path.display(),
                    blocked
                );
            } else {
                info!(
                    video = %video.id,
                    episode = %episode.id,
                    "No transcript yet, {} translations deferred",
                    blocked
                );
            }
            report.blocked += blocked;
        }
    }

    fn begin(&self, state: &mut ProcessState, key: &UnitKey) {
        debug!(unit = %key, stage = %key.stage(), "Starting unit");
        state.mark_in_progress(key);
        if self.persist == PersistPolicy::PerUnit {
            self.checkpoint(state);
        }
    }

    fn record(
        &self,
        state: &mut ProcessState,
        key: &UnitKey,
        outcome: StageOutcome,
        video: &VideoRef,
        report: &mut BatchReport,
    ) {
        match outcome {
            StageOutcome::Succeeded => {
                state.mark_done(key);
                match key.stage() {
                    Stage::Transcribe => report.transcribed += 1,
                    Stage::Translate => report.translated += 1,
                }
                info!(
                    video = %video.id,
                    episode = %key.episode,
                    language = %key.language,
                    "{} done",
                    key.stage()
                );
            }
            StageOutcome::Failed { reason } => {
                state.mark_failed(key);
                report.failed.push(key.clone());
                error!(
                    video = %video.id,
                    episode = %key.episode,
                    model = %key.model,
                    language = %key.language,
                    "{} failed: {}",
                    key.stage(),
                    reason
                );
            }
            StageOutcome::TimedOut => {
                state.mark_failed(key);
                report.failed.push(key.clone());
                error!(
                    video = %video.id,
                    episode = %key.episode,
                    model = %key.model,
                    language = %key.language,
                    "{} timed out",
                    key.stage()
                );
            }
        }

        if self.persist == PersistPolicy::PerUnit {
            self.checkpoint(state);
        }
    }

    /// Intermediate persist; a failure is retried at the next checkpoint
    fn checkpoint(&self, state: &ProcessState) {
        if self.dry_run {
            return;
        }
        if let Err(e) = self.store.persist(state) {
            warn!("Failed to persist process state, will retry: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    use crate::catalog::MockCatalogClient;
    use crate::config::TranscriberImplementation;
    use crate::error::EpisubError;
    use crate::transcribe::MockTranscriber;
    use crate::translate::MockTranslator;

    const SRT: &str = "1\n00:00:00,000 --> 00:00:01,000\n你好\n\n";

    fn model() -> TranscriptionModel {
        TranscriptionModel {
            implementation: TranscriberImplementation::WhisperCpp,
            name: "medium".to_string(),
            namespace: "model".to_string(),
        }
    }

    fn catalog(episodes: &[(&str, &str)]) -> MockCatalogClient {
        let episodes: Vec<EpisodeRef> = episodes
            .iter()
            .map(|(id, url)| EpisodeRef { id: id.to_string(), media_url: url.to_string() })
            .collect();

        let mut client = MockCatalogClient::new();
        client
            .expect_list_videos()
            .returning(|| Ok(vec![VideoRef { id: "v1".to_string(), title: None }]));
        client
            .expect_list_episodes()
            .returning(move |_| Ok(episodes.clone()));
        client
    }

    fn transcriber(times: usize) -> MockTranscriber {
        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe()
            .times(times)
            .returning(|request, _| Ok(std::fs::write(&request.output_path, SRT)?));
        transcriber
    }

    /// Translator that records target tags and fails for `fail` (tag, episode)
    fn translator(calls: Arc<Mutex<Vec<String>>>, fail: Option<(&'static str, &'static str)>) -> MockTranslator {
        let mut translator = MockTranslator::new();
        translator.expect_translate().returning(move |request, _| {
            let episode = request.output_path.file_stem().unwrap().to_string_lossy().to_string();
            calls.lock().unwrap().push(format!("{}/{}", request.target_tag, episode));

            if fail == Some((request.target_tag.as_str(), episode.as_str())) {
                return Err(EpisubError::Translation("model refused".to_string()));
            }
            assert!(request.source_path.ends_with(format!("model/zh_hans/{}.srt", episode)));
            Ok(std::fs::write(&request.output_path, SRT)?)
        });
        translator
    }

    fn workflow(
        dir: &Path,
        catalog: MockCatalogClient,
        transcriber: MockTranscriber,
        translator: MockTranslator,
        languages: &[(&str, &str)],
    ) -> Workflow {
        let executor = StageExecutor::new(
            Box::new(transcriber),
            Box::new(translator),
            OutputLayout::new(dir.join("subtitle")),
            "zh",
        );

        Workflow::new(
            CatalogWalker::new(Box::new(catalog)),
            executor,
            StateStore::new(dir.join("state.json")),
            model(),
            TranslationModel { name: "llama".to_string(), max_retries: 0 },
            "Chinese (Simplified)",
            languages.iter().map(|(tag, label)| LanguageEntry::new(tag, label)).collect(),
        )
    }

    fn read_state(dir: &Path) -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(dir.join("state.json")).unwrap()).unwrap()
    }

    fn seed(dir: &Path, state: &str) {
        std::fs::write(dir.join("state.json"), state).unwrap();
    }

    fn write_transcript(dir: &Path, episode: &str) -> PathBuf {
        let path = dir.join(format!("subtitle/model/zh_hans/{}.srt", episode));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, SRT).unwrap();
        path
    }

    const EN_JA: &[(&str, &str)] = &[("en", "English"), ("ja", "Japanese")];

    #[tokio::test]
    async fn test_catalog_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let wf = workflow(
            dir.path(),
            catalog(&[("1", "u1"), ("2", "")]),
            transcriber(1),
            translator(calls.clone(), None),
            EN_JA,
        );

        let report = wf.run().await.unwrap();

        assert_eq!(report.episodes, 2);
        assert_eq!(report.skipped_no_media, 1);
        assert_eq!(report.transcribed, 1);
        assert_eq!(report.translated, 2);
        assert!(report.failed.is_empty());
        assert_eq!(*calls.lock().unwrap(), vec!["en/1", "ja/1"]);

        let state = read_state(dir.path());
        assert_eq!(state["model"]["zh_hans"]["1"], 1);
        assert_eq!(state["model"]["en"]["1"], 1);
        assert_eq!(state["model"]["ja"]["1"], 1);
        for language in ["zh_hans", "en", "ja"] {
            assert!(state["model"][language].get("2").is_none());
        }
        assert!(dir.path().join("subtitle/model/ja/1.srt").exists());
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        seed(
            dir.path(),
            r#"{"model": {"zh_hans": {"1": 1}, "en": {"1": 1}, "ja": {"1": 1}}}"#,
        );
        let calls = Arc::new(Mutex::new(Vec::new()));
        let wf = workflow(
            dir.path(),
            catalog(&[("1", "u1"), ("2", "")]),
            MockTranscriber::new(),
            translator(calls.clone(), None),
            EN_JA,
        );

        let report = wf.run().await.unwrap();

        assert_eq!(report.skipped_done, 3);
        assert_eq!(report.transcribed + report.translated, 0);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resume_only_translates_missing_languages() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), r#"{"model": {"zh_hans": {"1": 1}, "en": {"1": 0}}}"#);
        write_transcript(dir.path(), "1");
        let calls = Arc::new(Mutex::new(Vec::new()));
        let wf = workflow(
            dir.path(),
            catalog(&[("1", "u1")]),
            MockTranscriber::new(),
            translator(calls.clone(), None),
            EN_JA,
        );

        let report = wf.run().await.unwrap();

        assert_eq!(report.transcribed, 0);
        assert_eq!(report.translated, 2);
        assert_eq!(*calls.lock().unwrap(), vec!["en/1", "ja/1"]);
        assert_eq!(read_state(dir.path())["model"]["en"]["1"], 1);
    }

    #[tokio::test]
    async fn test_failed_language_does_not_stop_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let wf = workflow(
            dir.path(),
            catalog(&[("1", "u1"), ("2", "u2")]),
            transcriber(2),
            translator(calls.clone(), Some(("ja", "1"))),
            &[("en", "English"), ("ja", "Japanese"), ("ko", "Korean")],
        );

        let report = wf.run().await.unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["en/1", "ja/1", "ko/1", "en/2", "ja/2", "ko/2"]
        );
        assert_eq!(report.failed, vec![UnitKey::translate("model", "ja", "1")]);
        assert_eq!(report.translated, 5);

        let state = read_state(dir.path());
        assert_eq!(state["model"]["ja"]["1"], 0);
        assert_eq!(state["model"]["ko"]["1"], 1);
        assert_eq!(state["model"]["ja"]["2"], 1);
        assert_eq!(state["model"]["zh_hans"]["2"], 1);
    }

    #[tokio::test]
    async fn test_failed_transcription_blocks_translations() {
        let dir = tempfile::tempdir().unwrap();
        let mut failing = MockTranscriber::new();
        failing
            .expect_transcribe()
            .times(1)
            .returning(|_, _| Err(EpisubError::Transcriber("whisper crashed".to_string())));
        let wf = workflow(
            dir.path(),
            catalog(&[("1", "u1")]),
            failing,
            MockTranslator::new(),
            EN_JA,
        );

        let report = wf.run().await.unwrap();

        assert_eq!(report.failed, vec![UnitKey::transcribe("model", "1")]);
        assert_eq!(report.blocked, 2);
        let state = read_state(dir.path());
        assert_eq!(state["model"]["zh_hans"]["1"], 0);
        assert!(state["model"].get("en").is_none());
    }

    #[tokio::test]
    async fn test_done_transcript_without_artifact_blocks_translations() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), r#"{"model": {"zh_hans": {"1": 1}}}"#);
        let wf = workflow(
            dir.path(),
            catalog(&[("1", "u1")]),
            MockTranscriber::new(),
            MockTranslator::new(),
            EN_JA,
        );

        let report = wf.run().await.unwrap();

        assert_eq!(report.blocked, 2);
        assert_eq!(read_state(dir.path())["model"]["zh_hans"]["1"], 1);
    }

    #[tokio::test]
    async fn test_done_units_survive_later_failures() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), r#"{"model": {"zh_hans": {"1": 1}, "en": {"1": 1}}}"#);
        write_transcript(dir.path(), "1");
        let calls = Arc::new(Mutex::new(Vec::new()));
        let wf = workflow(
            dir.path(),
            catalog(&[("1", "u1")]),
            MockTranscriber::new(),
            translator(calls.clone(), Some(("ja", "1"))),
            EN_JA,
        );

        let report = wf.run().await.unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["ja/1"]);
        assert_eq!(report.failed.len(), 1);
        let state = read_state(dir.path());
        assert_eq!(state["model"]["zh_hans"]["1"], 1);
        assert_eq!(state["model"]["en"]["1"], 1);
        assert_eq!(state["model"]["ja"]["1"], 0);
    }

    #[tokio::test]
    async fn test_dry_run_plans_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let wf = workflow(
            dir.path(),
            catalog(&[("1", "u1"), ("2", "")]),
            MockTranscriber::new(),
            MockTranslator::new(),
            EN_JA,
        )
        .dry_run(true);

        let report = wf.run().await.unwrap();

        assert_eq!(
            report.planned,
            vec![
                UnitKey::transcribe("model", "1"),
                UnitKey::translate("model", "en", "1"),
                UnitKey::translate("model", "ja", "1"),
            ]
        );
        assert!(!dir.path().join("state.json").exists());
        assert!(!dir.path().join("subtitle").exists());
    }

    #[tokio::test]
    async fn test_unreachable_catalog_is_an_empty_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut client = MockCatalogClient::new();
        client
            .expect_list_videos()
            .returning(|| Err(EpisubError::Catalog("connection refused".to_string())));
        let wf = workflow(
            dir.path(),
            client,
            MockTranscriber::new(),
            MockTranslator::new(),
            EN_JA,
        )
        .persist_policy(PersistPolicy::PerEpisode);

        let report = tokio_test::assert_ok!(wf.run().await);
        assert_eq!(report.videos, 0);
        assert_eq!(read_state(dir.path()), serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_run_refuses_while_state_is_locked() {
        let dir = tempfile::tempdir().unwrap();
        let held = StateStore::new(dir.path().join("state.json")).lock().unwrap();

        let mut client = MockCatalogClient::new();
        client.expect_list_videos().times(0);
        let wf = workflow(dir.path(), client, MockTranscriber::new(), MockTranslator::new(), EN_JA);

        assert!(matches!(wf.run().await, Err(EpisubError::State(_))));
        assert!(!dir.path().join("state.json").exists());

        drop(held);
        let wf = workflow(dir.path(), catalog(&[]), MockTranscriber::new(), MockTranslator::new(), EN_JA);
        tokio_test::assert_ok!(wf.run().await);
        assert!(!dir.path().join("state.json.lock").exists());
    }

    #[tokio::test]
    async fn test_concurrent_runs_cannot_share_state() {
        let dir = tempfile::tempdir().unwrap();
        let first = workflow(
            dir.path(),
            catalog(&[("1", "u1")]),
            transcriber(1),
            translator(Arc::new(Mutex::new(Vec::new())), None),
            EN_JA,
        );
        let second = workflow(
            dir.path(),
            catalog(&[("2", "u2")]),
            MockTranscriber::new(),
            MockTranslator::new(),
            EN_JA,
        );

        let (first, second) = tokio::join!(first.run(), second.run());

        assert_eq!(first.unwrap().transcribed, 1);
        assert!(matches!(second, Err(EpisubError::State(_))));
        let state = read_state(dir.path());
        assert_eq!(state["model"]["zh_hans"]["1"], 1);
        assert_eq!(state["model"]["ja"]["1"], 1);
    }

    #[tokio::test]
    async fn test_per_unit_policy_persists_before_next_unit() {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().to_path_buf();

        let mut translator = MockTranslator::new();
        translator.expect_translate().times(2).returning(move |request, _| {
            let on_disk = read_state(&state_dir);
            assert_eq!(on_disk["model"]["zh_hans"]["1"], 1);
            // the unit being worked on is already recorded as not done
            assert_eq!(on_disk["model"][request.target_tag.as_str()]["1"], 0);
            if request.target_tag == "ja" {
                assert_eq!(on_disk["model"]["en"]["1"], 1);
            }
            Ok(std::fs::write(&request.output_path, SRT)?)
        });

        let wf = workflow(dir.path(), catalog(&[("1", "u1")]), transcriber(1), translator, EN_JA);
        let report = wf.run().await.unwrap();
        assert_eq!(report.translated, 2);
    }

    #[tokio::test]
    async fn test_per_episode_policy_persists_between_episodes() {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().to_path_buf();

        let mut transcriber = MockTranscriber::new();
        transcriber.expect_transcribe().times(2).returning(move |request, _| {
            if request.media_url == "u1" {
                assert!(!state_dir.join("state.json").exists());
            } else {
                let on_disk = read_state(&state_dir);
                assert_eq!(on_disk["model"]["zh_hans"]["1"], 1);
                assert_eq!(on_disk["model"]["en"]["1"], 1);
                assert_eq!(on_disk["model"]["ja"]["1"], 1);
                assert!(on_disk["model"]["zh_hans"].get("2").is_none());
            }
            Ok(std::fs::write(&request.output_path, SRT)?)
        });

        let wf = workflow(
            dir.path(),
            catalog(&[("1", "u1"), ("2", "u2")]),
            transcriber,
            translator(Arc::new(Mutex::new(Vec::new())), None),
            EN_JA,
        )
        .persist_policy(PersistPolicy::PerEpisode);

        let report = wf.run().await.unwrap();
        assert_eq!(report.transcribed, 2);
        assert_eq!(read_state(dir.path())["model"]["ja"]["2"], 1);
    }
}
