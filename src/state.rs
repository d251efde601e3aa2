//! Durable record of which work units are complete.
//!
//! In memory every unit carries the full [`UnitStatus`]; on disk the state is a
//! nested JSON document `{ model: { language: { episode: 0 | 1 } } }` where only
//! `Done` is written as `1`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Result, EpisubError};
use crate::unit::UnitKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitStatus {
    Pending,
    InProgress,
    Done,
    Failed,
}

impl UnitStatus {
    fn encode(self) -> u8 {
        match self {
            UnitStatus::Done => 1,
            _ => 0,
        }
    }

    fn decode(value: &serde_json::Value) -> Self {
        if value.as_u64() == Some(1) {
            UnitStatus::Done
        } else {
            UnitStatus::Pending
        }
    }
}

type Snapshot<V> = BTreeMap<String, BTreeMap<String, BTreeMap<String, V>>>;

#[derive(Debug, Clone, Default)]
pub struct ProcessState {
    units: HashMap<UnitKey, UnitStatus>,
}

impl ProcessState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status of a unit; units never referenced are `Pending`
    pub fn status(&self, key: &UnitKey) -> UnitStatus {
        self.units.get(key).copied().unwrap_or(UnitStatus::Pending)
    }

    pub fn is_done(&self, key: &UnitKey) -> bool {
        self.status(key) == UnitStatus::Done
    }

    pub fn mark_in_progress(&mut self, key: &UnitKey) {
        self.transition(key, UnitStatus::InProgress);
    }

    pub fn mark_done(&mut self, key: &UnitKey) {
        self.transition(key, UnitStatus::Done);
    }

    pub fn mark_failed(&mut self, key: &UnitKey) {
        self.transition(key, UnitStatus::Failed);
    }

    /// Drop a unit back to `Pending` even if it was `Done`.
    /// Only used when an operator reconciles the state against the output tree.
    pub fn demote(&mut self, key: &UnitKey) {
        self.units.insert(key.clone(), UnitStatus::Pending);
    }

    fn transition(&mut self, key: &UnitKey, next: UnitStatus) {
        let current = self.units.entry(key.clone()).or_insert(UnitStatus::Pending);
        if *current == UnitStatus::Done && next != UnitStatus::Done {
            warn!(unit = %key, to = ?next, "Ignoring transition out of Done");
            return;
        }
        *current = next;
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&UnitKey, UnitStatus)> {
        self.units.iter().map(|(k, v)| (k, *v))
    }

    fn to_snapshot(&self) -> Snapshot<u8> {
        let mut snapshot: Snapshot<u8> = BTreeMap::new();
        for (key, status) in &self.units {
            snapshot
                .entry(key.model.clone())
                .or_default()
                .entry(key.language.clone())
                .or_default()
                .insert(key.episode.clone(), status.encode());
        }
        snapshot
    }

    fn from_snapshot(snapshot: Snapshot<serde_json::Value>) -> Self {
        let mut units = HashMap::new();
        for (model, languages) in snapshot {
            for (language, episodes) in languages {
                for (episode, value) in episodes {
                    units.insert(
                        UnitKey::new(&model, &language, &episode),
                        UnitStatus::decode(&value),
                    );
                }
            }
        }
        Self { units }
    }
}

/// Loads and persists the [`ProcessState`] at a fixed path
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<state file>.lock`, held by the run that owns the state file
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// Take exclusive ownership of the state file for one run.
    ///
    /// The lock file holds the owner's pid. A lock left behind by a process
    /// that is no longer alive is taken over.
    pub fn lock(&self) -> Result<StateLock> {
        let path = self.lock_path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        match StateLock::create(&path) {
            Err(EpisubError::Io(e)) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let owner = std::fs::read_to_string(&path).unwrap_or_default();
                if let Some(pid) = owner_alive(owner.trim()) {
                    return Err(EpisubError::State(format!(
                        "{} is in use by another run (pid {}); remove {} if that run is gone",
                        self.path.display(),
                        pid,
                        path.display()
                    )));
                }

                warn!("Taking over stale lock {} (owner '{}')", path.display(), owner.trim());
                std::fs::remove_file(&path)?;
                StateLock::create(&path)
            }
            other => other,
        }
    }

    /// Load the persisted state.
    ///
    /// A missing file is a first run. An unreadable or malformed file is
    /// logged and treated as empty, discarding whatever it held.
    pub fn load(&self) -> ProcessState {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No process state at {}, starting fresh", self.path.display());
                return ProcessState::new();
            }
            Err(e) => {
                warn!("Failed to read process state {}: {}; starting fresh", self.path.display(), e);
                return ProcessState::new();
            }
        };

        match serde_json::from_str::<Snapshot<serde_json::Value>>(&content) {
            Ok(snapshot) => {
                let state = ProcessState::from_snapshot(snapshot);
                info!("Loaded {} units from {}", state.len(), self.path.display());
                state
            }
            Err(e) => {
                warn!("Malformed process state {}: {}; starting fresh", self.path.display(), e);
                ProcessState::new()
            }
        }
    }

    /// Write the whole state, replacing the previous file atomically
    pub fn persist(&self, state: &ProcessState) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let content = serde_json::to_string_pretty(&state.to_snapshot())?;

        let mut file = tempfile::NamedTempFile::new_in(&dir)?;
        file.write_all(content.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| {
            EpisubError::State(format!("Failed to replace {}: {}", self.path.display(), e))
        })?;

        debug!("Persisted {} units to {}", state.len(), self.path.display());
        Ok(())
    }
}

/// Exclusive claim on a state file; released on drop
#[derive(Debug)]
pub struct StateLock {
    path: PathBuf,
}

impl StateLock {
    fn create(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        file.write_all(std::process::id().to_string().as_bytes())?;
        file.sync_all()?;

        debug!("Acquired {}", path.display());
        Ok(Self { path: path.to_path_buf() })
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to release {}: {}", self.path.display(), e);
        }
    }
}

/// The recorded owner pid when that process still runs
fn owner_alive(owner: &str) -> Option<u32> {
    let pid = owner.parse::<u32>().ok().filter(|pid| *pid > 0 && *pid <= i32::MAX as u32)?;
    if pid == std::process::id() {
        return Some(pid);
    }

    #[cfg(unix)]
    {
        let running = std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .stderr(std::process::Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(true);
        running.then_some(pid)
    }

    #[cfg(not(unix))]
    {
        Some(pid)
    }
}
