use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::PLUGINS_DIR;
use crate::fsutil::{self, DEFAULT_LOCK_TIMEOUT, LockError, LockGuard};

const RUNS_FILE: &str = ".runs.jsonl";
const LOCK_FILE: &str = ".runs.lock";

/// How far a dispatch got before its run was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Session started and the task mail was delivered.
    Dispatched,
    /// Session started but the task mail could not be sent.
    MailFailed,
}

/// One recorded execution of a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginRun {
    pub plugin: String,
    pub ran_at: DateTime<Utc>,
    #[serde(default)]
    pub dog: Option<String>,
    pub outcome: RunOutcome,
}

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("run history {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("encoding run record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Append-only run history backing the plugin gates.
///
/// Stored as `<town>/plugins/.runs.jsonl`, one [`PluginRun`] per line.
#[derive(Debug, Clone)]
pub struct Recorder {
    dir: PathBuf,
    lock_timeout: Duration,
}

impl Recorder {
    pub fn new(town_root: &Path) -> Self {
        Self {
            dir: town_root.join(PLUGINS_DIR),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    fn runs_path(&self) -> PathBuf {
        self.dir.join(RUNS_FILE)
    }

    pub fn record_run(&self, run: &PluginRun) -> Result<(), RecorderError> {
        let line = serde_json::to_string(run)?;
        let _lock = LockGuard::exclusive(&self.dir.join(LOCK_FILE), self.lock_timeout)?;
        let path = self.runs_path();
        fsutil::append_line(&path, &line).map_err(|source| RecorderError::Storage { path, source })?;
        tracing::debug!(plugin = %run.plugin, outcome = ?run.outcome, "recorded plugin run");
        Ok(())
    }

    /// Runs of `plugin` within the trailing `window`, ending now.
    ///
    /// A window reaching past the earliest representable time covers the
    /// whole history.
    pub fn count_runs_since(&self, plugin: &str, window: TimeDelta) -> Result<usize, RecorderError> {
        let cutoff = Utc::now()
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Ok(self
            .runs()?
            .iter()
            .filter(|r| r.plugin == plugin && r.ran_at >= cutoff)
            .count())
    }

    /// Most recent run of `plugin`, if any.
    pub fn last_run(&self, plugin: &str) -> Result<Option<PluginRun>, RecorderError> {
        Ok(self
            .runs()?
            .into_iter()
            .filter(|r| r.plugin == plugin)
            .max_by_key(|r| r.ran_at))
    }

    /// Every recorded run in file order.
    pub fn runs(&self) -> Result<Vec<PluginRun>, RecorderError> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let _lock = LockGuard::shared(&self.dir.join(LOCK_FILE), self.lock_timeout)?;
        let path = self.runs_path();
        let content = fsutil::read_or_empty(&path).map_err(|source| RecorderError::Storage {
            path: path.clone(),
            source,
        })?;
        Ok(content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| match serde_json::from_str(l) {
                Ok(run) => Some(run),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "skipping unreadable run record: {e}");
                    None
                }
            })
            .collect())
    }
}
