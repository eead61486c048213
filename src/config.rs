use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::TimeDelta;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ExitError;
use crate::plugin::parse_duration;
use crate::scheduler::SchedulerOptions;

/// Config file name constants.
pub const CONFIG_TOML: &str = "kennel.toml";
pub const CONFIG_JSON: &str = "kennel.json";

/// Find the config file in a town root, preferring kennel.toml over kennel.json.
/// Returns None if neither exists.
pub fn find_config(dir: &Path) -> Option<PathBuf> {
    let toml_path = dir.join(CONFIG_TOML);
    if toml_path.exists() {
        return Some(toml_path);
    }
    let json_path = dir.join(CONFIG_JSON);
    if json_path.exists() {
        return Some(json_path);
    }
    None
}

/// Resolve the town root: an explicit path (with `~` expanded) or the
/// current directory.
pub fn resolve_town(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(path) => Ok(expand_home(path)),
        None => std::env::current_dir().context("could not determine current directory"),
    }
}

fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}

/// Top-level kennel.toml config.
///
/// Every section has defaults, so an empty file (or no file) is a valid
/// config. Multi-word keys also accept camelCase when loading JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub town: TownConfig,
    #[serde(default)]
    pub dogs: DogsConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub pending: PendingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            town: TownConfig::default(),
            dogs: DogsConfig::default(),
            session: SessionConfig::default(),
            scheduler: SchedulerConfig::default(),
            pending: PendingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TownConfig {
    #[serde(default = "default_town_name")]
    pub name: String,
    /// Rigs scanned for plugins after the town itself, in name order.
    #[serde(default)]
    pub rigs: Vec<String>,
}

impl Default for TownConfig {
    fn default() -> Self {
        Self {
            name: default_town_name(),
            rigs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DogsConfig {
    /// Dogs provisioned by `init`, `dogs sync` and `heartbeat`.
    #[serde(default = "default_pool")]
    pub pool: Vec<String>,
}

impl Default for DogsConfig {
    fn default() -> Self {
        Self {
            pool: default_pool(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SessionConfig {
    /// Command run inside each dog's tmux session.
    #[serde(default = "default_session_command")]
    pub command: String,
    /// Session names are `<prefix>-dog-<name>`.
    #[serde(default = "default_session_prefix")]
    pub prefix: String,
    #[serde(default = "default_timeout_10", alias = "timeoutSecs")]
    pub timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command: default_session_command(),
            prefix: default_session_prefix(),
            timeout_secs: default_timeout_10(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SchedulerConfig {
    /// Dispatch plugins each cycle. When false, cycles only repair stuck dogs.
    #[serde(default = "default_true")]
    pub autonomous: bool,
    /// Address task mail is sent from.
    #[serde(default = "default_sender")]
    pub sender: String,
    #[serde(default = "default_timeout_120", alias = "cycleTimeoutSecs")]
    pub cycle_timeout_secs: u64,
    #[serde(default = "default_heartbeat", alias = "heartbeatSecs")]
    pub heartbeat_secs: u64,
    #[serde(default = "default_lock_timeout", alias = "lockTimeoutSecs")]
    pub lock_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            autonomous: true,
            sender: default_sender(),
            cycle_timeout_secs: default_timeout_120(),
            heartbeat_secs: default_heartbeat(),
            lock_timeout_secs: default_lock_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PendingConfig {
    /// Spawn notifications older than this are pruned, e.g. `5m` or `1h`.
    #[serde(default = "default_max_age", alias = "maxAge")]
    pub max_age: String,
}

impl Default for PendingConfig {
    fn default() -> Self {
        Self {
            max_age: default_max_age(),
        }
    }
}

// Default value functions for serde
fn default_version() -> String { "1".into() }
fn default_town_name() -> String { "town".into() }
fn default_pool() -> Vec<String> { vec!["alpha".into(), "bravo".into(), "charlie".into()] }
fn default_session_command() -> String { "claude".into() }
fn default_session_prefix() -> String { "kn".into() }
fn default_sender() -> String { "daemon".into() }
fn default_max_age() -> String { "5m".into() }
fn default_timeout_10() -> u64 { 10 }
fn default_timeout_120() -> u64 { 120 }
fn default_heartbeat() -> u64 { 180 }
fn default_lock_timeout() -> u64 { 5 }
fn default_true() -> bool { true }

impl Config {
    /// Load config from a file (TOML or JSON, auto-detected by extension).
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            "toml" => Self::parse_toml(&contents),
            "json" => Self::parse_json(&contents),
            _ => Self::parse_toml(&contents).or_else(|_| Self::parse_json(&contents)),
        }
    }

    /// Load the town's config, falling back to defaults when it has none.
    pub fn load_town(town_root: &Path) -> anyhow::Result<Self> {
        match find_config(town_root) {
            Some(path) => Self::load(&path),
            None => {
                tracing::debug!(town = %town_root.display(), "no kennel config, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Parse config from a TOML string.
    pub fn parse_toml(toml_str: &str) -> anyhow::Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| ExitError::Config(format!("invalid {CONFIG_TOML}: {e}")).into())
    }

    /// Parse config from a JSON string.
    pub fn parse_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ExitError::Config(format!("invalid {CONFIG_JSON}: {e}")).into())
    }

    /// Serialize config to a TOML string with helpful comments.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        let raw = toml::to_string_pretty(self).context("serializing config to TOML")?;

        let mut doc: toml_edit::DocumentMut = raw
            .parse()
            .context("parsing generated TOML for comment injection")?;

        doc.decor_mut()
            .set_prefix("# Kennel town configuration\n# Run `kennel schema` for every key.\n\n");

        fn set_table_comment(doc: &mut toml_edit::DocumentMut, key: &str, comment: &str) {
            if let Some(tbl) = doc.get_mut(key).and_then(toml_edit::Item::as_table_mut) {
                tbl.decor_mut().set_prefix(comment);
            }
        }

        set_table_comment(&mut doc, "town", "\n# Town identity and the rigs scanned for plugins\n");
        set_table_comment(&mut doc, "dogs", "\n# Dogs kept in the kennel\n");
        set_table_comment(&mut doc, "session", "\n# tmux sessions the dogs run in\n");
        set_table_comment(
            &mut doc,
            "scheduler",
            "\n# Dispatch cycle (timeouts in seconds)\n# autonomous = false only repairs stuck dogs\n",
        );
        set_table_comment(&mut doc, "pending", "\n# Pending spawn notifications\n");

        Ok(doc.to_string())
    }

    /// Bound on every file lock taken by the stores.
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.scheduler.lock_timeout_secs)
    }

    pub const fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session.timeout_secs)
    }

    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.heartbeat_secs)
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            autonomous: self.scheduler.autonomous,
            sender: self.scheduler.sender.clone(),
            cycle_timeout: Duration::from_secs(self.scheduler.cycle_timeout_secs),
        }
    }

    /// The pending-spawn staleness window.
    pub fn pending_max_age(&self) -> anyhow::Result<TimeDelta> {
        parse_duration(&self.pending.max_age).ok_or_else(|| {
            ExitError::Config(format!(
                "invalid pending.max_age {:?}: expected e.g. 5m or 1h",
                self.pending.max_age
            ))
            .into()
        })
    }
}
