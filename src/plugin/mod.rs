//! Plugins: recurring work discovered on disk, gated by run history.

mod duration;
mod gate;
mod recorder;
mod scanner;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use duration::parse_duration;
pub use gate::{GateDecision, evaluate_gate};
pub use recorder::{PluginRun, Recorder, RecorderError, RunOutcome};
pub use scanner::{PLUGINS_DIR, PLUGIN_FILE, ScanError, Scanner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateType {
    /// Minimum time between runs.
    Cooldown,
    Cron,
    Condition,
    Event,
    Manual,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for GateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Cooldown => "cooldown",
            Self::Cron => "cron",
            Self::Condition => "condition",
            Self::Event => "event",
            Self::Manual => "manual",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Rate rule attached to a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gate {
    #[serde(rename = "type")]
    pub gate_type: GateType,
    /// Window for cooldown gates, e.g. `1h` or `30m`.
    #[serde(default)]
    pub duration: Option<String>,
}

/// Where a plugin was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "name")]
pub enum PluginLocation {
    Town,
    Rig(String),
}

impl fmt::Display for PluginLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Town => f.write_str("town"),
            Self::Rig(name) => write!(f, "rig:{name}"),
        }
    }
}

/// A unit of recurring work handed to a dog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plugin {
    pub name: String,
    pub description: String,
    /// Markdown handed verbatim to the dog.
    pub instructions: String,
    pub gate: Option<Gate>,
    pub location: PluginLocation,
    pub path: PathBuf,
}

impl Plugin {
    /// Work description recorded on the dog while it runs this plugin.
    pub fn work_description(&self) -> String {
        format!("plugin:{}", self.name)
    }
}
