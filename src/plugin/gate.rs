use chrono::TimeDelta;

use super::{GateType, Plugin, Recorder, RecorderError, parse_duration};

/// Outcome of checking a plugin's gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// No gate, a non-cooldown gate, or a cooldown with no recent runs.
    Open,
    /// Ran `runs` times inside the cooldown window.
    CoolingDown { runs: usize, window: TimeDelta },
    /// The gate could not be interpreted, so it does not block.
    FailOpen { reason: String },
}

impl GateDecision {
    pub const fn is_eligible(&self) -> bool {
        !matches!(self, Self::CoolingDown { .. })
    }
}

/// Decide whether `plugin` may be dispatched now.
///
/// Only cooldown gates are enforced. A cooldown with a missing or unparseable
/// duration fails open.
pub fn evaluate_gate(plugin: &Plugin, recorder: &Recorder) -> Result<GateDecision, RecorderError> {
    let Some(gate) = &plugin.gate else {
        return Ok(GateDecision::Open);
    };
    if gate.gate_type != GateType::Cooldown {
        return Ok(GateDecision::Open);
    }

    let raw = gate.duration.as_deref().unwrap_or_default();
    let Some(window) = parse_duration(raw) else {
        return Ok(GateDecision::FailOpen {
            reason: format!("invalid cooldown duration {raw:?}"),
        });
    };

    let runs = recorder.count_runs_since(&plugin.name, window)?;
    if runs == 0 {
        Ok(GateDecision::Open)
    } else {
        Ok(GateDecision::CoolingDown { runs, window })
    }
}
