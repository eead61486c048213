//! The dog fleet: persisted dog records, the registry that mutates them, and
//! the session controller that runs them.

mod manager;
mod session;

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use manager::{DOGS_DIR, DogManager};
pub use session::{SessionController, SessionError, StartOptions, TmuxSessions};

use crate::fsutil::LockError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DogState {
    Idle,
    Working,
}

impl fmt::Display for DogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Working => f.write_str("working"),
        }
    }
}

/// What a dog is doing. Stored flattened into the dog record as
/// `"state": "idle"` or `"state": "working", "work": "..."`, so a working
/// dog always carries its work and an idle one never does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum Assignment {
    Idle,
    Working { work: String },
}

/// A worker in the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dog {
    pub name: String,
    #[serde(flatten)]
    pub assignment: Assignment,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl Dog {
    pub fn new(name: &str) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            assignment: Assignment::Idle,
            created_at: now,
            last_active: now,
        }
    }

    pub const fn state(&self) -> DogState {
        match self.assignment {
            Assignment::Idle => DogState::Idle,
            Assignment::Working { .. } => DogState::Working,
        }
    }

    /// The current work description, present iff the dog is working.
    pub fn work(&self) -> Option<&str> {
        match &self.assignment {
            Assignment::Idle => None,
            Assignment::Working { work } => Some(work),
        }
    }

    pub const fn is_idle(&self) -> bool {
        matches!(self.assignment, Assignment::Idle)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DogError {
    #[error("dog {0:?} not found")]
    NotFound(String),

    #[error("dog {name:?} is already working on {work:?}")]
    Conflict { name: String, work: String },

    #[error("dog {0:?} already exists")]
    AlreadyExists(String),

    #[error("invalid dog name {0:?}: must match [A-Za-z0-9][A-Za-z0-9_-]*")]
    InvalidName(String),

    #[error("work description for dog {0:?} is empty")]
    InvalidWork(String),

    #[error("dog storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt dog record {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Lock(#[from] LockError),
}
