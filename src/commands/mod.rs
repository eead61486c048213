pub mod cycle;
pub mod dogs;
pub mod heartbeat;
pub mod init;
pub mod mail;
pub mod pending;
pub mod plugins;
pub mod schema;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use crate::config::{self, Config};
use crate::dog::{DogManager, TmuxSessions};
use crate::mail::Router;
use crate::plugin::{Recorder, Scanner};
use crate::scheduler::Scheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Text,
    Json,
}

impl OutputFormat {
    /// The explicit format, else pretty on a terminal and text otherwise.
    pub fn resolve(explicit: Option<Self>) -> Self {
        explicit.unwrap_or_else(|| {
            if std::io::stdout().is_terminal() {
                Self::Pretty
            } else {
                Self::Text
            }
        })
    }
}

/// A town root and its config, with the stores built from them.
#[derive(Debug, Clone)]
pub struct Town {
    pub root: PathBuf,
    pub config: Config,
}

impl Town {
    pub fn open(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let root = config::resolve_town(explicit)?;
        let config = Config::load_town(&root)?;
        Ok(Self { root, config })
    }

    pub fn dogs(&self) -> DogManager {
        DogManager::new(&self.root).with_lock_timeout(self.config.lock_timeout())
    }

    pub fn router(&self) -> Router {
        Router::new(&self.root).with_lock_timeout(self.config.lock_timeout())
    }

    pub fn recorder(&self) -> Recorder {
        Recorder::new(&self.root).with_lock_timeout(self.config.lock_timeout())
    }

    pub fn scanner(&self) -> Scanner {
        Scanner::new(&self.root, &self.config.town.rigs)
    }

    pub fn sessions(&self) -> TmuxSessions {
        TmuxSessions::new(
            &self.config.session.prefix,
            &self.config.session.command,
            &self.root,
            self.config.session_timeout(),
        )
    }

    pub fn scheduler(&self) -> Scheduler<TmuxSessions> {
        Scheduler::new(
            self.dogs(),
            self.sessions(),
            self.scanner(),
            self.recorder(),
            self.router(),
            self.config.scheduler_options(),
        )
    }
}
