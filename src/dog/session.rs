use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::subprocess::{RunOutput, Tool};

/// Options for bringing up a dog's session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOptions {
    /// The work the dog was assigned, e.g. `plugin:rotate-logs`.
    pub work: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session for dog {dog:?} is already running")]
    AlreadyRunning { dog: String },

    #[error("starting session for dog {dog:?}: {message}")]
    Start { dog: String, message: String },

    /// The liveness probe itself failed. This is "unknown", not "dead".
    #[error("probing session for dog {dog:?}: {message}")]
    Probe { dog: String, message: String },
}

/// The external system that runs dog processes.
///
/// The scheduler consults it only to start a session and to ask whether one
/// is alive. Implementations must bound their own latency.
pub trait SessionController {
    fn start(&self, dog: &str, options: &StartOptions) -> Result<(), SessionError>;

    /// `Ok(false)` only when the session is known to be gone. Anything the
    /// controller cannot determine is an error.
    fn is_running(&self, dog: &str) -> Result<bool, SessionError>;
}

/// Dog sessions backed by detached tmux sessions named `<prefix>-dog-<name>`.
#[derive(Debug, Clone)]
pub struct TmuxSessions {
    binary: String,
    prefix: String,
    command: String,
    workdir: PathBuf,
    timeout: Duration,
}

impl TmuxSessions {
    pub fn new(prefix: &str, command: &str, workdir: &Path, timeout: Duration) -> Self {
        Self {
            binary: "tmux".to_string(),
            prefix: prefix.to_string(),
            command: command.to_string(),
            workdir: workdir.to_path_buf(),
            timeout,
        }
    }

    /// Use a different tmux executable.
    #[must_use]
    pub fn with_binary(mut self, binary: &str) -> Self {
        self.binary = binary.to_string();
        self
    }

    pub fn session_name(&self, dog: &str) -> String {
        format!("{}-dog-{dog}", self.prefix)
    }

    fn tmux(&self) -> Tool {
        Tool::new(&self.binary)
            .timeout(self.timeout)
            .current_dir(&self.workdir)
    }
}

impl SessionController for TmuxSessions {
    fn start(&self, dog: &str, options: &StartOptions) -> Result<(), SessionError> {
        let start_err = |message: String| SessionError::Start {
            dog: dog.to_string(),
            message,
        };

        match self.is_running(dog) {
            Ok(true) => {
                return Err(SessionError::AlreadyRunning {
                    dog: dog.to_string(),
                });
            }
            Ok(false) => {}
            Err(e) => return Err(start_err(e.to_string())),
        }

        let session = self.session_name(dog);
        let workdir = self.workdir.to_string_lossy();
        let dog_env = format!("KENNEL_DOG={dog}");
        let work_env = format!("KENNEL_WORK={}", options.work);
        self.tmux()
            .args(&[
                "new-session",
                "-d",
                "-s",
                &session,
                "-c",
                &workdir,
                "-e",
                &dog_env,
                "-e",
                &work_env,
                &self.command,
            ])
            .run_ok()
            .map_err(|e| start_err(format!("{e:#}")))?;

        tracing::info!(%dog, %session, work = %options.work, "started dog session");
        Ok(())
    }

    fn is_running(&self, dog: &str) -> Result<bool, SessionError> {
        let target = format!("={}", self.session_name(dog));
        let output = self
            .tmux()
            .args(&["has-session", "-t", &target])
            .run()
            .map_err(|e| SessionError::Probe {
                dog: dog.to_string(),
                message: format!("{e:#}"),
            })?;
        classify_has_session(&output).map_err(|message| SessionError::Probe {
            dog: dog.to_string(),
            message,
        })
    }
}

/// Interpret `tmux has-session`. Only the known "absent" answers count as
/// not running; any other failure is reported as an error.
fn classify_has_session(output: &RunOutput) -> Result<bool, String> {
    if output.success() {
        return Ok(true);
    }
    let stderr = output.stderr.to_ascii_lowercase();
    let absent = ["can't find session", "no server running", "error connecting to"];
    if absent.iter().any(|needle| stderr.contains(needle)) {
        Ok(false)
    } else {
        Err(format!(
            "tmux has-session exited {}: {}",
            output.exit_code,
            output.stderr.trim()
        ))
    }
}
