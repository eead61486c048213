use std::process::ExitCode;

/// Errors that cause kennel to exit with a specific code.
#[derive(Debug, thiserror::Error)]
pub enum ExitError {
    #[error("config error: {0}")]
    Config(String),

    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    #[error("{tool} failed (exit {code}): {message}")]
    ToolFailed {
        tool: String,
        code: i32,
        message: String,
    },

    #[error("{tool} timed out after {timeout_ms}ms")]
    Timeout { tool: String, timeout_ms: u128 },

    #[error("{0}")]
    Other(String),
}

impl ExitError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) => ExitCode::from(2),
            Self::ToolNotFound { .. } => ExitCode::from(3),
            Self::ToolFailed { .. } => ExitCode::from(4),
            Self::Timeout { .. } => ExitCode::from(5),
            Self::Other(_) => ExitCode::from(1),
        }
    }
}
