//! File-backed mail: messages, per-recipient mailboxes, and address routing.

mod mailbox;
mod message;
mod router;

use std::path::{Path, PathBuf};

pub use mailbox::Mailbox;
pub use message::{Message, MessageType, Priority, generate_id};
pub use router::{MAIL_DIR, Router};

use crate::fsutil::LockError;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("invalid mail address {address:?}: {reason}")]
    Address { address: String, reason: String },

    #[error("encoding message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl MailError {
    pub(crate) fn storage(path: &Path, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.to_path_buf(),
            source,
        }
    }
}
