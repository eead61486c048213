use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;

use super::mailbox::Mailbox;
use super::message::{Message, generate_id};
use super::MailError;
use crate::fsutil::DEFAULT_LOCK_TIMEOUT;

/// Directory under the town root that holds every mailbox.
pub const MAIL_DIR: &str = "mail";

/// Addresses messages by recipient name and hands them to that recipient's mailbox.
///
/// Addresses have one or two `/`-separated segments: `daemon`, `dog/alpha`,
/// `gastown/Toast`. Each resolves to a directory under `<town>/mail/`.
#[derive(Debug, Clone)]
pub struct Router {
    town_root: PathBuf,
    lock_timeout: Duration,
}

impl Router {
    pub fn new(town_root: &Path) -> Self {
        Self {
            town_root: town_root.to_path_buf(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Resolve an address to its mailbox.
    pub fn mailbox(&self, address: &str) -> Result<Mailbox, MailError> {
        let dir = resolve_address(&self.town_root, address)?;
        Ok(Mailbox::new(dir).with_lock_timeout(self.lock_timeout))
    }

    /// Deliver a message to the mailbox named by `message.to`.
    ///
    /// Stamps the timestamp and id when missing. Delivery is a single append;
    /// retrying is up to the caller.
    pub fn send(&self, message: &Message) -> Result<String, MailError> {
        let to = message.to.trim();
        if to.is_empty() {
            return Err(MailError::Address {
                address: message.to.clone(),
                reason: "recipient is empty".to_string(),
            });
        }
        let mailbox = self.mailbox(to)?;

        let mut message = message.clone();
        message.to = to.to_string();
        if message.timestamp.is_none() {
            message.timestamp = Some(Utc::now());
        }
        if message.id.is_empty() {
            message.id = generate_id();
        }

        let id = mailbox.append(&message)?;
        tracing::debug!(to = %message.to, from = %message.from, %id, "sent mail");
        Ok(id)
    }
}

fn resolve_address(town_root: &Path, address: &str) -> Result<PathBuf, MailError> {
    let invalid = |reason: &str| MailError::Address {
        address: address.to_string(),
        reason: reason.to_string(),
    };

    let address = address.trim();
    if address.is_empty() {
        return Err(invalid("recipient is empty"));
    }

    let segments: Vec<&str> = address.split('/').collect();
    if segments.len() > 2 {
        return Err(invalid("expected <name> or <group>/<name>"));
    }

    let mut dir = town_root.join(MAIL_DIR);
    for segment in segments {
        if segment.is_empty() {
            return Err(invalid("empty path segment"));
        }
        if segment == "." || segment == ".." {
            return Err(invalid("path traversal not allowed"));
        }
        if !segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
        {
            return Err(invalid("only [A-Za-z0-9._-] allowed in address segments"));
        }
        dir.push(segment);
    }
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::MessageType;

    #[test]
    fn resolves_one_and_two_segment_addresses() {
        let root = Path::new("/town");
        assert_eq!(resolve_address(root, "daemon").unwrap(), root.join("mail/daemon"));
        assert_eq!(
            resolve_address(root, "dog/alpha").unwrap(),
            root.join("mail/dog/alpha")
        );
        assert_eq!(
            resolve_address(root, " gastown/Toast ").unwrap(),
            root.join("mail/gastown/Toast")
        );
    }

    #[test]
    fn rejects_bad_addresses() {
        let root = Path::new("/town");
        for bad in ["", "   ", "a/b/c", "dog/", "/dog", "../etc", "dog/..", "dog/has space"] {
            let err = resolve_address(root, bad).unwrap_err();
            assert!(matches!(err, MailError::Address { .. }), "{bad:?} -> {err}");
        }
    }

    #[test]
    fn send_delivers_to_recipient_mailbox() {
        let dir = tempfile::tempdir().unwrap();
        let router = Router::new(dir.path());

        let msg = Message::new("daemon", "dog/alpha", "Plugin: x", "instructions")
            .with_type(MessageType::Task);
        let id = router.send(&msg).unwrap();

        let inbox = router.mailbox("dog/alpha").unwrap().list().unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].id, id);
        assert_eq!(inbox[0].msg_type, MessageType::Task);
        assert!(dir.path().join("mail/dog/alpha/inbox.jsonl").exists());
    }

    #[test]
    fn send_stamps_missing_timestamp_and_id() {
        let dir = tempfile::tempdir().unwrap();
        let router = Router::new(dir.path());
        let mut msg = Message::new("daemon", "mayor", "s", "b").with_id("");
        msg.timestamp = None;

        let id = router.send(&msg).unwrap();
        let stored = router.mailbox("mayor").unwrap().get(&id).unwrap().unwrap();
        assert!(stored.timestamp.is_some());
        assert!(stored.id.starts_with("msg-"));
    }

    #[test]
    fn send_rejects_empty_recipient() {
        let dir = tempfile::tempdir().unwrap();
        let router = Router::new(dir.path());
        let msg = Message::new("daemon", "  ", "s", "b");
        assert!(matches!(router.send(&msg), Err(MailError::Address { .. })));
        assert!(!dir.path().join(MAIL_DIR).exists());
    }
}
