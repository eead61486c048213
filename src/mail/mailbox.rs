use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::message::{Message, generate_id};
use super::MailError;
use crate::fsutil::{self, DEFAULT_LOCK_TIMEOUT, LockGuard};

const INBOX_FILE: &str = "inbox.jsonl";
const ARCHIVE_FILE: &str = "archive.jsonl";
const LOCK_FILE: &str = ".mailbox.lock";

/// Durable per-recipient message store.
///
/// A mailbox is a directory holding two JSONL logs: the active inbox and the
/// archive. Any number of `Mailbox` values, in any number of processes, may
/// point at the same directory; every mutation runs under an exclusive lock on
/// `.mailbox.lock` and readers take a shared lock.
///
/// Cloning is cheap: a mailbox is only a path and a lock timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    dir: PathBuf,
    lock_timeout: Duration,
}

impl Mailbox {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn inbox_path(&self) -> PathBuf {
        self.dir.join(INBOX_FILE)
    }

    fn archive_path(&self) -> PathBuf {
        self.dir.join(ARCHIVE_FILE)
    }

    fn lock_exclusive(&self) -> Result<LockGuard, MailError> {
        Ok(LockGuard::exclusive(&self.dir.join(LOCK_FILE), self.lock_timeout)?)
    }

    fn lock_shared(&self) -> Result<LockGuard, MailError> {
        Ok(LockGuard::shared(&self.dir.join(LOCK_FILE), self.lock_timeout)?)
    }

    /// Append a message to the active inbox and return its id.
    ///
    /// An id is generated only when the message has none, so re-appending a
    /// message keeps its identity.
    pub fn append(&self, message: &Message) -> Result<String, MailError> {
        let mut message = message.clone();
        if message.id.is_empty() {
            message.id = generate_id();
        }
        let line = serde_json::to_string(&message)?;

        let _lock = self.lock_exclusive()?;
        let path = self.inbox_path();
        fsutil::append_line(&path, &line).map_err(|e| MailError::storage(&path, e))?;

        tracing::debug!(mailbox = %self.dir.display(), id = %message.id, "appended message");
        Ok(message.id)
    }

    /// Active messages, oldest first.
    pub fn list(&self) -> Result<Vec<Message>, MailError> {
        self.read_sorted(&self.inbox_path())
    }

    /// Archived messages, oldest first.
    pub fn list_archived(&self) -> Result<Vec<Message>, MailError> {
        self.read_sorted(&self.archive_path())
    }

    fn read_sorted(&self, path: &Path) -> Result<Vec<Message>, MailError> {
        // Reads never create the mailbox.
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let _lock = self.lock_shared()?;
        let mut messages = read_log(path)?;
        sort_oldest_first(&mut messages);
        Ok(messages)
    }

    /// Look up an active message by id.
    pub fn get(&self, id: &str) -> Result<Option<Message>, MailError> {
        Ok(self.list()?.into_iter().find(|m| m.id == id))
    }

    /// Number of active messages.
    pub fn count(&self) -> Result<usize, MailError> {
        if !self.dir.is_dir() {
            return Ok(0);
        }
        let _lock = self.lock_shared()?;
        Ok(read_log(&self.inbox_path())?.len())
    }

    /// Move a message from the inbox to the archive.
    ///
    /// Returns `Ok(false)` without touching anything when the id is not in
    /// the active set, so concurrent or repeated archives of the same message
    /// all succeed and the message is archived exactly once.
    pub fn archive(&self, id: &str) -> Result<bool, MailError> {
        Ok(self.archive_many(&[id])? == 1)
    }

    /// Archive several messages in one locked pass. Returns how many moved.
    pub fn archive_many(&self, ids: &[&str]) -> Result<usize, MailError> {
        if !self.dir.is_dir() {
            return Ok(0);
        }
        let _lock = self.lock_exclusive()?;

        let inbox_path = self.inbox_path();
        let archive_path = self.archive_path();
        let wanted: HashSet<&str> = ids.iter().copied().collect();

        let (moving, keeping): (Vec<Message>, Vec<Message>) = read_log(&inbox_path)?
            .into_iter()
            .partition(|m| wanted.contains(m.id.as_str()));
        if moving.is_empty() {
            return Ok(0);
        }

        // Archive first, then rewrite the inbox. A crash in between leaves the
        // message in both logs; the next archive call finds it already
        // archived and only finishes the inbox rewrite.
        let already: HashSet<String> = read_log(&archive_path)?
            .into_iter()
            .map(|m| m.id)
            .collect();
        for message in moving.iter().filter(|m| !already.contains(&m.id)) {
            let line = serde_json::to_string(message)?;
            fsutil::append_line(&archive_path, &line)
                .map_err(|e| MailError::storage(&archive_path, e))?;
        }

        let mut rewritten = String::new();
        for message in &keeping {
            rewritten.push_str(&serde_json::to_string(message)?);
            rewritten.push('\n');
        }
        fsutil::atomic_write(&inbox_path, rewritten.as_bytes())
            .map_err(|e| MailError::storage(&inbox_path, e))?;

        tracing::debug!(
            mailbox = %self.dir.display(),
            archived = moving.len(),
            "archived messages"
        );
        Ok(moving.len())
    }
}

/// Read a JSONL log. Lines that do not parse are skipped with a warning.
fn read_log(path: &Path) -> Result<Vec<Message>, MailError> {
    let content = fsutil::read_or_empty(path).map_err(|e| MailError::storage(path, e))?;
    let mut messages = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Message>(line) {
            Ok(m) => messages.push(m),
            Err(e) => tracing::warn!(
                path = %path.display(),
                line = lineno + 1,
                "skipping unreadable mail entry: {e}"
            ),
        }
    }
    Ok(messages)
}

/// Stable sort by timestamp; untimestamped messages first, file order breaks ties.
fn sort_oldest_first(messages: &mut [Message]) {
    messages.sort_by_key(|m| m.timestamp);
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, Utc};

    use super::*;
    use crate::mail::MessageType;

    fn mailbox() -> (tempfile::TempDir, Mailbox) {
        let dir = tempfile::tempdir().unwrap();
        let mb = Mailbox::new(dir.path().join("dog/alpha"));
        (dir, mb)
    }

    #[test]
    fn empty_mailbox_lists_nothing() {
        let (_dir, mb) = mailbox();
        assert!(mb.list().unwrap().is_empty());
        assert!(mb.list_archived().unwrap().is_empty());
        assert_eq!(mb.count().unwrap(), 0);
    }

    #[test]
    fn reads_on_missing_mailbox_create_nothing() {
        let (_dir, mb) = mailbox();
        assert!(mb.list().unwrap().is_empty());
        assert!(mb.list_archived().unwrap().is_empty());
        assert_eq!(mb.count().unwrap(), 0);
        assert!(!mb.archive("msg-0").unwrap());
        assert!(!mb.dir().exists());
    }

    #[test]
    fn append_then_list_round_trips_every_field() {
        let (_dir, mb) = mailbox();
        let mut msg = Message::new("daemon", "dog/alpha", "Plugin: rotate-logs", "do it\nnow")
            .with_type(MessageType::Task);
        msg.thread_id = Some("thread-1".into());

        let id = mb.append(&msg).unwrap();
        assert_eq!(id, msg.id);

        let listed = mb.list().unwrap();
        assert_eq!(listed, vec![msg]);
    }

    #[test]
    fn append_assigns_id_only_when_missing() {
        let (_dir, mb) = mailbox();
        let msg = Message::new("a", "b", "s", "x").with_id("");
        let id = mb.append(&msg).unwrap();
        assert!(id.starts_with("msg-"));
        assert_eq!(mb.get(&id).unwrap().unwrap().subject, "s");

        let keep = Message::new("a", "b", "s", "x").with_id("mail-001");
        assert_eq!(mb.append(&keep).unwrap(), "mail-001");
    }

    #[test]
    fn list_is_oldest_first() {
        let (_dir, mb) = mailbox();
        let now = Utc::now();
        mb.append(&Message::new("a", "b", "new", "").with_id("new").with_timestamp(now))
            .unwrap();
        mb.append(
            &Message::new("a", "b", "old", "")
                .with_id("old")
                .with_timestamp(now - TimeDelta::minutes(5)),
        )
        .unwrap();

        let ids: Vec<String> = mb.list().unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["old", "new"]);
    }

    #[test]
    fn archive_moves_message() {
        let (_dir, mb) = mailbox();
        let msg = Message::new("a", "b", "s", "x").with_id("mail-001");
        mb.append(&msg).unwrap();

        assert!(mb.archive("mail-001").unwrap());
        assert!(mb.list().unwrap().is_empty());
        assert_eq!(mb.list_archived().unwrap(), vec![msg]);
    }

    #[test]
    fn archive_unknown_id_is_noop() {
        let (_dir, mb) = mailbox();
        mb.append(&Message::new("a", "b", "s", "x").with_id("keep")).unwrap();

        assert!(!mb.archive("missing").unwrap());
        assert_eq!(mb.count().unwrap(), 1);
        assert!(mb.list_archived().unwrap().is_empty());
    }

    #[test]
    fn archiving_twice_archives_once() {
        let (_dir, mb) = mailbox();
        mb.append(&Message::new("a", "b", "s", "x").with_id("m1")).unwrap();

        let other = Mailbox::new(mb.dir());
        assert!(mb.archive("m1").unwrap());
        assert!(!other.archive("m1").unwrap());
        assert_eq!(mb.list_archived().unwrap().len(), 1);
    }

    #[test]
    fn archive_heals_half_finished_move() {
        let (_dir, mb) = mailbox();
        let msg = Message::new("a", "b", "s", "x").with_id("m1");
        mb.append(&msg).unwrap();
        // Simulate a crash after the archive append but before the inbox rewrite.
        let line = serde_json::to_string(&msg).unwrap();
        fsutil::append_line(&mb.archive_path(), &line).unwrap();

        assert!(mb.archive("m1").unwrap());
        assert!(mb.list().unwrap().is_empty());
        assert_eq!(mb.list_archived().unwrap().len(), 1);
    }

    #[test]
    fn archive_many_counts_only_present() {
        let (_dir, mb) = mailbox();
        for id in ["m1", "m2", "m3"] {
            mb.append(&Message::new("a", "b", "s", "x").with_id(id)).unwrap();
        }
        assert_eq!(mb.archive_many(&["m1", "m3", "ghost"]).unwrap(), 2);
        let left: Vec<String> = mb.list().unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(left, vec!["m2"]);
    }

    #[test]
    fn corrupt_lines_are_skipped() {
        let (_dir, mb) = mailbox();
        mb.append(&Message::new("a", "b", "s", "x").with_id("good")).unwrap();
        fsutil::append_line(&mb.inbox_path(), "{not json").unwrap();

        let listed = mb.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "good");
    }

    #[test]
    fn concurrent_appends_from_threads_are_all_kept() {
        let (_dir, mb) = mailbox();
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let mb = mb.clone();
                std::thread::spawn(move || {
                    for i in 0..10 {
                        let msg = Message::new("a", "b", "s", "x").with_id(&format!("t{t}-{i}"));
                        mb.append(&msg).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(mb.count().unwrap(), 80);
    }
}
