//! Pending spawns: "worker started" notifications waiting to be correlated.
//!
//! A spawned worker announces itself by mailing
//! `POLECAT_STARTED <rig>/<worker>` with `Session:` and `Issue:` lines in the
//! body. A [`PendingSpawn`] is never stored on its own; it is rebuilt from the
//! mailbox on every scan and disappears once its message is archived.

use std::sync::OnceLock;

use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use serde::Serialize;

use crate::mail::{MailError, Mailbox, Message};

/// Subject keyword of a spawn notification.
pub const STARTED_SUBJECT: &str = "POLECAT_STARTED";

#[derive(Debug, thiserror::Error)]
pub enum PendingError {
    #[error("pending spawn {mail_id:?} has a nil mailbox")]
    NilMailbox { mail_id: String },

    #[error(transparent)]
    Mail(#[from] MailError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingSpawn {
    pub rig: String,
    pub worker: String,
    pub session: String,
    /// Issue or ticket the worker was spawned for.
    pub correlation_id: Option<String>,
    /// Id of the notification; archiving it clears this entry.
    pub mail_id: String,
    pub spawned_at: DateTime<Utc>,
    #[serde(skip)]
    pub mailbox: Option<Mailbox>,
}

impl PendingSpawn {
    fn archive(&self) -> Result<bool, PendingError> {
        Ok(self.backing_mailbox()?.archive(&self.mail_id)?)
    }

    fn backing_mailbox(&self) -> Result<&Mailbox, PendingError> {
        self.mailbox.as_ref().ok_or_else(|| PendingError::NilMailbox {
            mail_id: self.mail_id.clone(),
        })
    }
}

fn subject_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"^{STARTED_SUBJECT}\s+([^/\s]+)/([^/\s]+)\s*$")).expect("valid regex")
    })
}

fn session_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^Session:[ \t]*(\S+)").expect("valid regex"))
}

fn issue_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^Issue:[ \t]*(\S+)").expect("valid regex"))
}

/// Every spawn notification in the active inbox, oldest first.
///
/// Messages that are not well-formed notifications are ordinary traffic and
/// are skipped silently.
pub fn scan_for_spawns(mailbox: &Mailbox) -> Result<Vec<PendingSpawn>, PendingError> {
    Ok(mailbox
        .list()?
        .iter()
        .filter_map(|m| parse_spawn(m, mailbox))
        .collect())
}

fn parse_spawn(message: &Message, mailbox: &Mailbox) -> Option<PendingSpawn> {
    let subject = subject_re().captures(message.subject.trim())?;
    let session = session_re().captures(&message.body)?;
    let correlation_id = issue_re()
        .captures(&message.body)
        .map(|c| c[1].to_string());

    Some(PendingSpawn {
        rig: subject[1].to_string(),
        worker: subject[2].to_string(),
        session: session[1].to_string(),
        correlation_id,
        mail_id: message.id.clone(),
        spawned_at: message.timestamp.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        mailbox: Some(mailbox.clone()),
    })
}

/// Archive every entry for `session`. Returns how many messages moved;
/// no match is not an error.
pub fn clear_pending_spawn(pending: &[PendingSpawn], session: &str) -> Result<usize, PendingError> {
    let matching: Vec<&PendingSpawn> = pending.iter().filter(|p| p.session == session).collect();
    archive_all(&matching)
}

/// Archive every entry older than `max_age`. Returns how many messages moved.
///
/// An age reaching past the earliest representable time leaves nothing stale.
pub fn prune_stale(pending: &[PendingSpawn], max_age: TimeDelta) -> Result<usize, PendingError> {
    let Some(cutoff) = Utc::now().checked_sub_signed(max_age) else {
        return Ok(0);
    };
    let stale: Vec<&PendingSpawn> = pending.iter().filter(|p| p.spawned_at < cutoff).collect();
    let pruned = archive_all(&stale)?;
    if pruned > 0 {
        tracing::info!(pruned, "pruned stale pending spawns");
    }
    Ok(pruned)
}

fn archive_all(entries: &[&PendingSpawn]) -> Result<usize, PendingError> {
    // Refuse before touching anything if any entry cannot be archived.
    for entry in entries {
        entry.backing_mailbox()?;
    }
    let mut archived = 0;
    for entry in entries {
        if entry.archive()? {
            tracing::debug!(session = %entry.session, mail_id = %entry.mail_id, "archived spawn notification");
            archived += 1;
        }
    }
    Ok(archived)
}
