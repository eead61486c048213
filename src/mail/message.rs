use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// What a message asks of its recipient.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Work to perform; dispatched plugins arrive as tasks.
    Task,
    /// Informational event, e.g. a spawn announcement.
    #[default]
    Notification,
    Reply,
    /// Open work that any idle recipient may pick up.
    Scavenge,
}

impl MessageType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Notification => "notification",
            Self::Reply => "reply",
            Self::Scavenge => "scavenge",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "task" => Ok(Self::Task),
            "notification" => Ok(Self::Notification),
            "reply" => Ok(Self::Reply),
            "scavenge" => Ok(Self::Scavenge),
            other => Err(format!("unknown message type {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(format!("unknown priority {other:?}")),
        }
    }
}

/// A mail message.
///
/// Messages are immutable once appended to a mailbox; only their location
/// (active inbox or archive) changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(rename = "type", default)]
    pub msg_type: MessageType,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl Message {
    /// Create a notification stamped with a fresh id and the current time.
    pub fn new(from: &str, to: &str, subject: &str, body: &str) -> Self {
        Self {
            id: generate_id(),
            from: from.to_string(),
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            msg_type: MessageType::default(),
            priority: Priority::default(),
            timestamp: Some(Utc::now()),
            thread_id: None,
            reply_to: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    #[must_use]
    pub const fn with_type(mut self, msg_type: MessageType) -> Self {
        self.msg_type = msg_type;
        self
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Build a reply addressed back to this message's sender, on the same thread.
    pub fn reply(&self, from: &str, body: &str) -> Self {
        let subject = if self.subject.starts_with("Re: ") {
            self.subject.clone()
        } else {
            format!("Re: {}", self.subject)
        };
        let mut reply = Self::new(from, &self.from, &subject, body).with_type(MessageType::Reply);
        reply.thread_id = Some(self.thread_id.clone().unwrap_or_else(|| self.id.clone()));
        reply.reply_to = Some(self.id.clone());
        reply
    }
}

/// Generate a message id: `msg-` followed by 16 hex digits.
pub fn generate_id() -> String {
    let n: u64 = rand::rng().random();
    format!("msg-{n:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_message_has_id_and_timestamp() {
        let msg = Message::new("daemon", "dog/alpha", "hello", "body");
        assert!(msg.id.starts_with("msg-"));
        assert_eq!(msg.id.len(), "msg-".len() + 16);
        assert!(msg.timestamp.is_some());
        assert_eq!(msg.msg_type, MessageType::Notification);
    }

    #[test]
    fn ids_are_distinct() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
    }

    #[test]
    fn type_serializes_lowercase_under_type_key() {
        let msg = Message::new("a", "b", "s", "x").with_type(MessageType::Task);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "task");
        assert_eq!(json["priority"], "normal");
    }

    #[test]
    fn sparse_json_fills_defaults() {
        let msg: Message = serde_json::from_str(r#"{"id":"mail-001","subject":"hi"}"#).unwrap();
        assert_eq!(msg.id, "mail-001");
        assert_eq!(msg.msg_type, MessageType::Notification);
        assert!(msg.timestamp.is_none());
        assert!(msg.body.is_empty());
    }

    #[test]
    fn reply_threads_back_to_sender() {
        let original = Message::new("mayor", "dog/alpha", "Status?", "how goes");
        let reply = original.reply("dog/alpha", "fine");
        assert_eq!(reply.to, "mayor");
        assert_eq!(reply.subject, "Re: Status?");
        assert_eq!(reply.msg_type, MessageType::Reply);
        assert_eq!(reply.reply_to.as_deref(), Some(original.id.as_str()));
        assert_eq!(reply.thread_id.as_deref(), Some(original.id.as_str()));

        let again = reply.reply("mayor", "good");
        assert_eq!(again.subject, "Re: Status?");
        assert_eq!(again.thread_id.as_deref(), Some(original.id.as_str()));
    }

    #[test]
    fn message_type_from_str() {
        assert_eq!("TASK".parse::<MessageType>().unwrap(), MessageType::Task);
        assert!("bogus".parse::<MessageType>().is_err());
    }

    #[test]
    fn priority_parses_and_orders() {
        assert_eq!("Urgent".parse::<Priority>().unwrap(), Priority::Urgent);
        assert!("asap".parse::<Priority>().is_err());
        assert!(Priority::High > Priority::Normal);
        let msg = Message::new("a", "b", "s", "x").with_priority(Priority::High);
        assert_eq!(serde_json::to_value(&msg).unwrap()["priority"], "high");
    }
}
