use clap::Subcommand;

use super::{OutputFormat, Town};
use crate::error::ExitError;
use crate::mail::{Message, MessageType, Priority};

#[derive(Debug, Subcommand)]
pub enum MailCommand {
    /// Send a message
    Send {
        /// Recipient address, e.g. dog/alpha or gastown/witness
        #[arg(long)]
        to: String,
        #[arg(long)]
        subject: String,
        #[arg(long, default_value = "")]
        body: String,
        /// task, notification, reply or scavenge
        #[arg(long = "type", default_value = "notification")]
        msg_type: MessageType,
        /// low, normal, high or urgent
        #[arg(long, default_value = "normal")]
        priority: Priority,
        /// Sender address (defaults to scheduler.sender)
        #[arg(long)]
        from: Option<String>,
    },
    /// Reply to a message in a mailbox, threading back to its sender
    Reply {
        /// Mailbox holding the original message; the reply is sent from here
        address: String,
        id: String,
        #[arg(long, default_value = "")]
        body: String,
    },
    /// List a mailbox, oldest first
    Inbox {
        address: String,
        /// Show archived messages instead of active ones
        #[arg(long)]
        archived: bool,
        /// Output format
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Archive messages by id
    Archive {
        address: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

impl MailCommand {
    pub fn execute(&self, town: &Town) -> anyhow::Result<()> {
        let router = town.router();
        match self {
            Self::Send {
                to,
                subject,
                body,
                msg_type,
                priority,
                from,
            } => {
                let from = from.as_deref().unwrap_or(&town.config.scheduler.sender);
                let message = Message::new(from, to, subject, body)
                    .with_type(*msg_type)
                    .with_priority(*priority);
                let id = router.send(&message)?;
                println!("{id}");
            }
            Self::Reply { address, id, body } => {
                let original = router
                    .mailbox(address)?
                    .get(id)?
                    .ok_or_else(|| ExitError::Other(format!("no active message {id} in {address}")))?;
                let reply_id = router.send(&original.reply(address, body))?;
                println!("{reply_id}");
            }
            Self::Inbox {
                address,
                archived,
                format,
            } => {
                let mailbox = router.mailbox(address)?;
                let messages = if *archived {
                    mailbox.list_archived()?
                } else {
                    mailbox.list()?
                };
                print_messages(address, &messages, OutputFormat::resolve(*format))?;
            }
            Self::Archive { address, ids } => {
                let mailbox = router.mailbox(address)?;
                let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
                let moved = mailbox.archive_many(&ids)?;
                println!("Archived {moved} of {} message(s)", ids.len());
            }
        }
        Ok(())
    }
}

fn print_messages(address: &str, messages: &[Message], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(messages)?),
        OutputFormat::Text => {
            for m in messages {
                let ts = m.timestamp.map(|t| t.to_rfc3339()).unwrap_or_default();
                println!(
                    "{}  {}  {}  {}  {}  {}",
                    m.id, ts, m.msg_type, m.priority, m.from, m.subject
                );
            }
        }
        OutputFormat::Pretty => {
            if messages.is_empty() {
                println!("{address}: no messages");
                return Ok(());
            }
            println!("{address} ({}):", messages.len());
            for m in messages {
                let ts = m
                    .timestamp
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string());
                let mark = if m.priority >= Priority::High { "!" } else { " " };
                println!("{mark} {} [{}] {} from {}: {}", m.id, m.msg_type, ts, m.from, m.subject);
            }
        }
    }
    Ok(())
}
