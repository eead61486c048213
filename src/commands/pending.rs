use clap::Subcommand;

use super::{OutputFormat, Town};
use crate::error::ExitError;
use crate::pending::{self, PendingSpawn};
use crate::plugin::parse_duration;

#[derive(Debug, Subcommand)]
pub enum PendingCommand {
    /// List spawn notifications waiting in a mailbox
    List {
        /// Mailbox receiving the notifications, e.g. mayor
        address: String,
        /// Output format
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Archive the notifications for one session
    Clear {
        address: String,
        #[arg(long)]
        session: String,
    },
    /// Archive notifications older than --max-age
    Prune {
        address: String,
        /// e.g. 5m or 1h (defaults to pending.max_age)
        #[arg(long)]
        max_age: Option<String>,
    },
}

impl PendingCommand {
    pub fn execute(&self, town: &Town) -> anyhow::Result<()> {
        match self {
            Self::List { address, format } => {
                let mailbox = town.router().mailbox(address)?;
                let spawns = pending::scan_for_spawns(&mailbox)?;
                print_spawns(&spawns, OutputFormat::resolve(*format))?;
            }
            Self::Clear { address, session } => {
                let mailbox = town.router().mailbox(address)?;
                let spawns = pending::scan_for_spawns(&mailbox)?;
                let cleared = pending::clear_pending_spawn(&spawns, session)?;
                println!("Cleared {cleared} pending spawn(s) for {session}");
            }
            Self::Prune { address, max_age } => {
                let max_age = match max_age {
                    Some(raw) => parse_duration(raw).ok_or_else(|| {
                        ExitError::Other(format!("invalid --max-age {raw:?}: expected e.g. 5m or 1h"))
                    })?,
                    None => town.config.pending_max_age()?,
                };
                let mailbox = town.router().mailbox(address)?;
                let spawns = pending::scan_for_spawns(&mailbox)?;
                let pruned = pending::prune_stale(&spawns, max_age)?;
                println!("Pruned {pruned} stale pending spawn(s)");
            }
        }
        Ok(())
    }
}

fn print_spawns(spawns: &[PendingSpawn], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(spawns)?),
        OutputFormat::Text => {
            for s in spawns {
                println!(
                    "pending  {}/{}  {}  {}  {}",
                    s.rig,
                    s.worker,
                    s.session,
                    s.correlation_id.as_deref().unwrap_or("-"),
                    s.spawned_at.to_rfc3339()
                );
            }
        }
        OutputFormat::Pretty => {
            if spawns.is_empty() {
                println!("No pending spawns");
                return Ok(());
            }
            println!("Pending spawns ({}):", spawns.len());
            for s in spawns {
                let issue = s
                    .correlation_id
                    .as_deref()
                    .map(|i| format!(" for {i}"))
                    .unwrap_or_default();
                println!(
                    "  • {}/{}{issue}  session {}  since {}",
                    s.rig,
                    s.worker,
                    s.session,
                    s.spawned_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
    }
    Ok(())
}
