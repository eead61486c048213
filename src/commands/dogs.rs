use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde::Serialize;

use super::{OutputFormat, Town};
use crate::dog::{Dog, DogState, SessionController};

#[derive(Debug, Subcommand)]
pub enum DogsCommand {
    /// List dogs with their state, work and session liveness
    List {
        /// Output format
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Add a dog to the kennel
    Add {
        /// Dog name ([A-Za-z0-9][A-Za-z0-9_-]*)
        name: String,
    },
    /// Create any dog in dogs.pool that does not exist yet
    Sync,
    /// Return a dog to idle
    Clear {
        /// Dog name
        name: String,
    },
}

#[derive(Debug, Serialize)]
struct DogRow {
    name: String,
    state: DogState,
    work: Option<String>,
    /// `None` when the probe failed.
    session: Option<bool>,
    last_active: DateTime<Utc>,
}

impl DogsCommand {
    pub fn execute(&self, town: &Town) -> anyhow::Result<()> {
        let dogs = town.dogs();
        match self {
            Self::List { format } => {
                let sessions = town.sessions();
                let rows: Vec<DogRow> = dogs
                    .list()?
                    .into_iter()
                    .map(|dog| row(dog, &sessions))
                    .collect();
                print_rows(&rows, OutputFormat::resolve(*format))?;
            }
            Self::Add { name } => {
                dogs.add(name)?;
                println!("Added dog {name}");
            }
            Self::Sync => {
                let created = dogs.provision(&town.config.dogs.pool)?;
                if created.is_empty() {
                    println!("All {} pool dogs present", town.config.dogs.pool.len());
                } else {
                    println!("Created: {}", created.join(", "));
                }
            }
            Self::Clear { name } => {
                dogs.clear_work(name)?;
                println!("Cleared dog {name}");
            }
        }
        Ok(())
    }
}

fn row(dog: Dog, sessions: &impl SessionController) -> DogRow {
    let session = match sessions.is_running(&dog.name) {
        Ok(running) => Some(running),
        Err(e) => {
            tracing::debug!(dog = %dog.name, "session probe failed: {e}");
            None
        }
    };
    DogRow {
        state: dog.state(),
        work: dog.work().map(str::to_string),
        session,
        last_active: dog.last_active,
        name: dog.name,
    }
}

fn session_label(session: Option<bool>) -> &'static str {
    match session {
        Some(true) => "running",
        Some(false) => "stopped",
        None => "unknown",
    }
}

fn print_rows(rows: &[DogRow], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(rows)?),
        OutputFormat::Text => {
            for r in rows {
                println!(
                    "dog  {}  {}  {}  session={}",
                    r.name,
                    r.state,
                    r.work.as_deref().unwrap_or("-"),
                    session_label(r.session)
                );
            }
        }
        OutputFormat::Pretty => {
            if rows.is_empty() {
                println!("No dogs. Run `kennel dogs sync` to create the pool.");
                return Ok(());
            }
            println!("Dogs ({}):", rows.len());
            for r in rows {
                let mark = if r.state == DogState::Idle { "○" } else { "●" };
                match &r.work {
                    Some(work) => println!(
                        "  {mark} {:<12} {work}  [{}]",
                        r.name,
                        session_label(r.session)
                    ),
                    None => println!("  {mark} {:<12} idle", r.name),
                }
            }
        }
    }
    Ok(())
}
