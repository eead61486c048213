use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use kennel::commands::cycle::CycleArgs;
use kennel::commands::dogs::DogsCommand;
use kennel::commands::heartbeat::HeartbeatArgs;
use kennel::commands::init::InitArgs;
use kennel::commands::mail::MailCommand;
use kennel::commands::pending::PendingCommand;
use kennel::commands::plugins::PluginsCommand;
use kennel::commands::{self, Town};
use kennel::{error, telemetry};

#[derive(Debug, Parser)]
#[command(
    name = "kennel",
    version,
    about = "Dog fleet scheduler: stuck-repair, gated plugin dispatch, and file-backed mailboxes"
)]
struct Cli {
    /// Town root directory (defaults to the current directory)
    #[arg(long, global = true, env = "KENNEL_TOWN")]
    town: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write kennel.toml and provision the dog pool
    Init(InitArgs),
    /// Run one scheduler cycle
    Cycle(CycleArgs),
    /// Run scheduler cycles until interrupted
    Heartbeat(HeartbeatArgs),
    /// Manage dogs (list, add, sync, clear)
    Dogs {
        #[command(subcommand)]
        command: DogsCommand,
    },
    /// Send, list and archive mail
    Mail {
        #[command(subcommand)]
        command: MailCommand,
    },
    /// Inspect and clear pending spawn notifications
    Pending {
        #[command(subcommand)]
        command: PendingCommand,
    },
    /// Inspect discovered plugins
    Plugins {
        #[command(subcommand)]
        command: PluginsCommand,
    },
    /// Print the JSON Schema for kennel.toml
    Schema,
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::Init(_) => "init",
            Self::Cycle(_) => "cycle",
            Self::Heartbeat(_) => "heartbeat",
            Self::Dogs { .. } => "dogs",
            Self::Mail { .. } => "mail",
            Self::Pending { .. } => "pending",
            Self::Plugins { .. } => "plugins",
            Self::Schema => "schema",
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Schema = cli.command {
        return commands::schema::run_schema();
    }

    let town = Town::open(cli.town.as_deref())?;
    match cli.command {
        Commands::Init(args) => args.execute(&town),
        Commands::Cycle(args) => args.execute(&town),
        Commands::Heartbeat(args) => args.execute(&town),
        Commands::Dogs { command } => command.execute(&town),
        Commands::Mail { command } => command.execute(&town),
        Commands::Pending { command } => command.execute(&town),
        Commands::Plugins { command } => command.execute(&town),
        Commands::Schema => commands::schema::run_schema(),
    }
}

fn main() -> ExitCode {
    telemetry::init();

    let cli = Cli::parse();

    let _span = tracing::info_span!("command", name = cli.command.name()).entered();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(exit_err) = e.downcast_ref::<error::ExitError>() {
                eprintln!("error: {exit_err}");
                exit_err.exit_code()
            } else {
                eprintln!("error: {e:#}");
                ExitCode::FAILURE
            }
        }
    }
}
