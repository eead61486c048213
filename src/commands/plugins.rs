use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde::Serialize;

use super::{OutputFormat, Town};
use crate::plugin::{GateDecision, Plugin, evaluate_gate};

#[derive(Debug, Subcommand)]
pub enum PluginsCommand {
    /// List discovered plugins with their gate and last run
    List {
        /// Output format
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
}

#[derive(Debug, Serialize)]
struct PluginRow {
    #[serde(flatten)]
    plugin: Plugin,
    eligible: bool,
    last_run: Option<DateTime<Utc>>,
}

impl PluginsCommand {
    pub fn execute(&self, town: &Town) -> anyhow::Result<()> {
        match self {
            Self::List { format } => {
                let recorder = town.recorder();
                let mut rows = Vec::new();
                for plugin in town.scanner().discover_all()? {
                    let decision = evaluate_gate(&plugin, &recorder)?;
                    if let GateDecision::FailOpen { reason } = &decision {
                        tracing::warn!(plugin = %plugin.name, %reason, "gate inactive");
                    }
                    let last_run = recorder.last_run(&plugin.name)?.map(|r| r.ran_at);
                    rows.push(PluginRow {
                        eligible: decision.is_eligible(),
                        last_run,
                        plugin,
                    });
                }
                print_rows(&rows, OutputFormat::resolve(*format))?;
            }
        }
        Ok(())
    }
}

fn gate_label(plugin: &Plugin) -> String {
    match &plugin.gate {
        None => "-".to_string(),
        Some(gate) => match &gate.duration {
            Some(d) => format!("{} {d}", gate.gate_type),
            None => gate.gate_type.to_string(),
        },
    }
}

fn print_rows(rows: &[PluginRow], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(rows)?),
        OutputFormat::Text => {
            for r in rows {
                println!(
                    "plugin  {}  {}  gate={}  eligible={}  last_run={}",
                    r.plugin.name,
                    r.plugin.location,
                    gate_label(&r.plugin),
                    r.eligible,
                    r.last_run.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into())
                );
            }
        }
        OutputFormat::Pretty => {
            if rows.is_empty() {
                println!("No plugins found");
                return Ok(());
            }
            println!("Plugins ({}):", rows.len());
            for r in rows {
                let mark = if r.eligible { "✓" } else { "⏸" };
                let last = r
                    .last_run
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".into());
                println!(
                    "  {mark} {:<20} [{}] gate: {}  last run: {last}",
                    r.plugin.name,
                    r.plugin.location,
                    gate_label(&r.plugin)
                );
                if !r.plugin.description.is_empty() {
                    println!("      {}", r.plugin.description);
                }
            }
        }
    }
    Ok(())
}
