use clap::Args;

use super::{OutputFormat, Town};
use crate::scheduler::CycleReport;

#[derive(Debug, Args)]
pub struct CycleArgs {
    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
}

impl CycleArgs {
    pub fn execute(&self, town: &Town) -> anyhow::Result<()> {
        let report = town.scheduler().run_cycle();
        print_report(&report, OutputFormat::resolve(self.format))
    }
}

pub fn print_report(report: &CycleReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => {
            println!(
                "cycle  repaired={}  discovered={}  dispatched={}  gated={}  deferred={}  timed_out={}",
                report.repaired,
                report.discovered,
                report.dispatched,
                report.gated,
                report.deferred,
                report.timed_out
            );
            let failures = [
                ("probe_errors", report.probe_errors),
                ("repair_failures", report.repair_failures),
                ("gate_errors", report.gate_errors),
                ("assign_failures", report.assign_failures),
                ("start_failures", report.start_failures),
                ("rollback_failures", report.rollback_failures),
                ("mail_failures", report.mail_failures),
                ("record_failures", report.record_failures),
            ];
            for (name, count) in failures.iter().filter(|(_, c)| *c > 0) {
                println!("failure  {name}  {count}");
            }
            if report.scan_failed {
                println!("failure  scan  1");
            }
        }
        OutputFormat::Pretty => {
            println!("=== Kennel Cycle ===\n");
            println!("Stuck dogs repaired: {}", report.repaired);
            println!("Plugins discovered:  {}", report.discovered);
            println!("Dispatched:          {}", report.dispatched);
            println!("Gated:               {}", report.gated);
            println!("Deferred:            {}", report.deferred);

            let failed = report.probe_errors
                + report.repair_failures
                + report.gate_errors
                + report.assign_failures
                + report.start_failures
                + report.rollback_failures
                + report.mail_failures
                + report.record_failures;
            if failed > 0 || report.scan_failed {
                println!("\n✗ {failed} failure(s), see log for details");
            }
            if report.timed_out {
                println!("\n✗ cycle deadline passed, remaining plugins deferred");
            }
        }
    }
    Ok(())
}
