use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Args;

use super::cycle::print_report;
use super::{OutputFormat, Town};

#[derive(Debug, Args)]
pub struct HeartbeatArgs {
    /// Seconds between cycles (defaults to scheduler.heartbeat_secs)
    #[arg(long)]
    pub interval: Option<u64>,
    /// Stop after this many cycles
    #[arg(long)]
    pub max_cycles: Option<u64>,
    /// Output format for each cycle report
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
}

impl HeartbeatArgs {
    pub fn execute(&self, town: &Town) -> anyhow::Result<()> {
        let interval = self
            .interval
            .map_or_else(|| town.config.heartbeat_interval(), Duration::from_secs);
        let format = OutputFormat::resolve(self.format);

        let created = town.dogs().provision(&town.config.dogs.pool)?;
        if !created.is_empty() {
            tracing::info!(dogs = ?created, "provisioned dogs");
        }

        let stop = Arc::new(AtomicBool::new(false));
        let handler_stop = Arc::clone(&stop);
        if let Err(e) = ctrlc::set_handler(move || handler_stop.store(true, Ordering::SeqCst)) {
            tracing::warn!("could not install Ctrl-C handler: {e}");
        }

        let scheduler = town.scheduler();
        let mut cycles: u64 = 0;
        tracing::info!(interval_secs = interval.as_secs(), "heartbeat started");
        while !stop.load(Ordering::SeqCst) {
            let report = scheduler.run_cycle();
            print_report(&report, format)?;
            cycles += 1;
            if self.max_cycles.is_some_and(|max| cycles >= max) {
                break;
            }
            sleep_unless_stopped(interval, &stop);
        }
        tracing::info!(cycles, "heartbeat stopped");
        Ok(())
    }
}

/// Sleep in short slices so Ctrl-C ends the wait promptly.
fn sleep_unless_stopped(total: Duration, stop: &AtomicBool) {
    let deadline = Instant::now() + total;
    while !stop.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        std::thread::sleep((deadline - now).min(Duration::from_millis(200)));
    }
}
