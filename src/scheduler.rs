//! The dispatch cycle: repair stuck dogs, then hand gated plugins to idle dogs.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;

use crate::dog::{Dog, DogManager, SessionController, StartOptions};
use crate::mail::{Message, MessageType, Router};
use crate::plugin::{GateDecision, Plugin, PluginRun, Recorder, RunOutcome, Scanner, evaluate_gate};

/// Knobs for one [`Scheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// When false, cycles only repair stuck dogs.
    pub autonomous: bool,
    /// Mail address task messages are sent from.
    pub sender: String,
    /// Once exceeded, remaining plugins are left for the next cycle.
    pub cycle_timeout: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            autonomous: true,
            sender: "daemon".to_string(),
            cycle_timeout: Duration::from_secs(120),
        }
    }
}

/// Aggregate outcome of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Working dogs whose session was gone and that were returned to idle.
    pub repaired: usize,
    /// Liveness probes that failed; those dogs were left alone.
    pub probe_errors: usize,
    pub repair_failures: usize,
    pub discovered: usize,
    pub dispatched: usize,
    pub gated: usize,
    pub gate_errors: usize,
    /// Plugins left for a later cycle because no dog was free or time ran out.
    pub deferred: usize,
    pub assign_failures: usize,
    pub start_failures: usize,
    pub rollback_failures: usize,
    pub mail_failures: usize,
    pub record_failures: usize,
    pub scan_failed: bool,
    pub timed_out: bool,
}

/// Drives the fleet. Each call to [`Scheduler::run_cycle`] is independent and
/// safe to repeat after a crash: the next cycle re-converges from disk.
pub struct Scheduler<S> {
    dogs: DogManager,
    sessions: S,
    scanner: Scanner,
    recorder: Recorder,
    router: Router,
    options: SchedulerOptions,
}

impl<S: SessionController> Scheduler<S> {
    pub const fn new(
        dogs: DogManager,
        sessions: S,
        scanner: Scanner,
        recorder: Recorder,
        router: Router,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            dogs,
            sessions,
            scanner,
            recorder,
            router,
            options,
        }
    }

    pub const fn sessions(&self) -> &S {
        &self.sessions
    }

    /// Run one cycle. Per-dog and per-plugin failures are counted in the
    /// report and never abort the cycle.
    pub fn run_cycle(&self) -> CycleReport {
        let _span = tracing::info_span!("cycle").entered();
        let deadline = Instant::now() + self.options.cycle_timeout;
        let mut report = CycleReport::default();

        self.repair_stuck(&mut report);

        if self.options.autonomous {
            self.dispatch(deadline, &mut report);
        } else {
            tracing::debug!("autonomous dispatch disabled, skipping plugins");
        }

        tracing::info!(
            repaired = report.repaired,
            dispatched = report.dispatched,
            gated = report.gated,
            deferred = report.deferred,
            timed_out = report.timed_out,
            "cycle complete"
        );
        report
    }

    /// Return working dogs whose session has died to idle.
    fn repair_stuck(&self, report: &mut CycleReport) {
        let dogs = match self.dogs.list() {
            Ok(dogs) => dogs,
            Err(e) => {
                tracing::warn!("listing dogs for stuck repair: {e}");
                return;
            }
        };

        for dog in dogs.iter().filter(|d| !d.is_idle()) {
            match self.sessions.is_running(&dog.name) {
                Ok(true) => {}
                Ok(false) => match self.dogs.clear_work(&dog.name) {
                    Ok(_) => {
                        tracing::info!(
                            dog = %dog.name,
                            work = dog.work().unwrap_or_default(),
                            "cleared stuck dog"
                        );
                        report.repaired += 1;
                    }
                    Err(e) => {
                        tracing::warn!(dog = %dog.name, "clearing stuck dog: {e}");
                        report.repair_failures += 1;
                    }
                },
                Err(e) => {
                    // Unknown is not dead: leave the dog for the next cycle.
                    tracing::warn!(dog = %dog.name, "skipping stuck check: {e}");
                    report.probe_errors += 1;
                }
            }
        }
    }

    fn dispatch(&self, deadline: Instant, report: &mut CycleReport) {
        let plugins = match self.scanner.discover_all() {
            Ok(plugins) => plugins,
            Err(e) => {
                tracing::warn!("discovering plugins: {e}");
                report.scan_failed = true;
                return;
            }
        };
        report.discovered = plugins.len();

        // Dogs that failed to take work are not offered again this cycle.
        let mut passed_over: HashSet<String> = HashSet::new();
        for (index, plugin) in plugins.iter().enumerate() {
            let remaining = plugins.len() - index;
            if Instant::now() >= deadline {
                tracing::warn!(remaining, "cycle deadline passed, deferring remaining plugins");
                report.timed_out = true;
                report.deferred += remaining;
                return;
            }

            match evaluate_gate(plugin, &self.recorder) {
                Ok(GateDecision::Open) => {}
                Ok(GateDecision::CoolingDown { runs, .. }) => {
                    tracing::debug!(plugin = %plugin.name, runs, "plugin gated by cooldown");
                    report.gated += 1;
                    continue;
                }
                Ok(GateDecision::FailOpen { reason }) => {
                    tracing::warn!(plugin = %plugin.name, %reason, "gate inactive");
                }
                Err(e) => {
                    tracing::warn!(plugin = %plugin.name, "checking gate: {e}");
                    report.gate_errors += 1;
                    continue;
                }
            }

            let dog = match self.dogs.next_idle_dog(&passed_over) {
                Ok(Some(dog)) => dog,
                Ok(None) => {
                    tracing::info!(remaining, "no idle dogs available, deferring remaining plugins");
                    report.deferred += remaining;
                    return;
                }
                Err(e) => {
                    tracing::warn!(remaining, "looking for an idle dog: {e}");
                    report.deferred += remaining;
                    return;
                }
            };

            if !self.dispatch_one(plugin, &dog, report) {
                passed_over.insert(dog.name);
            }
        }
    }

    /// Hand `plugin` to `dog`. Returns false when the dog never took the work.
    fn dispatch_one(&self, plugin: &Plugin, dog: &Dog, report: &mut CycleReport) -> bool {
        let work = plugin.work_description();

        if let Err(e) = self.dogs.assign_work(&dog.name, &work) {
            tracing::warn!(dog = %dog.name, plugin = %plugin.name, "assigning work: {e}");
            report.assign_failures += 1;
            return false;
        }

        let options = StartOptions { work: work.clone() };
        if let Err(e) = self.sessions.start(&dog.name, &options) {
            tracing::warn!(dog = %dog.name, plugin = %plugin.name, "starting session: {e}");
            report.start_failures += 1;
            if let Err(e) = self.dogs.clear_work(&dog.name) {
                tracing::error!(dog = %dog.name, "rolling back assignment: {e}");
                report.rollback_failures += 1;
            }
            return false;
        }

        // The session is live from here on; a failed send is not rolled back.
        let message = Message::new(
            &self.options.sender,
            &format!("dog/{}", dog.name),
            &format!("Plugin: {}", plugin.name),
            &plugin.instructions,
        )
        .with_type(MessageType::Task);
        let outcome = match self.router.send(&message) {
            Ok(_) => {
                tracing::info!(dog = %dog.name, plugin = %plugin.name, "dispatched plugin");
                report.dispatched += 1;
                RunOutcome::Dispatched
            }
            Err(e) => {
                tracing::warn!(dog = %dog.name, plugin = %plugin.name, "sending task mail: {e}");
                report.mail_failures += 1;
                RunOutcome::MailFailed
            }
        };

        let run = PluginRun {
            plugin: plugin.name.clone(),
            ran_at: Utc::now(),
            dog: Some(dog.name.clone()),
            outcome,
        };
        if let Err(e) = self.recorder.record_run(&run) {
            tracing::warn!(plugin = %plugin.name, "recording run: {e}");
            report.record_failures += 1;
        }
        true
    }
}
