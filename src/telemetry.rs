//! Log subscriber setup.
//!
//! Filter comes from `KENNEL_LOG`, then `RUST_LOG`, defaulting to `info`.
//! Set `KENNEL_LOG_FORMAT=json` for one JSON object per event. Logs go to
//! stderr so command output on stdout stays parseable.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "KENNEL_LOG";
pub const LOG_FORMAT_ENV: &str = "KENNEL_LOG_FORMAT";

fn log_filter() -> EnvFilter {
    let directives = std::env::var(LOG_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    EnvFilter::try_new(&directives).unwrap_or_else(|e| {
        eprintln!("warning: ignoring invalid log filter {directives:?}: {e}");
        EnvFilter::new("info")
    })
}

/// Install the global subscriber. Safe to call more than once.
pub fn init() {
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(std::io::stderr)
        .with_target(false);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
