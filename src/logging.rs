//! Process-wide logging.
//!
//! Two independent facilities live here, matching spec.md §9's "global
//! state" note:
//!
//! - [`init`] wires the `log` facade to a `fern` dispatcher, the way the
//!   teacher crate's binaries set up their own CLI output (colored levels,
//!   timestamped lines to stderr).
//! - [`ignore_failure`] is the advisory "ignore failure" wrapper from
//!   spec.md §7/§9: it converts any `Result::Err` from a single operation
//!   into a logged warning instead of propagating it. It defaults to a
//!   no-op sink with no implicit initialization; callers who want the
//!   warnings surfaced elsewhere (GUI toast, telemetry) call
//!   [`set_warning_sink`] explicitly.

use std::fmt::Display;
use std::sync::{Arc, Mutex};

use log::LevelFilter;

/// Receives advisory warnings emitted by [`ignore_failure`].
pub trait WarningSink: Send + Sync {
    fn warn(&self, message: &str);
}

static WARNING_SINK: Mutex<Option<Arc<dyn WarningSink>>> = Mutex::new(None);

/// Install a sink for advisory warnings. Replaces any previously set sink.
pub fn set_warning_sink(sink: Arc<dyn WarningSink>) {
    *WARNING_SINK.lock().expect("warning sink mutex poisoned") = Some(sink);
}

/// Remove any installed sink, reverting to the default no-op behavior.
pub fn clear_warning_sink() {
    *WARNING_SINK.lock().expect("warning sink mutex poisoned") = None;
}

fn emit_warning(message: &str) {
    log::warn!("{message}");
    let guard = WARNING_SINK.lock().expect("warning sink mutex poisoned");
    if let Some(sink) = guard.as_ref() {
        sink.warn(message);
    }
}

/// Run `op`, swallowing any error into a logged warning tagged with `label`.
///
/// This is the single "ignore failure" collaborator spec.md §7 calls out:
/// content operations and retained-file moves that are best-effort use this
/// instead of propagating a failure that would abort an otherwise-successful
/// update.
pub fn ignore_failure<T, E: Display>(label: &str, result: Result<T, E>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            emit_warning(&format!("{label}: {err}"));
            None
        }
    }
}

/// Initialize the `log` facade with a `fern`-backed dispatcher writing
/// human-readable lines to stderr, colored by level unless `quiet`.
pub fn init(verbose: bool, quiet: bool) -> anyhow::Result<()> {
    let level = if quiet {
        LevelFilter::Warn
    } else if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let colors = fern::colors::ColoredLevelConfig::new()
        .error(fern::colors::Color::Red)
        .warn(fern::colors::Color::Yellow)
        .info(fern::colors::Color::Green)
        .debug(fern::colors::Color::Cyan);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{}] {}",
                colors.color(record.level()),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()
        .map_err(|e| anyhow::anyhow!("logger already initialized: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink(Arc<AtomicUsize>);
    impl WarningSink for CountingSink {
        fn warn(&self, _message: &str) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn ignore_failure_returns_ok_value_untouched() {
        let result: Result<i32, anyhow::Error> = Ok(42);
        assert_eq!(ignore_failure("op", result), Some(42));
    }

    #[test]
    fn ignore_failure_reports_to_installed_sink() {
        let counter = Arc::new(AtomicUsize::new(0));
        set_warning_sink(Arc::new(CountingSink(counter.clone())));
        let result: Result<(), anyhow::Error> = Err(anyhow::anyhow!("boom"));
        assert_eq!(ignore_failure("op", result), None);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        clear_warning_sink();
    }

    #[test]
    fn default_sink_is_a_silent_noop() {
        clear_warning_sink();
        let result: Result<(), anyhow::Error> = Err(anyhow::anyhow!("boom"));
        // Must not panic in the absence of an installed sink.
        assert_eq!(ignore_failure("op", result), None);
    }
}
