//! Tracing helpers for pipeline stages.
//!
//! Enable output by installing a subscriber in the host application, e.g.
//! `RUST_LOG=polyfit=debug` with `tracing_subscriber::fmt`. Stage timing
//! goes to the `polyfit::timing` target at info level.

use std::time::Instant;
use tracing::{Span, debug, info};

/// A stage timer that logs its duration on drop.
pub struct StageTimer {
    name: &'static str,
    start: Instant,
    span: Span,
}

impl StageTimer {
    /// Create a new timer for a pipeline stage.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!("stage", stage = name);
        debug!(target: "polyfit::timing", stage = name, "stage started");
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Elapsed milliseconds so far.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// The span for this stage.
    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        info!(
            target: "polyfit::timing",
            stage = self.name,
            elapsed_ms = format!("{:.2}", self.elapsed_ms()),
            "stage completed"
        );
    }
}

/// Log progress of a long-running stage.
pub fn log_progress(stage: &str, current: usize, total: usize) {
    let percent = if total > 0 {
        (current as f64 / total as f64 * 100.0) as u32
    } else {
        0
    };
    debug!(
        target: "polyfit::progress",
        stage = stage,
        current = current,
        total = total,
        percent = percent,
        "progress"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_measures_elapsed_time() {
        let timer = StageTimer::new("test_stage");
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(timer.elapsed_ms() >= 5.0);
    }

    #[test]
    fn progress_logging_does_not_panic() {
        log_progress("scoring", 3, 10);
        log_progress("scoring", 0, 0);
    }
}
