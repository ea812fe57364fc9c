//! Progress reporting and cooperative cancellation
//!
//! Progress is an external observer invoked after each chunk; it is never
//! required for correctness. Cancellation is polled between chunks only.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Progress information emitted after each processed chunk
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// Current operation description
    pub operation: String,
    /// Units processed so far (sectors, blocks, or bytes)
    pub current: u64,
    /// Total units to process, if known
    pub total: Option<u64>,
    /// Units per second since the run started
    pub units_per_second: f64,
    /// Time elapsed since the run started
    pub elapsed: Duration,
    /// Percentage complete (0.0 - 100.0), if total is known
    pub percent_complete: Option<f64>,
}

impl ProgressEvent {
    /// Calculate progress from current state
    pub fn calculate(operation: &str, current: u64, total: Option<u64>, start: Instant) -> Self {
        let elapsed = start.elapsed();
        let elapsed_secs = elapsed.as_secs_f64();

        let units_per_second = if elapsed_secs > 0.0 {
            current as f64 / elapsed_secs
        } else {
            0.0
        };

        let percent_complete = total.map(|total| {
            if total > 0 {
                (current as f64 / total as f64) * 100.0
            } else {
                100.0
            }
        });

        Self {
            operation: operation.to_string(),
            current,
            total,
            units_per_second,
            elapsed,
            percent_complete,
        }
    }

    /// Format progress as a human-readable string
    pub fn format(&self) -> String {
        match self.percent_complete {
            Some(percent) => format!(
                "{}: {:.1}% ({}/{})",
                self.operation,
                percent,
                self.current,
                self.total.unwrap_or(0)
            ),
            None => format!("{}: {} units", self.operation, self.current),
        }
    }
}

/// Callback type for progress updates
pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Shared cancellation flag for one run.
///
/// Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    cancel: Arc<AtomicBool>,
}

impl RunControl {
    /// Create a fresh, uncancelled control
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; takes effect at the next chunk boundary
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// True once cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_calculation() {
        let start = Instant::now();
        std::thread::sleep(Duration::from_millis(10));

        let event = ProgressEvent::calculate("Copying", 500, Some(1000), start);
        assert!((event.percent_complete.unwrap() - 50.0).abs() < 0.1);
        assert!(event.units_per_second > 0.0);
        assert!(event.format().contains("50.0%"));
    }

    #[test]
    fn test_progress_unknown_total() {
        let event = ProgressEvent::calculate("Scanning", 42, None, Instant::now());
        assert!(event.percent_complete.is_none());
        assert!(event.format().contains("42"));
    }

    #[test]
    fn test_run_control() {
        let control = RunControl::new();
        assert!(!control.is_cancelled());
        let clone = control.clone();
        clone.cancel();
        assert!(control.is_cancelled());
    }
}
