//! Build timing utilities.

use std::time::Instant;

/// A simple timer for measuring build stage durations.
pub struct Timer {
    name: String,
    start: Instant,
}

impl Timer {
    pub fn start(name: &str) -> Self {
        Self {
            name: name.to_string(),
            start: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Finish the timer and log the elapsed time.
    pub fn finish(self) {
        let secs = self.elapsed_secs();
        if secs >= 60.0 {
            tracing::info!(stage = %self.name, "finished in {:.1}m", secs / 60.0);
        } else {
            tracing::info!(stage = %self.name, "finished in {:.1}s", secs);
        }
    }
}
