//! Suspension detection via monotonic-vs-wall-clock comparison (spec §4.G
//! "Suspension recovery"), grounded on the teacher corpus's polling-loop
//! idiom and the original `SuspendDetector`.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::warn;

const DEFAULT_THRESHOLD_SECS: i64 = 30;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Magnitude and direction of a detected discontinuity. Positive means the
/// wall clock jumped forward relative to monotonic elapsed time (suspension);
/// negative means it jumped backward (clock adjustment).
#[derive(Debug, Clone, Copy)]
pub struct SuspensionEvent {
    pub wall_jump_secs: i64,
    pub detected_at: DateTime<Utc>,
}

/// Polls every `poll_interval` (using `Instant`, itself monotonic) and
/// compares elapsed monotonic time against elapsed wall-clock time.
pub struct SuspendDetector {
    threshold_secs: i64,
    poll_interval: Duration,
    last_monotonic: Instant,
    last_wall: DateTime<Utc>,
}

impl SuspendDetector {
    pub fn new() -> Self {
        Self::with_params(DEFAULT_THRESHOLD_SECS, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_params(threshold_secs: i64, poll_interval: Duration) -> Self {
        Self {
            threshold_secs,
            poll_interval,
            last_monotonic: Instant::now(),
            last_wall: Utc::now(),
        }
    }

    /// Run indefinitely, invoking `on_suspend` whenever a discontinuity
    /// larger than the threshold is detected. The comparator itself uses
    /// monotonic time to schedule its own polls, so suspension cannot skew
    /// the poll cadence.
    pub async fn watch<F>(mut self, mut on_suspend: F)
    where
        F: FnMut(SuspensionEvent),
    {
        loop {
            tokio::time::sleep(self.poll_interval).await;
            if let Some(event) = self.poll() {
                on_suspend(event);
            }
        }
    }

    /// One polling step; exposed separately so tests can drive it without a
    /// real sleep.
    pub fn poll(&mut self) -> Option<SuspensionEvent> {
        let current_mono = Instant::now();
        let current_wall = Utc::now();

        let mono_elapsed = current_mono.duration_since(self.last_monotonic);
        let expected_wall = self.last_wall + chrono::Duration::from_std(mono_elapsed).unwrap_or_default();
        let wall_jump = (current_wall - expected_wall).num_seconds();

        self.last_monotonic = current_mono;
        self.last_wall = current_wall;

        if wall_jump.abs() > self.threshold_secs {
            warn!(wall_jump, "clock discontinuity detected, treating as suspension event");
            Some(SuspensionEvent { wall_jump_secs: wall_jump, detected_at: current_wall })
        } else {
            None
        }
    }
}

impl Default for SuspendDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_jump_when_clocks_agree() {
        let mut d = SuspendDetector::with_params(30, Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(d.poll().is_none());
    }

    #[test]
    fn forward_jump_detected_when_wall_clock_advances_without_monotonic() {
        let mut d = SuspendDetector::with_params(30, Duration::from_secs(5));
        // Simulate a suspension: wall clock moved far ahead while monotonic
        // (and our test thread) barely moved at all.
        d.last_wall = Utc::now() - chrono::Duration::seconds(120);
        let event = d.poll().expect("expected a suspension event");
        assert!(event.wall_jump_secs > 30);
    }
}
