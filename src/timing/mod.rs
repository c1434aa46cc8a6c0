//! Timing utilities: frame timestamps and sink pacing
//!
//! `MediaClock` stamps decoded frames; `FramePacer` is the virtual camera's
//! intrinsic frame clock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::{Interval, MissedTickBehavior};

/// Monotonic clock for frame timestamps
///
/// Cloned clocks share one timebase.
#[derive(Debug, Clone)]
pub struct MediaClock {
    start: Arc<Instant>,
}

impl MediaClock {
    pub fn new() -> Self {
        Self {
            start: Arc::new(Instant::now()),
        }
    }

    /// Seconds since the clock was created
    #[inline]
    pub fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for MediaClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-rate frame slots.
///
/// `pace()` suspends until the next slot. A late caller is not given a burst
/// of catch-up slots; the schedule skips ahead instead.
#[derive(Debug)]
pub struct FramePacer {
    interval: Interval,
    period: Duration,
}

impl FramePacer {
    /// Pacer for `fps` frames per second (0 is treated as 1)
    pub fn new(fps: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval, period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait for the next frame slot
    pub async fn pace(&mut self) {
        self.interval.tick().await;
    }
}
