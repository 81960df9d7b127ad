//! Monotonic timing against a soft warning threshold and a hard hang threshold.

use std::time::Instant;

use strata_config::WatchdogConfig;

#[derive(Clone, Copy, Debug)]
pub struct DeadlineTimer {
    epoch: Instant,
    warn_ms: u64,
    hang_ms: u64,
}

impl DeadlineTimer {
    pub fn new(warn_ms: u64, hang_ms: u64) -> Self {
        Self {
            epoch: Instant::now(),
            warn_ms,
            hang_ms,
        }
    }

    pub fn from_config(config: &WatchdogConfig) -> Self {
        Self::new(config.warn_ms, config.hang_ms)
    }

    pub fn now(&self) -> Instant {
        Instant::now()
    }

    /// Whole milliseconds elapsed since `t`.
    pub fn since(&self, t: Instant) -> u64 {
        t.elapsed().as_millis() as u64
    }

    /// `true` once `elapsed_ms` exceeds the slow-item threshold.
    pub fn warn(&self, elapsed_ms: u64) -> bool {
        elapsed_ms > self.warn_ms
    }

    /// `true` once `elapsed_ms` exceeds the hang threshold.
    pub fn is_hung(&self, elapsed_ms: u64) -> bool {
        elapsed_ms > self.hang_ms
    }

    pub fn warn_ms(&self) -> u64 {
        self.warn_ms
    }

    pub fn hang_ms(&self) -> u64 {
        self.hang_ms
    }

    /// Milliseconds since this timer was created, truncated to 32 bits so
    /// it fits in a packed slot word. Wraps after ~49 days.
    pub(crate) fn stamp(&self) -> u32 {
        self.epoch.elapsed().as_millis() as u32
    }

    /// Elapsed millis since an earlier [`stamp`](Self::stamp), wrap-safe.
    pub(crate) fn since_stamp(&self, stamp: u32) -> u64 {
        u64::from(self.stamp().wrapping_sub(stamp))
    }
}

impl Default for DeadlineTimer {
    fn default() -> Self {
        Self::from_config(&WatchdogConfig::default())
    }
}
