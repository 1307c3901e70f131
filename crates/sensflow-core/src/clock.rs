#![forbid(unsafe_code)]

//! Time sources for the cooperative scheduler.
//!
//! Every timestamp in a pipeline is an *uptime*: a [`Duration`] measured from
//! the clock's epoch. Embedded targets rarely have a trustworthy wall clock at
//! boot, so scheduling never depends on one.
//!
//! - [`Clock::real`] follows the monotonic `web_time::Instant`.
//! - [`Clock::lab`] follows a [`LabClock`] that only moves when told to,
//!   which makes scheduler and producer tests fully deterministic.
//!
//! # Example
//!
//! ```
//! use sensflow_core::clock::{Clock, LabClock};
//! use web_time::Duration;
//!
//! let lab = LabClock::new();
//! let clock = Clock::lab(&lab);
//! assert_eq!(clock.now(), Duration::ZERO);
//!
//! lab.advance(Duration::from_millis(250));
//! assert_eq!(clock.now(), Duration::from_millis(250));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use web_time::{Duration, Instant};

// ─── Lab clock ───────────────────────────────────────────────────────────────

/// A manually-advanceable clock for deterministic tests.
///
/// All clones share the same offset, so every [`Clock`] built from the same
/// `LabClock` observes the same time.
#[derive(Debug, Clone, Default)]
pub struct LabClock {
    offset_us: Arc<AtomicU64>,
}

impl LabClock {
    /// Create a lab clock sitting at uptime zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the lab clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        let us = delta.as_micros().min(u64::MAX as u128) as u64;
        self.offset_us.fetch_add(us, Ordering::Release);
    }

    /// Move the clock forward to `uptime`. Never moves it backwards.
    pub fn advance_to(&self, uptime: Duration) {
        let us = uptime.as_micros().min(u64::MAX as u128) as u64;
        self.offset_us.fetch_max(us, Ordering::AcqRel);
    }

    /// Current lab uptime.
    #[must_use]
    pub fn now(&self) -> Duration {
        Duration::from_micros(self.offset_us.load(Ordering::Acquire))
    }
}

// ─── Clock ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum TimeSource {
    Real { epoch: Instant },
    Lab(LabClock),
}

/// Uptime source shared by the scheduler, producers, and consumers.
///
/// Cheap to clone.
#[derive(Debug, Clone)]
pub struct Clock {
    source: TimeSource,
}

impl Clock {
    /// Monotonic wall-clock uptime starting now.
    #[must_use]
    pub fn real() -> Self {
        Self {
            source: TimeSource::Real {
                epoch: Instant::now(),
            },
        }
    }

    /// Uptime driven by a [`LabClock`].
    #[must_use]
    pub fn lab(clock: &LabClock) -> Self {
        Self {
            source: TimeSource::Lab(clock.clone()),
        }
    }

    /// Elapsed time since the clock's epoch.
    #[must_use]
    pub fn now(&self) -> Duration {
        match &self.source {
            TimeSource::Real { epoch } => epoch.elapsed(),
            TimeSource::Lab(lab) => lab.now(),
        }
    }

    /// Whether this clock is lab-controlled.
    #[must_use]
    pub fn is_lab(&self) -> bool {
        matches!(self.source, TimeSource::Lab(_))
    }

    /// Wait for `delta` to pass.
    ///
    /// A real clock parks the thread. A lab clock advances itself instead, so
    /// host loops built on `sleep` stay deterministic under test.
    pub fn sleep(&self, delta: Duration) {
        match &self.source {
            TimeSource::Real { .. } => std::thread::sleep(delta),
            TimeSource::Lab(lab) => lab.advance(delta),
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::real()
    }
}
