use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use std::time::Duration;

use serde::{Deserialize, Serialize};

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Seconds to whole nanoseconds, rounded to the nearest nanosecond so that
/// `f32` frame times such as `0.02` land on exact step multiples.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn secs_to_nanos(secs: f64) -> u64 {
    if secs <= 0.0 || !secs.is_finite() {
        return 0;
    }
    (secs * NANOS_PER_SEC).round() as u64
}

// ---------------------------------------------------------------------------
// SimTime
// ---------------------------------------------------------------------------

/// Integer-nanosecond simulated-time counter.
///
/// Tracks elapsed simulated time as a monotonically increasing `u64`
/// nanosecond count so repeated substeps never drift.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct SimTime {
    nanos: u64,
}

impl SimTime {
    /// Create a new `SimTime` at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self { nanos: 0 }
    }

    /// Create a `SimTime` from a raw nanosecond count.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    /// Create a `SimTime` from seconds.
    #[must_use]
    pub fn from_secs(secs: f64) -> Self {
        Self {
            nanos: secs_to_nanos(secs),
        }
    }

    /// Raw nanosecond count.
    #[must_use]
    pub const fn nanos(&self) -> u64 {
        self.nanos
    }

    /// Elapsed seconds as `f64`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn secs_f64(&self) -> f64 {
        self.nanos as f64 / NANOS_PER_SEC
    }

    /// Elapsed seconds as `f32`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn secs_f32(&self) -> f32 {
        self.secs_f64() as f32
    }

    /// Advance the clock by `delta_nanos` nanoseconds.
    pub const fn advance(&mut self, delta_nanos: u64) {
        self.nanos = self.nanos.saturating_add(delta_nanos);
    }

    /// Reset the clock to zero.
    pub const fn reset(&mut self) {
        self.nanos = 0;
    }

    /// Convert to a standard [`Duration`].
    #[must_use]
    pub const fn to_duration(&self) -> Duration {
        Duration::from_nanos(self.nanos)
    }
}

// -- Operator impls --

impl Add<Duration> for SimTime {
    type Output = Self;

    #[allow(clippy::cast_possible_truncation)]
    fn add(self, rhs: Duration) -> Self {
        Self {
            nanos: self.nanos.saturating_add(rhs.as_nanos() as u64),
        }
    }
}

impl AddAssign<Duration> for SimTime {
    #[allow(clippy::cast_possible_truncation)]
    fn add_assign(&mut self, rhs: Duration) {
        self.nanos = self.nanos.saturating_add(rhs.as_nanos() as u64);
    }
}

impl Sub for SimTime {
    type Output = Duration;

    /// Saturating difference of two `SimTime` values.
    fn sub(self, rhs: Self) -> Duration {
        Duration::from_nanos(self.nanos.saturating_sub(rhs.nanos))
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_secs = self.nanos / 1_000_000_000;
        let remaining_nanos = self.nanos % 1_000_000_000;
        let millis = remaining_nanos / 1_000_000;
        let micros = (remaining_nanos % 1_000_000) / 1_000;
        write!(f, "{total_secs}.{millis:03}{micros:03}s")
    }
}

// ---------------------------------------------------------------------------
// StepBudget
// ---------------------------------------------------------------------------

/// Result of draining an [`Accumulator`] for one `step_simulation` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepBudget {
    /// Number of fixed substeps to run.
    pub steps: u32,
    /// Substeps that were due but fell beyond the cap and were discarded.
    pub dropped: u32,
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

/// Fixed-timestep accumulator with a per-call substep cap.
///
/// Frame time is fed with [`accumulate`](Self::accumulate) and handed out in
/// whole fixed steps by [`drain`](Self::drain). The sub-step remainder is kept
/// for the next call; whole steps beyond the cap are dropped, never queued.
#[derive(Debug, Clone)]
pub struct Accumulator {
    pending: u64,
    remainder: u64,
    timestep_nanos: u64,
    max_steps: u32,
}

impl Accumulator {
    /// Create a new accumulator with the given fixed timestep in seconds.
    pub fn new(timestep_secs: f64) -> Self {
        Self {
            pending: 0,
            remainder: 0,
            timestep_nanos: secs_to_nanos(timestep_secs),
            max_steps: 1,
        }
    }

    /// Set the maximum number of steps handed out per drain.
    #[must_use]
    pub const fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.set_max_steps(max_steps);
        self
    }

    /// Change the per-drain cap (clamped to at least one).
    pub const fn set_max_steps(&mut self, max_steps: u32) {
        self.max_steps = if max_steps == 0 { 1 } else { max_steps };
    }

    /// Change the fixed timestep. Pending time is kept.
    pub fn set_timestep(&mut self, timestep_secs: f64) {
        self.timestep_nanos = secs_to_nanos(timestep_secs);
        self.remainder = 0;
    }

    /// Feed frame time into the accumulator.
    pub fn accumulate(&mut self, delta_secs: f64) {
        self.pending = self.pending.saturating_add(secs_to_nanos(delta_secs));
    }

    /// `ceil(pending / timestep)`: steps the frame time alone asks for.
    #[must_use]
    pub const fn requested_steps(&self) -> u64 {
        if self.timestep_nanos == 0 {
            return 0;
        }
        self.pending.div_ceil(self.timestep_nanos)
    }

    /// Consume all pending time and return the substeps to run.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn drain(&mut self) -> StepBudget {
        if self.timestep_nanos == 0 {
            self.pending = 0;
            return StepBudget {
                steps: 0,
                dropped: 0,
            };
        }
        let total = self.remainder.saturating_add(self.pending);
        self.pending = 0;
        self.remainder = total % self.timestep_nanos;

        let due = total / self.timestep_nanos;
        let max = self.max_steps as u64;
        if due > max {
            StepBudget {
                steps: self.max_steps,
                dropped: (due - max) as u32,
            }
        } else {
            StepBudget {
                steps: due as u32,
                dropped: 0,
            }
        }
    }

    /// The fixed timestep in nanoseconds.
    #[must_use]
    pub const fn timestep_nanos(&self) -> u64 {
        self.timestep_nanos
    }

    /// The fixed timestep in seconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn timestep(&self) -> f64 {
        self.timestep_nanos as f64 / NANOS_PER_SEC
    }

    /// The per-drain step cap.
    #[must_use]
    pub const fn max_steps(&self) -> u32 {
        self.max_steps
    }

    /// Time fed since the last drain, in seconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn pending_secs(&self) -> f64 {
        self.pending as f64 / NANOS_PER_SEC
    }

    /// Sub-step residue carried between drains, in seconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn remainder_secs(&self) -> f64 {
        self.remainder as f64 / NANOS_PER_SEC
    }

    /// Drop all pending and carried time.
    pub const fn reset(&mut self) {
        self.pending = 0;
        self.remainder = 0;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
