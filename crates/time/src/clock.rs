// src/clock.rs
//
// Cairn Time: system wall clock in microseconds, clamped so that
// successive readings are strictly increasing.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// ==== STATE ====

#[derive(Debug, Default)]
struct ClockState {
    last_time_us: u64,
}

static STATE: Lazy<Mutex<ClockState>> = Lazy::new(|| Mutex::new(ClockState::default()));

/// Unit tests in this crate share global clock state; serialize them to avoid cross-test races.
#[cfg(test)]
pub(crate) static TEST_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

fn system_time_now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_micros() as u64
}

// ==== PUBLIC API ====

/// Reset the clock to the current system time.
pub fn init() {
    let now = system_time_now_us();
    let mut state = STATE.lock();
    state.last_time_us = now;
}

/// Never hand out a reading at or below `floor_us` from now on.
///
/// Persistent stores call this with their newest timestamp so records written
/// after a restart sort after everything already on disk, even if the system
/// clock stepped back in between.
pub fn advance_to(floor_us: u64) {
    let mut state = STATE.lock();
    if floor_us > state.last_time_us {
        state.last_time_us = floor_us;
    }
}

/// Return the current Cairn time in microseconds since the UNIX epoch.
///
/// Readings are strictly increasing: if the system clock stalls or steps
/// back, the previous reading plus one microsecond is returned instead.
pub fn now_us() -> u64 {
    let now = system_time_now_us();
    let mut state = STATE.lock();
    let candidate = if now <= state.last_time_us {
        state.last_time_us.saturating_add(1)
    } else {
        now
    };
    state.last_time_us = candidate;
    candidate
}

/// Return the current Cairn time as a Duration since UNIX_EPOCH.
pub fn now() -> Duration {
    Duration::from_micros(now_us())
}

/// Microsecond timestamp assigned to registry records.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CairnTimeMicros(pub u64);

impl CairnTimeMicros {
    /// Current Cairn time.
    pub fn now() -> Self {
        Self(now_us())
    }

    pub fn as_micros(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CairnTimeMicros {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}

impl From<u64> for CairnTimeMicros {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// ==== TESTS ====
