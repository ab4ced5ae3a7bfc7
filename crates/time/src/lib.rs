//! Cairn Time Library
//!
//! Wall-clock timestamps with microsecond precision that never move
//! backwards within a process, even if the system clock is stepped.
//!
//! # Features
//! - Microsecond precision
//! - Monotonic advancement (strictly increasing readings)
//! - Thread-safe static state

pub mod clock;

pub use clock::{advance_to, init, now, now_us, CairnTimeMicros};
