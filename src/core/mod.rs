//! Core abstractions for focuslog.
//!
//! This module provides the clock and calendar utilities shared across features.

mod calendar;
mod clock;

pub use calendar::{midnight, CalendarWindow};
pub use clock::{Clock, ManualClock, SystemClock};
