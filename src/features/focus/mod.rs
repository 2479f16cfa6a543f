//! Focus session tracking and aggregation.
//!
//! - One active session at a time, with pause/resume
//! - Calendar-window and per-item totals
//! - Local session cache and reports

pub mod report;
pub mod session;
pub mod storage;
pub mod timer;
pub mod tracker;

pub use report::{DailyFocusTime, FocusReport, ItemFocusTime};
pub use session::{ActiveSession, Session, SessionState};
pub use storage::SessionCache;
pub use timer::{format_clock, format_hm, format_hms};
pub use tracker::{SessionTracker, Transition};
