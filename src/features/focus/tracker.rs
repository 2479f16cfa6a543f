//! Session timer and aggregator.
//!
//! [`SessionTracker`] owns the session log and the single active-session
//! pointer. Transitions apply synchronously and never fail; each one emits
//! [`PersistIntent`]s to the sync worker and moves on without waiting.

use chrono::{DateTime, Local, Utc, Weekday};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use super::session::{running_delta, ActiveSession, Session, SessionState};
use crate::core::{CalendarWindow, Clock, SystemClock};
use crate::features::sync::PersistIntent;

/// What a transition did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "transition", rename_all = "snake_case")]
pub enum Transition {
    /// A new session is running. `ended` holds the session force-ended to
    /// make room for it.
    Started {
        session: Session,
        ended: Option<Session>,
    },
    /// The active session stopped accruing time.
    Paused { session: Session },
    /// The active session is accruing time again.
    Resumed { session: Session },
    /// The active session was finalized.
    Ended { session: Session },
    /// Nothing is active.
    NoActiveSession,
    /// Pause requested while already paused.
    NotRunning,
    /// Resume requested while running.
    NotPaused,
}

impl Transition {
    /// Whether the call left everything untouched.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        matches!(
            self,
            Self::NoActiveSession | Self::NotRunning | Self::NotPaused
        )
    }

    /// The session the transition acted on, if any.
    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        match self {
            Self::Started { session, .. }
            | Self::Paused { session }
            | Self::Resumed { session }
            | Self::Ended { session } => Some(session),
            Self::NoActiveSession | Self::NotRunning | Self::NotPaused => None,
        }
    }
}

/// Focus-time tracker.
///
/// At most one session is active. The log holds every session, including
/// the open one, whose entry is updated on every transition so log scans
/// never double-count it.
pub struct SessionTracker<C: Clock = SystemClock> {
    clock: C,
    owner_id: Option<String>,
    week_starts_on: Weekday,
    log: Vec<Session>,
    active: Option<ActiveSession>,
    outbox: Option<UnboundedSender<PersistIntent>>,
}

impl<C: Clock> SessionTracker<C> {
    /// Create an idle tracker with an empty log.
    #[must_use]
    pub const fn new(clock: C) -> Self {
        Self {
            clock,
            owner_id: None,
            week_starts_on: Weekday::Sun,
            log: Vec::new(),
            active: None,
            outbox: None,
        }
    }

    /// Stamp new sessions with an owner identity.
    #[must_use]
    pub fn with_owner(mut self, owner_id: Option<String>) -> Self {
        self.owner_id = owner_id;
        self
    }

    /// Set the first day of the week window.
    #[must_use]
    pub const fn with_week_start(mut self, day: Weekday) -> Self {
        self.week_starts_on = day;
        self
    }

    /// Send persistence intents to `outbox`.
    #[must_use]
    pub fn with_outbox(mut self, outbox: UnboundedSender<PersistIntent>) -> Self {
        self.outbox = Some(outbox);
        self
    }

    /// Rebuild the log from cached sessions.
    ///
    /// The newest un-ended session becomes active. Any other un-ended
    /// session is ended at its last update, keeping the elapsed time it had
    /// folded by then. Returns how many sessions were ended that way.
    pub fn restore(&mut self, sessions: Vec<Session>) -> usize {
        self.log = sessions;
        self.active = None;

        let newest_open = self
            .log
            .iter()
            .filter(|s| !s.is_ended())
            .max_by_key(|s| (s.start_time, s.updated_at))
            .map(|s| s.id.clone());

        let mut repaired = Vec::new();
        for session in &mut self.log {
            if session.is_ended() || Some(&session.id) == newest_open.as_ref() {
                continue;
            }
            session.end_time = Some(session.updated_at);
            session.is_running = false;
            repaired.push(session.clone());
        }

        if let Some(id) = newest_open {
            self.active = self.log.iter().find(|s| s.id == id).map(ActiveSession::of);
        }

        let count = repaired.len();
        if count > 0 {
            warn!(count, "ended stale open sessions from cache");
        }
        for session in repaired {
            self.emit(PersistIntent::UpsertSession(session));
        }

        info!(
            sessions = self.log.len(),
            state = %self.state(),
            "tracker restored"
        );
        count
    }

    /// Start a session for `item_ref`, force-ending any active session first.
    pub fn start_session(
        &mut self,
        item_ref: impl Into<String>,
        item_label: impl Into<String>,
    ) -> Transition {
        let now = self.clock.now();
        let ended = match self.end_at(now) {
            Transition::Ended { session } => Some(session),
            _ => None,
        };

        let session = Session::start(item_ref, item_label, self.owner_id.clone(), now);
        info!(id = %session.id, item = %session.item_ref, "session started");

        self.active = Some(ActiveSession::of(&session));
        self.log.push(session.clone());
        self.emit(PersistIntent::UpsertSession(session.clone()));

        Transition::Started { session, ended }
    }

    /// Stop accruing time. No-op unless running.
    pub fn pause_session(&mut self) -> Transition {
        let now = self.clock.now();
        match self.active.as_mut() {
            None => {
                debug!("pause ignored: no active session");
                return Transition::NoActiveSession;
            }
            Some(active) if !active.is_running => {
                debug!("pause ignored: already paused");
                return Transition::NotRunning;
            }
            Some(active) => {
                active.elapsed_ms += running_delta(active.start_time, now);
                active.is_running = false;
            }
        }

        match self.sync_open_entry(now, None) {
            Some(session) => {
                info!(id = %session.id, elapsed_ms = session.elapsed_ms, "session paused");
                self.emit(PersistIntent::UpsertSession(session.clone()));
                Transition::Paused { session }
            }
            None => Transition::NoActiveSession,
        }
    }

    /// Start accruing time again. No-op unless paused.
    pub fn resume_session(&mut self) -> Transition {
        let now = self.clock.now();
        match self.active.as_mut() {
            None => {
                debug!("resume ignored: no active session");
                return Transition::NoActiveSession;
            }
            Some(active) if active.is_running => {
                debug!("resume ignored: already running");
                return Transition::NotPaused;
            }
            Some(active) => {
                active.start_time = now;
                active.is_running = true;
            }
        }

        match self.sync_open_entry(now, None) {
            Some(session) => {
                info!(id = %session.id, "session resumed");
                self.emit(PersistIntent::UpsertSession(session.clone()));
                Transition::Resumed { session }
            }
            None => Transition::NoActiveSession,
        }
    }

    /// Finalize the active session. No-op when idle.
    pub fn end_session(&mut self) -> Transition {
        let now = self.clock.now();
        self.end_at(now)
    }

    fn end_at(&mut self, now: DateTime<Utc>) -> Transition {
        let Some(active) = self.active.as_mut() else {
            debug!("end ignored: no active session");
            return Transition::NoActiveSession;
        };

        if active.is_running {
            active.elapsed_ms += running_delta(active.start_time, now);
            active.is_running = false;
        }

        let session = self.sync_open_entry(now, Some(now));
        self.active = None;

        let Some(session) = session else {
            return Transition::NoActiveSession;
        };

        info!(
            id = %session.id,
            item = %session.item_ref,
            elapsed_ms = session.elapsed_ms,
            "session ended"
        );
        self.emit(PersistIntent::UpsertSession(session.clone()));
        self.emit(PersistIntent::AddDailyFocus {
            owner_id: session.owner_id.clone(),
            date: now.with_timezone(&Local).date_naive(),
            ms: session.elapsed_ms,
        });

        Transition::Ended { session }
    }

    /// Copy the active pointer's fields into its log entry.
    fn sync_open_entry(
        &mut self,
        now: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
    ) -> Option<Session> {
        let active = self.active.as_ref()?;
        let Some(entry) = self.log.iter_mut().find(|s| s.id == active.session_id) else {
            warn!(id = %active.session_id, "active session missing from log");
            return None;
        };

        entry.start_time = active.start_time;
        entry.elapsed_ms = active.elapsed_ms;
        entry.is_running = active.is_running;
        entry.end_time = end_time;
        entry.updated_at = now;
        Some(entry.clone())
    }

    fn emit(&self, intent: PersistIntent) {
        let Some(outbox) = &self.outbox else {
            return;
        };
        let kind = intent.kind();
        if outbox.send(intent).is_err() {
            warn!(kind, "sync worker stopped; intent not persisted");
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.active
            .as_ref()
            .map_or(SessionState::Idle, ActiveSession::state)
    }

    /// The active session pointer.
    #[must_use]
    pub const fn active(&self) -> Option<&ActiveSession> {
        self.active.as_ref()
    }

    /// The log entry of the active session.
    #[must_use]
    pub fn active_session(&self) -> Option<&Session> {
        let active = self.active.as_ref()?;
        self.log.iter().find(|s| s.id == active.session_id)
    }

    /// Every session known to the tracker.
    #[must_use]
    pub fn log(&self) -> &[Session] {
        &self.log
    }

    /// The clock's current instant.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// First day of the week window.
    #[must_use]
    pub const fn week_starts_on(&self) -> Weekday {
        self.week_starts_on
    }

    /// Elapsed time of the active session right now. Read-only; suitable for
    /// a ticking display.
    #[must_use]
    pub fn live_elapsed(&self) -> i64 {
        let now = self.clock.now();
        self.active.as_ref().map_or(0, |a| a.elapsed_at(now))
    }

    /// Focus time in sessions whose `start_time` is at or after
    /// `window_start`, including time accrued since the last resume.
    #[must_use]
    pub fn window_total(&self, window_start: DateTime<Utc>) -> i64 {
        let now = self.clock.now();
        let logged: i64 = self
            .log
            .iter()
            .filter(|s| s.start_time >= window_start)
            .map(|s| s.elapsed_ms)
            .sum();
        let live = self
            .active
            .as_ref()
            .filter(|a| a.start_time >= window_start)
            .map_or(0, |a| a.live_delta(now));
        logged + live
    }

    /// Start of `window` as of now.
    #[must_use]
    pub fn window_start(&self, window: CalendarWindow) -> DateTime<Utc> {
        window.start_local(self.clock.now(), self.week_starts_on)
    }

    /// Focus time in a calendar window.
    #[must_use]
    pub fn total_for(&self, window: CalendarWindow) -> i64 {
        self.window_total(self.window_start(window))
    }

    /// Focus time since local midnight.
    #[must_use]
    pub fn today_total(&self) -> i64 {
        self.total_for(CalendarWindow::Today)
    }

    /// Focus time since the start of the week.
    #[must_use]
    pub fn week_total(&self) -> i64 {
        self.total_for(CalendarWindow::Week)
    }

    /// Focus time since the first of the month.
    #[must_use]
    pub fn month_total(&self) -> i64 {
        self.total_for(CalendarWindow::Month)
    }

    /// Focus time since January 1.
    #[must_use]
    pub fn year_total(&self) -> i64 {
        self.total_for(CalendarWindow::Year)
    }

    /// All-time focus on `item_ref`.
    #[must_use]
    pub fn project_total(&self, item_ref: &str) -> i64 {
        let now = self.clock.now();
        let logged: i64 = self
            .log
            .iter()
            .filter(|s| s.item_ref == item_ref)
            .map(|s| s.elapsed_ms)
            .sum();
        let live = self
            .active
            .as_ref()
            .filter(|a| a.item_ref == item_ref)
            .map_or(0, |a| a.live_delta(now));
        logged + live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use chrono::Duration;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn tracker_at(ms: i64) -> (SessionTracker<ManualClock>, ManualClock) {
        let clock = ManualClock::at_millis(ms);
        (SessionTracker::new(clock.clone()), clock)
    }

    /// Local noon on the first day of `window`, with weeks starting Sunday.
    fn local_noon(window: CalendarWindow) -> DateTime<Utc> {
        window.start_local(Utc::now(), Weekday::Sun) + Duration::hours(12)
    }

    fn drain(rx: &mut UnboundedReceiver<PersistIntent>) -> Vec<PersistIntent> {
        let mut intents = Vec::new();
        while let Ok(intent) = rx.try_recv() {
            intents.push(intent);
        }
        intents
    }

    #[test]
    fn test_pause_resume_end_scenario() {
        let (mut tracker, clock) = tracker_at(0);
        tracker.start_session("X", "Item X");
        assert_eq!(tracker.state(), SessionState::Running);

        clock.set_millis(600_000);
        let Transition::Paused { session } = tracker.pause_session() else {
            panic!("expected pause");
        };
        assert_eq!(session.elapsed_ms, 600_000);
        assert!(!session.is_running);
        assert_eq!(tracker.log()[0].elapsed_ms, 600_000);

        clock.set_millis(900_000);
        assert!(matches!(tracker.resume_session(), Transition::Resumed { .. }));

        clock.set_millis(1_500_000);
        let Transition::Ended { session } = tracker.end_session() else {
            panic!("expected end");
        };
        assert_eq!(session.elapsed_ms, 1_200_000);
        assert_eq!(session.end_time.map(|t| t.timestamp_millis()), Some(1_500_000));
        assert!(!session.is_running);
        assert_eq!(tracker.state(), SessionState::Idle);
        assert!(tracker.active().is_none());
        assert_eq!(tracker.log(), &[session]);
    }

    #[test]
    fn test_elapsed_is_sum_of_running_intervals() {
        let (mut tracker, clock) = tracker_at(0);
        tracker.start_session("X", "X");

        let mut expected = 0;
        for (run, rest) in [(1_000, 5_000), (250, 0), (90_000, 17), (3, 3)] {
            clock.advance_millis(run);
            expected += run;
            tracker.pause_session();
            clock.advance_millis(rest);
            tracker.resume_session();
        }
        clock.advance_millis(7);
        expected += 7;

        let Transition::Ended { session } = tracker.end_session() else {
            panic!("expected end");
        };
        assert_eq!(session.elapsed_ms, expected);
    }

    #[test]
    fn test_zero_duration_pause_resume() {
        let (mut tracker, clock) = tracker_at(10_000);
        tracker.start_session("X", "X");
        clock.advance_millis(4_000);
        tracker.pause_session();
        let before = tracker.log()[0].elapsed_ms;

        tracker.resume_session();
        tracker.pause_session();

        assert_eq!(tracker.log()[0].elapsed_ms, before);
    }

    #[test]
    fn test_idle_operations_are_noops() {
        let (mut tracker, _clock) = tracker_at(0);
        let (tx, mut rx) = mpsc::unbounded_channel();
        tracker = tracker.with_outbox(tx);

        assert_eq!(tracker.pause_session(), Transition::NoActiveSession);
        assert_eq!(tracker.resume_session(), Transition::NoActiveSession);
        assert_eq!(tracker.end_session(), Transition::NoActiveSession);
        assert!(tracker.log().is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_idle_operations_leave_ended_sessions_alone() {
        let (mut tracker, clock) = tracker_at(0);
        let (tx, mut rx) = mpsc::unbounded_channel();
        tracker = tracker.with_outbox(tx);

        tracker.start_session("X", "X");
        clock.set_millis(60_000);
        tracker.end_session();
        drain(&mut rx);
        let before = tracker.log().to_vec();

        clock.set_millis(120_000);
        assert_eq!(tracker.pause_session(), Transition::NoActiveSession);
        assert_eq!(tracker.resume_session(), Transition::NoActiveSession);
        assert_eq!(tracker.end_session(), Transition::NoActiveSession);

        assert_eq!(tracker.log(), before.as_slice());
        assert_eq!(tracker.log()[0].updated_at.timestamp_millis(), 60_000);
        assert_eq!(tracker.state(), SessionState::Idle);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_guarded_noops() {
        let (mut tracker, clock) = tracker_at(0);
        tracker.start_session("X", "X");
        assert_eq!(tracker.resume_session(), Transition::NotPaused);

        clock.advance_millis(1_000);
        tracker.pause_session();
        clock.advance_millis(1_000);
        assert_eq!(tracker.pause_session(), Transition::NotRunning);
        assert_eq!(tracker.log()[0].elapsed_ms, 1_000);
        assert!(tracker.pause_session().is_noop());
    }

    #[test]
    fn test_start_force_ends_active() {
        let (mut tracker, clock) = tracker_at(0);
        tracker.start_session("A", "A");
        clock.advance_millis(5_000);

        let Transition::Started { session, ended } = tracker.start_session("B", "B") else {
            panic!("expected start");
        };
        let ended = ended.unwrap();
        assert_eq!(ended.item_ref, "A");
        assert_eq!(ended.elapsed_ms, 5_000);
        assert!(ended.is_ended());

        assert_eq!(session.item_ref, "B");
        assert_eq!(tracker.active().unwrap().session_id, session.id);
        assert_eq!(tracker.log().len(), 2);
        assert_eq!(tracker.log().iter().filter(|s| !s.is_ended()).count(), 1);
    }

    #[test]
    fn test_live_elapsed_does_not_mutate() {
        let (mut tracker, clock) = tracker_at(0);
        tracker.start_session("X", "X");
        clock.advance_millis(3_000);

        assert_eq!(tracker.live_elapsed(), 3_000);
        assert_eq!(tracker.live_elapsed(), 3_000);
        assert_eq!(tracker.log()[0].elapsed_ms, 0);
        assert_eq!(tracker.active().unwrap().elapsed_ms, 0);
    }

    #[test]
    fn test_today_total_grows_while_running() {
        let clock = ManualClock::new(local_noon(CalendarWindow::Today));
        let mut tracker = SessionTracker::new(clock.clone());
        tracker.start_session("X", "X");
        clock.advance_millis(60_000);

        let first = tracker.today_total();
        clock.advance(Duration::seconds(2));
        let second = tracker.today_total();

        assert_eq!(second - first, 2_000);
    }

    #[test]
    fn test_paused_session_counted_once() {
        let clock = ManualClock::new(local_noon(CalendarWindow::Today));
        let mut tracker = SessionTracker::new(clock.clone());
        tracker.start_session("X", "X");
        clock.advance_millis(10_000);
        tracker.pause_session();
        clock.advance_millis(50_000);

        assert_eq!(tracker.today_total(), 10_000);
    }

    #[test]
    fn test_today_equals_week_on_first_day() {
        let clock = ManualClock::new(local_noon(CalendarWindow::Week));
        let mut tracker = SessionTracker::new(clock.clone());

        tracker.start_session("A", "A");
        clock.advance_millis(30_000);
        tracker.end_session();
        tracker.start_session("B", "B");
        clock.advance_millis(12_000);

        assert_eq!(tracker.today_total(), 42_000);
        assert_eq!(tracker.today_total(), tracker.week_total());
    }

    #[test]
    fn test_window_total_excludes_earlier_sessions() {
        let (mut tracker, clock) = tracker_at(0);
        tracker.start_session("old", "old");
        clock.advance_millis(1_000);
        tracker.end_session();

        clock.set_millis(100_000);
        tracker.start_session("new", "new");
        clock.advance_millis(2_000);
        tracker.end_session();

        let cutoff = DateTime::from_timestamp_millis(50_000).unwrap();
        assert_eq!(tracker.window_total(cutoff), 2_000);
        assert_eq!(tracker.window_total(DateTime::from_timestamp_millis(0).unwrap()), 3_000);
    }

    #[test]
    fn test_project_total() {
        let (mut tracker, clock) = tracker_at(0);
        tracker.start_session("A", "A");
        clock.advance_millis(1_000);
        tracker.start_session("B", "B");
        clock.advance_millis(2_000);
        tracker.start_session("A", "A");
        clock.advance_millis(4_000);

        assert_eq!(tracker.project_total("A"), 5_000);
        assert_eq!(tracker.project_total("B"), 2_000);
        assert_eq!(tracker.project_total("C"), 0);
    }

    #[test]
    fn test_transitions_emit_intents() {
        let (tracker, clock) = tracker_at(0);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tracker = tracker.with_owner(Some("owner-1".to_string())).with_outbox(tx);

        tracker.start_session("X", "X");
        clock.advance_millis(1_000);
        tracker.pause_session();
        tracker.resume_session();
        clock.advance_millis(1_000);
        tracker.end_session();

        let kinds: Vec<_> = drain(&mut rx).iter().map(PersistIntent::kind).collect();
        assert_eq!(
            kinds,
            vec![
                "upsert_session",
                "upsert_session",
                "upsert_session",
                "upsert_session",
                "add_daily_focus"
            ]
        );
    }

    #[test]
    fn test_daily_rollup_on_end() {
        let (tracker, clock) = tracker_at(0);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tracker = tracker.with_owner(Some("owner-1".to_string())).with_outbox(tx);

        tracker.start_session("X", "X");
        clock.advance_millis(90_000);
        tracker.end_session();

        let rollup = drain(&mut rx).pop().unwrap();
        match rollup {
            PersistIntent::AddDailyFocus { owner_id, ms, .. } => {
                assert_eq!(owner_id.as_deref(), Some("owner-1"));
                assert_eq!(ms, 90_000);
            }
            PersistIntent::UpsertSession(_) => panic!("expected rollup"),
        }
    }

    #[test]
    fn test_closed_outbox_does_not_affect_state() {
        let (tracker, clock) = tracker_at(0);
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut tracker = tracker.with_outbox(tx);

        tracker.start_session("X", "X");
        clock.advance_millis(1_000);
        tracker.end_session();

        assert_eq!(tracker.log()[0].elapsed_ms, 1_000);
    }

    #[test]
    fn test_restore() {
        let t = |ms| DateTime::from_timestamp_millis(ms).unwrap();
        let mut ended = Session::start("A", "A", None, t(0));
        ended.elapsed_ms = 1_000;
        ended.is_running = false;
        ended.end_time = Some(t(1_000));

        let mut stale = Session::start("B", "B", None, t(2_000));
        stale.elapsed_ms = 500;
        stale.updated_at = t(2_500);

        let mut open = Session::start("C", "C", None, t(5_000));
        open.elapsed_ms = 2_000;
        open.is_running = false;
        open.updated_at = t(7_000);

        let (mut tracker, _clock) = tracker_at(10_000);
        let (tx, mut rx) = mpsc::unbounded_channel();
        tracker = tracker.with_outbox(tx);

        assert_eq!(tracker.restore(vec![ended, stale.clone(), open.clone()]), 1);

        assert_eq!(tracker.state(), SessionState::Paused);
        assert_eq!(tracker.active().unwrap().session_id, open.id);
        assert_eq!(tracker.live_elapsed(), 2_000);

        let repaired = tracker.log().iter().find(|s| s.id == stale.id).unwrap();
        assert_eq!(repaired.end_time, Some(t(2_500)));
        assert_eq!(repaired.elapsed_ms, 500);
        assert_eq!(drain(&mut rx).len(), 1);

        assert_eq!(tracker.project_total("B"), 500);
    }

    #[test]
    fn test_monday_week_start() {
        let sunday_noon = local_noon(CalendarWindow::Week);
        let tracker =
            SessionTracker::new(ManualClock::new(sunday_noon)).with_week_start(Weekday::Mon);
        assert_eq!(tracker.week_starts_on(), Weekday::Mon);
        assert!(tracker.window_start(CalendarWindow::Week) < tracker.window_start(CalendarWindow::Today));
    }
}
