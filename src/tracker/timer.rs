//! Cooperative focus/break timer.
//!
//! There is no scheduler behind the timer. Whoever drives it calls [FocusTimer::tick] and the
//! timer subtracts the real time that passed since the previous reference point, so a late or
//! delayed tick (laptop sleep, slow cycle) catches up in one step.

use std::{
    fmt::Display,
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::info;

pub const DEFAULT_FOCUS_DURATION: Duration = Duration::from_secs(25 * 60);
pub const DEFAULT_BREAK_DURATION: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimerPhase {
    #[default]
    Idle,
    Focus,
    Break,
}

impl TimerPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerPhase::Idle => "idle",
            TimerPhase::Focus => "focus",
            TimerPhase::Break => "break",
        }
    }
}

impl Display for TimerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimerPhase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            // Logs written without timer integration leave the column blank.
            "idle" | "" => Ok(TimerPhase::Idle),
            "focus" => Ok(TimerPhase::Focus),
            "break" => Ok(TimerPhase::Break),
            other => Err(anyhow!("Unknown timer phase {other}")),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskLabelError {
    #[error("task label must not be empty")]
    Empty,
    #[error("task label must fit on a single line")]
    Multiline,
}

/// Validated label of a focus session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskLabel(pub(super) Arc<str>);

impl TaskLabel {
    pub fn parse(value: &str) -> Result<Self, TaskLabelError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(TaskLabelError::Empty);
        }
        if value.contains(['\n', '\r']) {
            return Err(TaskLabelError::Multiline);
        }
        Ok(Self(value.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TaskLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerDurations {
    pub focus: Duration,
    pub rest: Duration,
}

impl Default for TimerDurations {
    fn default() -> Self {
        Self {
            focus: DEFAULT_FOCUS_DURATION,
            rest: DEFAULT_BREAK_DURATION,
        }
    }
}

/// The mutable timer record. `remaining_seconds` is zero whenever the phase is idle and
/// `task_label` is present exactly while the phase is focus.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerState {
    phase: TimerPhase,
    remaining_seconds: f64,
    task_label: Option<TaskLabel>,
    last_tick_at: Option<Instant>,
}

impl Default for TimerState {
    fn default() -> Self {
        Self {
            phase: TimerPhase::Idle,
            remaining_seconds: 0.,
            task_label: None,
            last_tick_at: None,
        }
    }
}

impl TimerState {
    fn start_focus(&mut self, label: TaskLabel, durations: &TimerDurations, now: Instant) {
        self.phase = TimerPhase::Focus;
        self.remaining_seconds = durations.focus.as_secs_f64();
        self.task_label = Some(label);
        self.last_tick_at = Some(now);
    }

    fn start_break(&mut self, durations: &TimerDurations, now: Instant) {
        self.phase = TimerPhase::Break;
        self.remaining_seconds = durations.rest.as_secs_f64();
        self.task_label = None;
        self.last_tick_at = Some(now);
    }

    fn stop(&mut self) {
        self.phase = TimerPhase::Idle;
        self.remaining_seconds = 0.;
        self.task_label = None;
    }

    /// Advances the countdown by the time elapsed since the previous reference point. Returns the
    /// phase that was left, if the countdown ran out.
    fn tick(&mut self, durations: &TimerDurations, now: Instant) -> Option<TimerPhase> {
        if self.phase == TimerPhase::Idle {
            return None;
        }

        let elapsed = match self.last_tick_at.replace(now) {
            // Instants never go backwards, but saturate anyway instead of adding time.
            Some(previous) => now.saturating_duration_since(previous).as_secs_f64(),
            None => 0.,
        };

        self.remaining_seconds = (self.remaining_seconds - elapsed).max(0.);
        if self.remaining_seconds > 0. {
            return None;
        }

        let finished = self.phase;
        match finished {
            TimerPhase::Focus => {
                self.phase = TimerPhase::Break;
                self.remaining_seconds = durations.rest.as_secs_f64();
                self.task_label = None;
            }
            TimerPhase::Break => self.stop(),
            TimerPhase::Idle => {}
        }
        Some(finished)
    }

    fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            phase: self.phase,
            remaining_seconds: self.remaining_seconds.floor() as u64,
            task_label: self.task_label.clone(),
        }
    }
}

/// Consistent copy of the timer taken under its lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub phase: TimerPhase,
    /// Whole seconds left, rounded down.
    pub remaining_seconds: u64,
    pub task_label: Option<TaskLabel>,
}

impl TimerSnapshot {
    pub fn idle() -> Self {
        Self {
            phase: TimerPhase::Idle,
            remaining_seconds: 0,
            task_label: None,
        }
    }
}

/// Shared handle to the timer. Every operation runs inside one critical section over the whole
/// [TimerState] and none of them waits on anything but that lock.
#[derive(Debug, Clone, Default)]
pub struct FocusTimer {
    state: Arc<Mutex<TimerState>>,
    durations: TimerDurations,
}

impl FocusTimer {
    pub fn new(durations: TimerDurations) -> Self {
        Self {
            state: Arc::default(),
            durations,
        }
    }

    pub fn durations(&self) -> TimerDurations {
        self.durations
    }

    fn lock(&self) -> MutexGuard<'_, TimerState> {
        // The state is consistent after every mutation, a panic elsewhere can't leave it torn.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn start_focus(&self, label: TaskLabel) {
        self.start_focus_at(label, Instant::now())
    }

    pub fn start_focus_at(&self, label: TaskLabel, now: Instant) {
        info!("Starting focus on {label}");
        self.lock().start_focus(label, &self.durations, now);
    }

    pub fn start_break(&self) {
        self.start_break_at(Instant::now())
    }

    pub fn start_break_at(&self, now: Instant) {
        info!("Starting break");
        self.lock().start_break(&self.durations, now);
    }

    pub fn stop(&self) {
        info!("Stopping timer");
        self.lock().stop();
    }

    pub fn tick(&self) -> Option<TimerPhase> {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&self, now: Instant) -> Option<TimerPhase> {
        let finished = self.lock().tick(&self.durations, now);
        if let Some(phase) = finished {
            info!("Timer finished {phase} phase");
        }
        finished
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        self.lock().snapshot()
    }
}
