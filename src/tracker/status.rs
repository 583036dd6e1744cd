use std::fmt::Display;

use anyhow::Result;
use tracing::trace;

use super::timer::{TimerPhase, TimerSnapshot};

/// What the tray tooltip would show: timer phase, countdown and whether logging is paused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerStatus {
    pub timer: TimerSnapshot,
    pub paused: bool,
}

impl Display for TrackerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "State: {}", self.timer.phase)?;
        if self.timer.phase != TimerPhase::Idle {
            let remaining = self.timer.remaining_seconds;
            write!(f, " ({:02}:{:02})", remaining / 60, remaining % 60)?;
        }
        if self.paused {
            write!(f, " [LOG PAUSED]")?;
        }
        Ok(())
    }
}

/// Receives the status once per cycle. Failing here never interrupts the cycle.
pub trait StatusSink: Send {
    fn refresh(&mut self, status: &TrackerStatus) -> Result<()>;
}

/// Writes the status into diagnostic logs only.
pub struct TracingStatus;

impl StatusSink for TracingStatus {
    fn refresh(&mut self, status: &TrackerStatus) -> Result<()> {
        trace!("{status}");
        Ok(())
    }
}

/// Prints the status to the terminal whenever the phase or the pause flag changes. The countdown
/// alone doesn't count as a change, otherwise the console would scroll every second.
#[derive(Default)]
pub struct ConsoleStatus {
    last: Option<(TimerPhase, bool)>,
}

impl StatusSink for ConsoleStatus {
    fn refresh(&mut self, status: &TrackerStatus) -> Result<()> {
        let key = (status.timer.phase, status.paused);
        if self.last.replace(key) != Some(key) {
            println!("{}", ansi_term::Colour::Cyan.paint(status.to_string()));
        }
        Ok(())
    }
}
