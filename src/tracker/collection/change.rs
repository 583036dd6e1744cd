use std::sync::Arc;

use crate::tracker::timer::TimerPhase;

use super::sampler::ActivityObservation;

/// A row is due when a non-empty window title differs from the last logged one, or when the timer
/// phase moved. Anything else would duplicate the previous row and distort dwell times, which are
/// measured as the gap between consecutive rows.
pub fn should_log(
    previous_title: Option<&str>,
    previous_phase: TimerPhase,
    observation: &ActivityObservation,
    current_phase: TimerPhase,
) -> bool {
    let title_changed =
        !observation.window_title.is_empty() && Some(&*observation.window_title) != previous_title;
    title_changed || current_phase != previous_phase
}

/// Remembers what the last emitted row looked like.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    last_title: Option<Arc<str>>,
    last_phase: TimerPhase,
}

impl ChangeDetector {
    /// Starts with no logged title, so the first non-empty observation is always due.
    pub fn new(initial_phase: TimerPhase) -> Self {
        Self {
            last_title: None,
            last_phase: initial_phase,
        }
    }

    pub fn is_due(&self, observation: &ActivityObservation, current_phase: TimerPhase) -> bool {
        should_log(
            self.last_title.as_deref(),
            self.last_phase,
            observation,
            current_phase,
        )
    }

    /// Records the row that was just written.
    pub fn logged(&mut self, observation: &ActivityObservation, phase: TimerPhase) {
        self.last_title = Some(observation.window_title.clone());
        self.last_phase = phase;
    }
}
