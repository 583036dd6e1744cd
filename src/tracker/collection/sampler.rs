use std::sync::Arc;

use tracing::{debug, instrument};

use crate::window_api::{ActiveWindowData, WindowManager};

/// Identity used whenever the host couldn't tell what is in the foreground.
pub const UNKNOWN: &str = "Unknown";

/// Single sampled snapshot of the foreground window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityObservation {
    pub process_id: Option<u32>,
    pub window_title: Arc<str>,
    pub process_name: Arc<str>,
}

impl ActivityObservation {
    pub fn unknown() -> Self {
        Self {
            process_id: None,
            window_title: UNKNOWN.into(),
            process_name: UNKNOWN.into(),
        }
    }
}

impl From<ActiveWindowData> for ActivityObservation {
    fn from(
        ActiveWindowData {
            process_id,
            window_title,
            process_name,
        }: ActiveWindowData,
    ) -> Self {
        Self {
            process_id,
            window_title,
            process_name,
        }
    }
}

/// Polls the host for the foreground window. Host failures are part of the data: they come out
/// as [ActivityObservation::unknown] instead of errors.
pub struct ActivitySampler {
    producer: Box<dyn WindowManager>,
}

impl ActivitySampler {
    pub fn new(producer: Box<dyn WindowManager>) -> Self {
        Self { producer }
    }

    #[instrument(skip(self), level = "trace")]
    pub fn sample(&mut self) -> ActivityObservation {
        match self.producer.get_active_window_data() {
            Ok(data) => data.into(),
            Err(e) => {
                // Happens on lock screens, during window switches, and for short lived processes.
                debug!("Foreground window query failed {e:?}");
                ActivityObservation::unknown()
            }
        }
    }
}
