use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::timer::{FocusTimer, TaskLabel, TaskLabelError, TimerSnapshot};

/// Label used when interactive entry produced nothing usable.
pub const DEFAULT_TASK_LABEL: &str = "Default Task";

/// Control surface of a running tracker. Owned by the composition root and cloned into whatever
/// triggers actions (console, hotkeys, UI). The timer lock and the two flags are the only state
/// shared with the run loop; no action here waits on I/O.
#[derive(Debug, Clone)]
pub struct TrackerHandle {
    timer: FocusTimer,
    paused: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl TrackerHandle {
    pub fn new(timer: FocusTimer, shutdown: CancellationToken) -> Self {
        Self {
            timer,
            paused: Arc::new(AtomicBool::new(false)),
            shutdown,
        }
    }

    pub fn timer(&self) -> &FocusTimer {
        &self.timer
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        self.timer.snapshot()
    }

    /// Starts a focus session. An unusable label is rejected before anything changes.
    pub fn request_start_focus(&self, label: &str) -> Result<(), TaskLabelError> {
        let label = TaskLabel::parse(label)?;
        self.timer.start_focus(label);
        Ok(())
    }

    /// Starts a focus session once `label` resolves, without holding up the caller. Used for
    /// interactive entry: the run loop keeps cycling while the user types.
    pub fn start_focus_when<F>(&self, label: F) -> JoinHandle<()>
    where
        F: Future<Output = Option<String>> + Send + 'static,
    {
        let timer = self.timer.clone();
        tokio::spawn(async move {
            let label = label.await.as_deref().map(TaskLabel::parse);
            let label = match label {
                Some(Ok(label)) => label,
                Some(Err(e)) => {
                    warn!("Falling back to {DEFAULT_TASK_LABEL:?}: {e}");
                    default_label()
                }
                None => {
                    warn!("Task label entry was abandoned, using {DEFAULT_TASK_LABEL:?}");
                    default_label()
                }
            };
            timer.start_focus(label);
        })
    }

    pub fn request_start_break(&self) {
        self.timer.start_break();
    }

    pub fn request_stop_timer(&self) {
        self.timer.stop();
    }

    /// Asks the run loop to finish. The loop notices at the latest after its current sleep and
    /// writes nothing afterwards. The timer is stopped as well.
    pub fn request_stop(&self) {
        info!("Stop requested");
        self.shutdown.cancel();
        self.timer.stop();
    }

    /// Flips activity logging on or off and returns whether it is now paused. The timer keeps
    /// running either way.
    pub fn request_toggle_pause(&self) -> bool {
        let paused = !self.paused.fetch_xor(true, Ordering::SeqCst);
        if paused {
            info!("Activity logging paused");
        } else {
            info!("Activity logging resumed");
        }
        paused
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}

fn default_label() -> TaskLabel {
    TaskLabel(DEFAULT_TASK_LABEL.into())
}
