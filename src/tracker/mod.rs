//! The tracking core: focus timer, foreground window sampling, transition detection and the
//! per-day activity log, composed by [spawn_tracker].

use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use collection::sampler::ActivitySampler;
use control::TrackerHandle;
use run_loop::ActivityLoop;
use status::StatusSink;
use storage::partition_storage::CsvLogStorage;
use timer::{FocusTimer, TimerDurations};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::{utils::clock::Clock, window_api::WindowManager};

pub mod collection;
pub mod control;
pub mod run_loop;
pub mod shutdown;
pub mod status;
pub mod storage;
pub mod timer;

pub const DEFAULT_COLLECTION_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Directory holding the partitions.
    pub activity_dir: PathBuf,
    pub interval: Duration,
    pub durations: TimerDurations,
}

impl TrackerConfig {
    pub fn new(activity_dir: PathBuf) -> Self {
        Self {
            activity_dir,
            interval: DEFAULT_COLLECTION_INTERVAL,
            durations: TimerDurations::default(),
        }
    }
}

/// A tracker whose loop runs on its own task.
pub struct Tracker {
    pub handle: TrackerHandle,
    task: JoinHandle<Result<()>>,
}

impl Tracker {
    /// Waits until the loop finished, which happens after [TrackerHandle::request_stop].
    pub async fn join(self) -> Result<()> {
        self.task.await?.inspect_err(|e| error!("Activity loop got an error {e:?}"))
    }
}

/// Represents the starting point for tracking. Builds the timer, the control handle and the run
/// loop, and spawns the loop.
pub fn spawn_tracker(
    config: TrackerConfig,
    manager: impl WindowManager + 'static,
    status: impl StatusSink + 'static,
    clock: impl Clock,
) -> Result<Tracker> {
    let storage = CsvLogStorage::new(config.activity_dir)?;
    let handle = TrackerHandle::new(FocusTimer::new(config.durations), CancellationToken::new());

    let activity_loop = ActivityLoop::new(
        ActivitySampler::new(Box::new(manager)),
        storage,
        handle.clone(),
        Box::new(status),
        config.interval,
        Box::new(clock),
    );

    Ok(Tracker {
        handle,
        task: tokio::spawn(activity_loop.run()),
    })
}
