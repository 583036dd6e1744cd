use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::utils::clock::Clock;

use super::{
    collection::{change::ChangeDetector, sampler::ActivitySampler},
    control::TrackerHandle,
    status::{StatusSink, TrackerStatus},
    storage::{
        entities::LogEntry,
        partition_storage::{LogStorage, PartitionHandle},
    },
};

/// The loop that ticks the timer, samples the foreground window and appends transitions to the
/// partition of the current day. It is the only writer of partitions.
pub struct ActivityLoop<S: LogStorage> {
    sampler: ActivitySampler,
    storage: S,
    partition: Option<S::Partition>,
    detector: ChangeDetector,
    handle: TrackerHandle,
    status: Box<dyn StatusSink>,
    interval: Duration,
    clock: Box<dyn Clock>,
}

impl<S> ActivityLoop<S>
where
    S: LogStorage + Send + Sync,
{
    pub fn new(
        sampler: ActivitySampler,
        storage: S,
        handle: TrackerHandle,
        status: Box<dyn StatusSink>,
        interval: Duration,
        clock: Box<dyn Clock>,
    ) -> Self {
        let detector = ChangeDetector::new(handle.snapshot().phase);
        Self {
            sampler,
            storage,
            partition: None,
            detector,
            handle,
            status,
            interval,
            clock,
        }
    }

    /// Executes the loop until a stop is requested. Failures of a single cycle are logged and the
    /// next cycle runs as usual.
    pub async fn run(mut self) -> Result<()> {
        info!("Activity loop started with interval {:?}", self.interval);
        let shutdown = self.handle.shutdown_token().clone();
        let mut cycle_point = self.clock.instant();
        while !shutdown.is_cancelled() {
            cycle_point += self.interval;

            self.cycle().instrument(info_span!("Cycle")).await;

            tokio::select! {
                // A stop during the sleep ends the loop right away, nothing is written after it.
                _ = shutdown.cancelled() => break,
                _ = self.clock.sleep_until(cycle_point) => ()
            }
        }
        info!("Activity loop stopped");
        Ok(())
    }

    async fn cycle(&mut self) {
        self.handle.timer().tick_at(self.clock.instant());

        let paused = self.handle.is_paused();
        let status = TrackerStatus {
            timer: self.handle.snapshot(),
            paused,
        };
        if let Err(e) = self.status.refresh(&status) {
            warn!("Failed to refresh status {e:?}");
        }

        if paused {
            return;
        }

        if let Err(e) = self.record(self.clock.time()).await {
            error!("Encountered an error during recording {e:?}");
        }
    }

    async fn record(&mut self, now: DateTime<Local>) -> Result<()> {
        self.move_partition(now.date_naive()).await?;

        let observation = self.sampler.sample();
        let timer = self.handle.snapshot();
        if !self.detector.is_due(&observation, timer.phase) {
            return Ok(());
        }

        let entry = LogEntry {
            timestamp: now.naive_local(),
            process_name: observation.process_name.clone(),
            window_title: observation.window_title.clone(),
            process_id: observation.process_id,
            timer_phase: timer.phase,
            task_label: timer.task_label.map(|label| label.as_str().into()),
        };
        debug!("Appending {entry:?}");

        if let Some(partition) = self.partition.as_mut() {
            partition.append(&entry).await?;
            self.detector.logged(&observation, timer.phase);
            info!(
                "Logged [{}] {} - {} ({})",
                entry.timestamp, entry.process_name, entry.window_title, entry.timer_phase
            );
        }
        Ok(())
    }

    /// Makes the partition of `date` current, initializing it first when the date moved on.
    async fn move_partition(&mut self, date: NaiveDate) -> Result<()> {
        match self.partition.take() {
            Some(partition) if partition.date() == date => {
                self.partition = Some(partition);
            }
            stale => {
                if let Some(stale) = stale {
                    info!("Date changed, switching partition {} -> {date}", stale.date());
                }
                self.partition = Some(self.storage.ensure_partition_for(date).await?);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
    use tempfile::tempdir;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    use crate::{
        tracker::{
            collection::sampler::ActivitySampler,
            control::TrackerHandle,
            status::{StatusSink, TrackerStatus},
            storage::partition_storage::{CsvLogStorage, LogStorage},
            timer::{FocusTimer, TimerDurations, TimerPhase},
        },
        utils::{clock::Clock, logging::TEST_LOGGING},
        window_api::{ActiveWindowData, MockWindowManager},
    };

    use super::ActivityLoop;

    const TEST_START: NaiveDateTime = NaiveDateTime::new(
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
        NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
    );

    /// Wall-clock time that follows tokio's (paused) clock from a fixed local starting point.
    #[derive(Clone)]
    struct TestClock {
        start_time: DateTime<Local>,
        reference: Instant,
    }

    impl TestClock {
        fn starting_at(start: NaiveDateTime) -> Self {
            Self {
                start_time: Local.from_local_datetime(&start).earliest().unwrap(),
                reference: Instant::now(),
            }
        }
    }

    #[async_trait]
    impl Clock for TestClock {
        fn time(&self) -> DateTime<Local> {
            self.start_time + self.reference.elapsed()
        }

        fn instant(&self) -> Instant {
            Instant::now()
        }

        async fn sleep_until(&self, instant: Instant) {
            tokio::time::sleep_until(instant).await;
        }
    }

    #[derive(Clone, Default)]
    struct RecordingStatus(Arc<Mutex<Vec<TrackerStatus>>>);

    impl StatusSink for RecordingStatus {
        fn refresh(&mut self, status: &TrackerStatus) -> Result<()> {
            self.0.lock().unwrap().push(status.clone());
            Err(anyhow!("tray is gone"))
        }
    }

    fn window(title: &str) -> ActiveWindowData {
        ActiveWindowData {
            process_id: Some(10),
            window_title: title.into(),
            process_name: "app".into(),
        }
    }

    /// Manager that plays back `titles` once per sample and then repeats the last one.
    fn scripted_manager(titles: &[&str]) -> MockWindowManager {
        let mut titles = titles
            .iter()
            .map(|title| window(title))
            .collect::<Vec<_>>()
            .into_iter();
        let mut last = None;
        let mut manager = MockWindowManager::new();
        manager.expect_get_active_window_data().returning(move || {
            if let Some(next) = titles.next() {
                last = Some(next);
            }
            last.clone().ok_or_else(|| anyhow!("nothing scripted"))
        });
        manager
    }

    fn handle(durations: TimerDurations) -> TrackerHandle {
        TrackerHandle::new(FocusTimer::new(durations), CancellationToken::new())
    }

    fn create_loop(
        manager: MockWindowManager,
        storage: Arc<CsvLogStorage>,
        handle: &TrackerHandle,
        status: RecordingStatus,
        clock: TestClock,
    ) -> ActivityLoop<Arc<CsvLogStorage>> {
        ActivityLoop::new(
            ActivitySampler::new(Box::new(manager)),
            storage,
            handle.clone(),
            Box::new(status),
            Duration::from_secs(1),
            Box::new(clock),
        )
    }

    /// Lets the loop run `cycles` cycles, then stops it and waits for it to finish.
    async fn run_cycles(
        activity_loop: ActivityLoop<Arc<CsvLogStorage>>,
        handle: &TrackerHandle,
        cycles: u64,
    ) -> Result<()> {
        let task = tokio::spawn(activity_loop.run());
        tokio::time::sleep(Duration::from_millis(cycles * 1000 - 500)).await;
        handle.request_stop();
        task.await?
    }

    #[tokio::test(start_paused = true)]
    async fn identical_windows_are_logged_once() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let storage = Arc::new(CsvLogStorage::new(dir.path().to_owned())?);
        let handle = handle(TimerDurations::default());
        let status = RecordingStatus::default();

        let activity_loop = create_loop(
            scripted_manager(&["A", "A", "B"]),
            storage.clone(),
            &handle,
            status.clone(),
            TestClock::starting_at(TEST_START),
        );
        run_cycles(activity_loop, &handle, 5).await?;

        let entries = storage.read_partition(TEST_START.date()).await?.unwrap().entries;
        let titles = entries
            .iter()
            .map(|v| &*v.window_title)
            .collect::<Vec<_>>();
        assert_eq!(titles, vec!["A", "B"]);
        assert!(entries.iter().all(|v| v.timer_phase == TimerPhase::Idle));
        assert_eq!(entries[1].timestamp - entries[0].timestamp, chrono::Duration::seconds(2));

        // Refresh failures never stopped a cycle.
        assert_eq!(status.0.lock().unwrap().len(), 5);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn phase_changes_are_logged_with_the_task() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let storage = Arc::new(CsvLogStorage::new(dir.path().to_owned())?);
        let handle = handle(TimerDurations {
            focus: Duration::from_secs(3),
            rest: Duration::from_secs(2),
        });

        handle.request_start_focus("TICKET-1")?;
        let activity_loop = create_loop(
            scripted_manager(&["editor"]),
            storage.clone(),
            &handle,
            RecordingStatus::default(),
            TestClock::starting_at(TEST_START),
        );
        run_cycles(activity_loop, &handle, 8).await?;

        let entries = storage.read_partition(TEST_START.date()).await?.unwrap().entries;
        let phases = entries
            .iter()
            .map(|v| (v.timer_phase, v.task_label.as_deref().map(str::to_string)))
            .collect::<Vec<_>>();
        assert_eq!(
            phases,
            vec![
                (TimerPhase::Focus, Some("TICKET-1".to_string())),
                (TimerPhase::Break, None),
                (TimerPhase::Idle, None),
            ]
        );
        assert!(entries.iter().all(|v| &*v.window_title == "editor"));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn paused_logging_still_advances_timer() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let storage = Arc::new(CsvLogStorage::new(dir.path().to_owned())?);
        let handle = handle(TimerDurations {
            focus: Duration::from_secs(2),
            rest: Duration::from_secs(60),
        });
        handle.request_start_focus("quiet")?;
        handle.request_toggle_pause();

        let activity_loop = create_loop(
            scripted_manager(&["A", "B", "C", "D", "E"]),
            storage.clone(),
            &handle,
            RecordingStatus::default(),
            TestClock::starting_at(TEST_START),
        );
        let task = tokio::spawn(activity_loop.run());
        tokio::time::sleep(Duration::from_millis(4500)).await;

        assert_eq!(handle.snapshot().phase, TimerPhase::Break);
        assert_eq!(storage.read_partition(TEST_START.date()).await?, None);

        handle.request_stop();
        task.await??;
        assert_eq!(storage.read_partition(TEST_START.date()).await?, None);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn date_rollover_switches_partition() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let storage = Arc::new(CsvLogStorage::new(dir.path().to_owned())?);
        let handle = handle(TimerDurations::default());
        let before_midnight = NaiveDateTime::new(
            TEST_START.date(),
            NaiveTime::from_hms_opt(23, 59, 58).unwrap(),
        );

        let activity_loop = create_loop(
            scripted_manager(&["late", "late", "late", "early"]),
            storage.clone(),
            &handle,
            RecordingStatus::default(),
            TestClock::starting_at(before_midnight),
        );
        run_cycles(activity_loop, &handle, 5).await?;

        let next_day = TEST_START.date().succ_opt().unwrap();
        let old = storage.read_partition(TEST_START.date()).await?.unwrap().entries;
        let new = storage.read_partition(next_day).await?.unwrap().entries;

        assert_eq!(old.len(), 1);
        assert_eq!(&*old[0].window_title, "late");
        assert_eq!(new.len(), 1);
        assert_eq!(&*new[0].window_title, "early");
        assert_eq!(new[0].timestamp.date(), next_day);
        assert!(std::fs::read_to_string(storage.partition_path(next_day))?
            .trim_start_matches('\u{feff}')
            .starts_with("Timestamp,"));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn storage_failures_do_not_stop_the_loop() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let storage = Arc::new(CsvLogStorage::new(dir.path().join("activity"))?);
        // A directory where the partition should be makes every append fail.
        std::fs::create_dir(storage.partition_path(TEST_START.date()))?;

        let handle = handle(TimerDurations::default());
        let status = RecordingStatus::default();
        let activity_loop = create_loop(
            scripted_manager(&["A", "B"]),
            storage.clone(),
            &handle,
            status.clone(),
            TestClock::starting_at(TEST_START),
        );
        run_cycles(activity_loop, &handle, 4).await?;

        assert_eq!(status.0.lock().unwrap().len(), 4);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn failed_append_is_retried_once_storage_recovers() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let storage = Arc::new(CsvLogStorage::new(dir.path().join("activity"))?);
        let path = storage.partition_path(TEST_START.date());
        let aside = dir.path().join("aside.csv");

        let handle = handle(TimerDurations::default());
        let activity_loop = create_loop(
            scripted_manager(&["A", "B"]),
            storage.clone(),
            &handle,
            RecordingStatus::default(),
            TestClock::starting_at(TEST_START),
        );

        // Between 0.5 s and 1.5 s a directory takes the place of the partition, so the append of
        // the second cycle fails.
        let outage = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            std::fs::rename(&path, &aside)?;
            std::fs::create_dir(&path)?;
            tokio::time::sleep(Duration::from_secs(1)).await;
            std::fs::remove_dir(&path)?;
            std::fs::rename(&aside, &path)?;
            anyhow::Ok(())
        });
        run_cycles(activity_loop, &handle, 5).await?;
        outage.await??;

        let entries = storage.read_partition(TEST_START.date()).await?.unwrap().entries;
        let rows = entries
            .iter()
            .map(|v| (&*v.window_title, (v.timestamp - TEST_START).num_seconds()))
            .collect::<Vec<_>>();
        assert_eq!(rows, vec![("A", 0), ("B", 2)]);
        Ok(())
    }
}
