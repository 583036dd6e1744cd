use std::{collections::HashMap, sync::Arc};

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::tracker::{
    storage::{entities::LogEntry, partition_storage::LogStorage},
    timer::TimerPhase,
};

/// A row together with how long it stayed the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DwellRow {
    pub entry: LogEntry,
    pub dwell: Duration,
}

/// Sorts rows by timestamp and gives every row the time until the next one. The final row has no
/// successor and gets zero.
pub fn dwell_times(mut entries: Vec<LogEntry>) -> Vec<DwellRow> {
    // Stable, rows written within the same second keep their order.
    entries.sort_by_key(|v| v.timestamp);

    let next_timestamps = entries
        .iter()
        .skip(1)
        .map(|v| Some(v.timestamp))
        .chain([None])
        .collect::<Vec<_>>();

    entries
        .into_iter()
        .zip(next_timestamps)
        .map(|(entry, next)| DwellRow {
            dwell: next.map_or_else(Duration::zero, |next| next - entry.timestamp),
            entry,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowUsage {
    pub process_name: Arc<str>,
    pub window_title: Arc<str>,
    #[serde(with = "duration_ser")]
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessUsage {
    pub process_name: Arc<str>,
    #[serde(with = "duration_ser")]
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseUsage {
    pub phase: TimerPhase,
    #[serde(with = "duration_ser")]
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskUsage {
    pub task_label: Arc<str>,
    #[serde(with = "duration_ser")]
    pub duration: Duration,
}

/// Usage of one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageReport {
    /// Per window, sorted by application and then by longest use.
    pub windows: Vec<WindowUsage>,
    /// Per application, longest use first.
    pub processes: Vec<ProcessUsage>,
    pub phases: Vec<PhaseUsage>,
    /// Focus time per task label, longest first.
    pub tasks: Vec<TaskUsage>,
    #[serde(with = "duration_ser")]
    pub total: Duration,
    pub skipped_rows: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum NoDataReason {
    #[error("the log file doesn't exist")]
    MissingPartition,
    #[error("the log file is empty")]
    EmptyPartition,
    #[error("the log file couldn't be read")]
    UnreadablePartition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisOutcome {
    NoData(NoDataReason),
    Report(UsageReport),
}

/// Reads the partition of `date` and aggregates it. Nothing here fails: a missing, unreadable or
/// empty partition is reported as [AnalysisOutcome::NoData].
pub async fn analyze_partition(storage: &impl LogStorage, date: NaiveDate) -> AnalysisOutcome {
    match storage.read_partition(date).await {
        Ok(Some(contents)) => analyze_entries(contents.entries, contents.skipped_rows),
        Ok(None) => AnalysisOutcome::NoData(NoDataReason::MissingPartition),
        Err(e) => {
            warn!("Failed to read partition of {date} {e:?}");
            AnalysisOutcome::NoData(NoDataReason::UnreadablePartition)
        }
    }
}

pub fn analyze_entries(entries: Vec<LogEntry>, skipped_rows: usize) -> AnalysisOutcome {
    if entries.is_empty() {
        return AnalysisOutcome::NoData(NoDataReason::EmptyPartition);
    }

    let rows = dwell_times(entries);

    let mut windows = HashMap::<(Arc<str>, Arc<str>), Duration>::new();
    let mut phases = HashMap::<TimerPhase, Duration>::new();
    let mut tasks = HashMap::<Arc<str>, Duration>::new();
    let mut total = Duration::zero();

    for DwellRow { entry, dwell } in rows {
        total += dwell;
        *phases.entry(entry.timer_phase).or_insert_with(Duration::zero) += dwell;
        if let (TimerPhase::Focus, Some(label)) = (entry.timer_phase, &entry.task_label) {
            *tasks.entry(label.clone()).or_insert_with(Duration::zero) += dwell;
        }
        *windows
            .entry((entry.process_name, entry.window_title))
            .or_insert_with(Duration::zero) += dwell;
    }

    let mut processes = HashMap::<Arc<str>, Duration>::new();
    for ((process_name, _), duration) in &windows {
        *processes
            .entry(process_name.clone())
            .or_insert_with(Duration::zero) += *duration;
    }

    let mut windows = windows
        .into_iter()
        .map(|((process_name, window_title), duration)| WindowUsage {
            process_name,
            window_title,
            duration,
        })
        .collect::<Vec<_>>();
    windows.sort_by(|a, b| {
        a.process_name
            .cmp(&b.process_name)
            .then(b.duration.cmp(&a.duration))
            .then(a.window_title.cmp(&b.window_title))
    });

    let mut processes = processes
        .into_iter()
        .map(|(process_name, duration)| ProcessUsage {
            process_name,
            duration,
        })
        .collect::<Vec<_>>();
    processes.sort_by(|a, b| {
        b.duration
            .cmp(&a.duration)
            .then(a.process_name.cmp(&b.process_name))
    });

    let mut phases = phases
        .into_iter()
        .map(|(phase, duration)| PhaseUsage { phase, duration })
        .collect::<Vec<_>>();
    phases.sort_by_key(|v| v.phase);

    let mut tasks = tasks
        .into_iter()
        .map(|(task_label, duration)| TaskUsage {
            task_label,
            duration,
        })
        .collect::<Vec<_>>();
    tasks.sort_by(|a, b| {
        b.duration
            .cmp(&a.duration)
            .then(a.task_label.cmp(&b.task_label))
    });

    AnalysisOutcome::Report(UsageReport {
        windows,
        processes,
        phases,
        tasks,
        total,
        skipped_rows,
    })
}

mod duration_ser {
    use chrono::Duration;
    use serde::Serializer;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(duration.num_seconds())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
    use tempfile::tempdir;

    use crate::tracker::{
        storage::{
            entities::LogEntry,
            partition_storage::{CsvLogStorage, LogStorage, PartitionHandle},
        },
        timer::TimerPhase,
    };

    use super::{
        analyze_entries, analyze_partition, dwell_times, AnalysisOutcome, NoDataReason,
        PhaseUsage, ProcessUsage, TaskUsage,
    };

    const TEST_DATE: NaiveDate = NaiveDate::from_ymd_opt(2024, 4, 5).unwrap();
    const TEST_DATE_TIME: NaiveDateTime =
        NaiveDateTime::new(TEST_DATE, NaiveTime::from_hms_opt(12, 0, 0).unwrap());

    fn entry(process: &str, title: &str, offset: i64) -> LogEntry {
        LogEntry {
            timestamp: TEST_DATE_TIME + Duration::seconds(offset),
            process_name: process.into(),
            window_title: title.into(),
            process_id: None,
            timer_phase: TimerPhase::Idle,
            task_label: None,
        }
    }

    fn report(outcome: AnalysisOutcome) -> super::UsageReport {
        match outcome {
            AnalysisOutcome::Report(report) => report,
            AnalysisOutcome::NoData(reason) => panic!("Expected a report, got {reason}"),
        }
    }

    #[test]
    fn dwell_is_gap_to_next_row() {
        let rows = dwell_times(vec![
            entry("app", "A", 0),
            entry("app", "B", 40),
            entry("app", "A", 100),
        ]);
        let dwell = rows.iter().map(|v| v.dwell.num_seconds()).collect::<Vec<_>>();
        assert_eq!(dwell, vec![40, 60, 0]);

        let report = report(analyze_entries(rows.into_iter().map(|v| v.entry).collect(), 0));
        let a = report
            .windows
            .iter()
            .find(|v| &*v.window_title == "A")
            .unwrap();
        assert_eq!(a.duration, Duration::seconds(40));
        assert_eq!(report.total, Duration::seconds(100));
    }

    #[test]
    fn rows_are_sorted_before_measuring() {
        let rows = dwell_times(vec![
            entry("app", "late", 30),
            entry("app", "early", 0),
            entry("app", "middle", 10),
        ]);
        let titles = rows
            .iter()
            .map(|v| (&*v.entry.window_title, v.dwell.num_seconds()))
            .collect::<Vec<_>>();
        assert_eq!(titles, vec![("early", 10), ("middle", 20), ("late", 0)]);
    }

    #[test]
    fn processes_sum_their_windows() {
        let report = report(analyze_entries(
            vec![
                entry("Code.exe", "main.rs", 0),
                entry("firefox", "docs", 60),
                entry("Code.exe", "lib.rs", 90),
                entry("Code.exe", "main.rs", 300),
                entry("firefox", "docs", 320),
            ],
            1,
        ));

        assert_eq!(
            report.processes,
            vec![
                ProcessUsage {
                    process_name: "Code.exe".into(),
                    duration: Duration::seconds(290),
                },
                ProcessUsage {
                    process_name: "firefox".into(),
                    duration: Duration::seconds(30),
                },
            ]
        );

        let windows = report
            .windows
            .iter()
            .map(|v| (&*v.process_name, &*v.window_title, v.duration.num_seconds()))
            .collect::<Vec<_>>();
        assert_eq!(
            windows,
            vec![
                ("Code.exe", "lib.rs", 210),
                ("Code.exe", "main.rs", 80),
                ("firefox", "docs", 30),
            ]
        );
        assert_eq!(report.skipped_rows, 1);
    }

    #[test]
    fn focus_time_is_grouped_by_task() {
        let focus = |title: &str, task: &str, offset| LogEntry {
            timer_phase: TimerPhase::Focus,
            task_label: Some(task.into()),
            ..entry("Code.exe", title, offset)
        };
        let report = report(analyze_entries(
            vec![
                focus("main.rs", "TICKET-1", 0),
                focus("review", "TICKET-2", 600),
                focus("main.rs", "TICKET-1", 700),
                LogEntry {
                    timer_phase: TimerPhase::Break,
                    ..entry("firefox", "news", 1000)
                },
                entry("firefox", "news", 1300),
            ],
            0,
        ));

        assert_eq!(
            report.tasks,
            vec![
                TaskUsage {
                    task_label: "TICKET-1".into(),
                    duration: Duration::seconds(900),
                },
                TaskUsage {
                    task_label: "TICKET-2".into(),
                    duration: Duration::seconds(100),
                },
            ]
        );
        assert_eq!(
            report.phases,
            vec![
                PhaseUsage {
                    phase: TimerPhase::Idle,
                    duration: Duration::zero(),
                },
                PhaseUsage {
                    phase: TimerPhase::Focus,
                    duration: Duration::seconds(1000),
                },
                PhaseUsage {
                    phase: TimerPhase::Break,
                    duration: Duration::seconds(300),
                },
            ]
        );
    }

    #[test]
    fn no_rows_is_no_data() {
        assert_eq!(
            analyze_entries(vec![], 3),
            AnalysisOutcome::NoData(NoDataReason::EmptyPartition)
        );
    }

    #[tokio::test]
    async fn partitions_are_analyzed_from_disk() -> Result<()> {
        let dir = tempdir()?;
        let storage = CsvLogStorage::new(dir.path().to_owned())?;

        assert_eq!(
            analyze_partition(&storage, TEST_DATE).await,
            AnalysisOutcome::NoData(NoDataReason::MissingPartition)
        );

        let mut partition = storage.ensure_partition_for(TEST_DATE).await?;
        assert_eq!(
            analyze_partition(&storage, TEST_DATE).await,
            AnalysisOutcome::NoData(NoDataReason::EmptyPartition)
        );

        partition.append(&entry("app", "A", 0)).await?;
        partition.append(&entry("app", "B", 5)).await?;
        let report = report(analyze_partition(&storage, TEST_DATE).await);
        assert_eq!(report.total, Duration::seconds(5));
        Ok(())
    }
}
