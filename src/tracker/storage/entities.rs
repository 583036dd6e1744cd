use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::tracker::timer::TimerPhase;

/// Column names of a partition, in order.
pub const PARTITION_HEADER: [&str; 6] = [
    "Timestamp",
    "ProcessName",
    "WindowTitle",
    "ProcessId",
    "TimerPhase",
    "TaskLabel",
];

/// One row of a partition. Rows are never rewritten after they were appended.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct LogEntry {
    #[serde(rename = "Timestamp", with = "timestamp_ser")]
    pub timestamp: NaiveDateTime,
    #[serde(rename = "ProcessName")]
    pub process_name: Arc<str>,
    #[serde(rename = "WindowTitle")]
    pub window_title: Arc<str>,
    #[serde(rename = "ProcessId")]
    pub process_id: Option<u32>,
    #[serde(rename = "TimerPhase", deserialize_with = "phase_ser::deserialize")]
    pub timer_phase: TimerPhase,
    #[serde(rename = "TaskLabel")]
    pub task_label: Option<Arc<str>>,
}

mod timestamp_ser {
    use chrono::NaiveDateTime;
    use serde::{self, de::Error, Deserialize, Deserializer, Serializer};

    use crate::utils::time::{format_timestamp, parse_timestamp};

    pub fn serialize<S>(moment: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_timestamp(*moment))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_timestamp(&s).ok_or_else(|| D::Error::custom(format!("illegal timestamp {s:?}")))
    }
}

mod phase_ser {
    use serde::{de::Error, Deserialize, Deserializer};

    use crate::tracker::timer::TimerPhase;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<TimerPhase, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}
