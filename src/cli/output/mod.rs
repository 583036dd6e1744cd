//! Offline processing of partitions: dwell time aggregation and the summarization prompt.

pub mod analysis;
pub mod prompt;
