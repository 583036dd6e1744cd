//! Focus timer and foreground window logger. `run` samples the active window once per interval
//! and appends a row to a per-day CSV file whenever the window or the timer phase changes,
//! `analyze` turns such a file into time spent per application, window and task.

pub mod cli;
pub mod tracker;
pub mod utils;
pub mod window_api;
