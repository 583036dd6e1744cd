use std::fmt::Write;

use crate::utils::time::format_duration;

use super::analysis::{AnalysisOutcome, UsageReport};

pub const NO_DATA_PROMPT: &str = "There is no log data to analyze.";

const INSTRUCTIONS: &str = "\
You are a capable work assistant.
Based on the PC activity log below, summarize what was done today.

[Log data]
Format: dwell time, application, window title
";

const OUTPUT_FORMAT: &str = "
[Output format]
- Main tasks: list of the main tasks (what was worked on)
- Time allocation: rough share of time spent on each task
- Focus: how well attention stayed on one task, judged from the switching
- Suggestions: what could make tomorrow more productive

Keep it concise and written as bullet points.";

/// Builds a text asking a language model to summarize the day, one line per window of the report.
pub fn summarization_prompt(outcome: &AnalysisOutcome) -> String {
    match outcome {
        AnalysisOutcome::Report(report) => report_prompt(report),
        AnalysisOutcome::NoData(_) => NO_DATA_PROMPT.to_string(),
    }
}

fn report_prompt(report: &UsageReport) -> String {
    let mut prompt = INSTRUCTIONS.to_string();
    for window in &report.windows {
        // Writing into a String can't fail.
        let _ = writeln!(
            prompt,
            "(dwell: {}), {}, {}",
            format_duration(window.duration),
            window.process_name,
            window.window_title
        );
    }
    prompt.push_str(OUTPUT_FORMAT);
    prompt
}
