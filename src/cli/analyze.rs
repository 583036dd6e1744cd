use std::{fmt::Display, path::Path};

use anyhow::Result;
use ansi_term::Style;
use chrono::{DateTime, Duration, Local, NaiveDate};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};

use crate::{
    tracker::storage::partition_storage::CsvLogStorage,
    utils::{dir::ACTIVITY_DIR, time::format_duration},
};

use super::{
    output::{
        analysis::{analyze_partition, AnalysisOutcome, UsageReport},
        prompt::summarization_prompt,
    },
    Args,
};

const SEPARATOR: &str = "==================================================";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct AnalyzeCommand {
    #[arg(
        help = "Day to analyze, today by default. Examples are \"20251202\", \"2025-12-02\", \"yesterday\", \"15/03/2025\""
    )]
    date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(long, help = "Print the aggregates as JSON")]
    json: bool,
    #[arg(long, help = "Don't print the summarization prompt")]
    no_prompt: bool,
}

/// Aggregates the partition of one day and prints a report followed by a prompt for summarizing
/// it. A day without data is reported, not treated as an error.
pub async fn process_analyze_command(
    AnalyzeCommand {
        date,
        date_style,
        json,
        no_prompt,
    }: AnalyzeCommand,
    application_dir: &Path,
) -> Result<()> {
    let date = parse_day(date.as_deref(), date_style, Local::now())?;
    let storage = CsvLogStorage::new(application_dir.join(ACTIVITY_DIR))?;

    let outcome = analyze_partition(&storage, date).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    println!(
        "{}",
        Style::new()
            .bold()
            .paint(format!("--- Activity analysis for {date} ---"))
    );
    match &outcome {
        AnalysisOutcome::Report(report) => print_report(report),
        AnalysisOutcome::NoData(reason) => println!("No data to analyze: {reason}"),
    }

    if !no_prompt {
        println!("\n{SEPARATOR}");
        println!("{}", Style::new().bold().paint("[Summarization prompt]"));
        println!("{SEPARATOR}");
        println!("{}", summarization_prompt(&outcome));
    }
    Ok(())
}

fn parse_day(input: Option<&str>, date_style: DateStyle, now: DateTime<Local>) -> Result<NaiveDate> {
    let Some(input) = input.map(str::trim) else {
        return Ok(now.date_naive());
    };
    if let Some(date) = ["%Y%m%d", "%Y-%m-%d"]
        .into_iter()
        .find_map(|format| NaiveDate::parse_from_str(input, format).ok())
    {
        return Ok(date);
    }
    match parse_date_string(input, now, date_style.into()) {
        Ok(v) => Ok(v.date_naive()),
        Err(e) => Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("Failed to validate date {input:?} {e}"),
            )
            .into()),
    }
}

fn print_report(report: &UsageReport) {
    let header = Style::new().bold();

    println!("\n{}", header.paint("[Total time per application]"));
    for process in &report.processes {
        println!(
            "- {}: {} ({}%)",
            process.process_name,
            format_duration(process.duration),
            share(process.duration, report.total)
        );
    }

    println!("\n{}", header.paint("[Time per window]"));
    for window in &report.windows {
        println!(
            "- {} - {:?}: {}",
            window.process_name,
            &*window.window_title,
            format_duration(window.duration)
        );
    }

    println!("\n{}", header.paint("[Time per timer phase]"));
    for phase in &report.phases {
        println!("- {}: {}", phase.phase, format_duration(phase.duration));
    }

    if !report.tasks.is_empty() {
        println!("\n{}", header.paint("[Focus time per task]"));
        for task in &report.tasks {
            println!("- {}: {}", task.task_label, format_duration(task.duration));
        }
    }

    println!("\nTotal: {}", format_duration(report.total));
    if report.skipped_rows > 0 {
        println!("Skipped {} damaged rows", report.skipped_rows);
    }
}

/// Whole percent of `total`. Zero when nothing was measured.
fn share(part: Duration, total: Duration) -> i64 {
    if total.num_seconds() <= 0 {
        return 0;
    }
    part.num_seconds() * 100 / total.num_seconds()
}
