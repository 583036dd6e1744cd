use std::{path::Path, time::Duration};

use anyhow::Result;
use clap::Parser;
use tracing::info;

use crate::{
    tracker::{
        shutdown::detect_shutdown,
        spawn_tracker,
        status::{ConsoleStatus, TracingStatus},
        timer::TimerDurations,
        TrackerConfig,
    },
    utils::{clock::DefaultClock, dir::ACTIVITY_DIR},
    window_api::GenericWindowManager,
};

use super::console::{run_console, spawn_stdin_reader};

#[derive(Debug, Parser)]
pub struct RunCommand {
    #[arg(
        long,
        default_value_t = 1,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Seconds between two samples of the foreground window"
    )]
    interval: u64,
    #[arg(
        long,
        default_value_t = 25,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Length of a focus session in minutes"
    )]
    focus_minutes: u64,
    #[arg(
        long,
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Length of a break in minutes"
    )]
    break_minutes: u64,
    #[arg(
        long,
        help = "Don't read commands from stdin and don't print the status line. Stop with Ctrl-C"
    )]
    no_console: bool,
}

impl RunCommand {
    fn durations(&self) -> TimerDurations {
        TimerDurations {
            focus: Duration::from_secs(self.focus_minutes * 60),
            rest: Duration::from_secs(self.break_minutes * 60),
        }
    }
}

/// Tracks until Ctrl-C or `quit`. Rows go into the `activity` directory under `application_dir`.
pub async fn process_run_command(command: RunCommand, application_dir: &Path) -> Result<()> {
    let mut config = TrackerConfig::new(application_dir.join(ACTIVITY_DIR));
    config.interval = Duration::from_secs(command.interval);
    config.durations = command.durations();

    info!(
        "Tracking into {} every {:?}",
        config.activity_dir.display(),
        config.interval
    );
    println!("Logging activity into {}", config.activity_dir.display());

    let manager = GenericWindowManager::new()?;
    let tracker = if command.no_console {
        spawn_tracker(config, manager, TracingStatus, DefaultClock)?
    } else {
        spawn_tracker(config, manager, ConsoleStatus::default(), DefaultClock)?
    };

    tokio::spawn(detect_shutdown(tracker.handle.clone()));

    if command.no_console {
        println!("Press Ctrl-C to stop");
    } else {
        println!("Type 'help' for the list of commands, 'quit' or Ctrl-C to stop");
        tokio::spawn(run_console(tracker.handle.clone(), spawn_stdin_reader()?));
    }

    let result = tracker.join().await;
    info!("Tracking stopped");
    println!("Tracking stopped");
    result
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::Parser;

    use super::RunCommand;

    #[test]
    fn durations_come_from_minutes() {
        let command =
            RunCommand::try_parse_from(["run", "--focus-minutes", "50", "--break-minutes", "10"])
                .unwrap();
        let durations = command.durations();
        assert_eq!(durations.focus, Duration::from_secs(3000));
        assert_eq!(durations.rest, Duration::from_secs(600));
        assert_eq!(command.interval, 1);
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(RunCommand::try_parse_from(["run", "--interval", "0"]).is_err());
    }
}
