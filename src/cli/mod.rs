pub mod analyze;
pub mod console;
pub mod output;
pub mod run;

use std::path::PathBuf;

use analyze::{process_analyze_command, AnalyzeCommand};
use anyhow::Result;
use clap::{Parser, Subcommand};
use run::{process_run_command, RunCommand};
use tracing::level_filters::LevelFilter;

use crate::utils::{
    dir::{resolve_application_path, LOGS_DIR},
    logging::{enable_logging, ANALYZE_PREFIX, RUN_PREFIX},
};

#[derive(Parser, Debug)]
#[command(name = "Focustrace", version, long_about = None)]
#[command(about = "Focus timer and foreground window logger", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        help = "Level of diagnostic logs, for example \"debug\". Overrides RUST_LOG"
    )]
    log_filter: Option<LevelFilter>,
    #[arg(long, global = true, help = "Also print diagnostic logs to the console")]
    log_console: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Track the foreground window and run the focus timer in this console")]
    Run {
        #[command(flatten)]
        command: RunCommand,
    },
    #[command(about = "Aggregate the activity of one day and build a summarization prompt")]
    Analyze {
        #[command(flatten)]
        command: AnalyzeCommand,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let application_dir = resolve_application_path(args.dir)?;
    let prefix = match args.commands {
        Commands::Run { .. } => RUN_PREFIX,
        Commands::Analyze { .. } => ANALYZE_PREFIX,
    };
    enable_logging(
        prefix,
        &application_dir.join(LOGS_DIR),
        args.log_filter,
        args.log_console,
    )?;

    match args.commands {
        Commands::Run { command } => process_run_command(command, &application_dir).await,
        Commands::Analyze { command } => {
            process_analyze_command(command, &application_dir).await
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use tracing::level_filters::LevelFilter;

    use super::{Args, Commands};

    #[test]
    fn global_options_follow_subcommand() {
        let args = Args::try_parse_from([
            "focustrace",
            "analyze",
            "20251202",
            "--dir",
            "/tmp/focus",
            "--log-filter",
            "debug",
        ])
        .unwrap();
        assert!(matches!(args.commands, Commands::Analyze { .. }));
        assert_eq!(args.dir.unwrap().to_str(), Some("/tmp/focus"));
        assert_eq!(args.log_filter, Some(LevelFilter::DEBUG));
        assert!(!args.log_console);
    }
}
