use std::{io::BufRead, str::FromStr};

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::tracker::{control::TrackerHandle, status::TrackerStatus};

const HELP: &str = "\
Commands:
  focus [LABEL]  (f)  start a focus session, asks for a label when none is given
  break          (b)  start a break
  stop           (x)  stop the timer
  pause          (p)  pause or resume activity logging
  status         (s)  show timer and logging state
  quit           (q)  stop tracking and exit
  help           (h)  show this message";

#[derive(Debug, PartialEq, Eq)]
enum ConsoleCommand {
    Focus(Option<String>),
    Break,
    StopTimer,
    TogglePause,
    Status,
    Quit,
    Help,
}

impl FromStr for ConsoleCommand {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (command, rest) = s.split_once(char::is_whitespace).unwrap_or((s, ""));
        let rest = rest.trim();
        match command.to_lowercase().as_str() {
            "focus" | "f" => Ok(ConsoleCommand::Focus(
                (!rest.is_empty()).then(|| rest.to_string()),
            )),
            "break" | "b" => Ok(ConsoleCommand::Break),
            "stop" | "x" => Ok(ConsoleCommand::StopTimer),
            "pause" | "p" => Ok(ConsoleCommand::TogglePause),
            "status" | "s" => Ok(ConsoleCommand::Status),
            "quit" | "q" | "exit" => Ok(ConsoleCommand::Quit),
            "help" | "h" | "?" => Ok(ConsoleCommand::Help),
            other => Err(anyhow!("Unknown command {other:?}")),
        }
    }
}

/// Reads stdin on a plain thread and forwards every line. A blocked read on a thread of its own
/// can't hold up the runtime when tracking ends.
pub fn spawn_stdin_reader() -> Result<mpsc::Receiver<String>> {
    let (sender, receiver) = mpsc::channel(16);
    std::thread::Builder::new()
        .name("console-input".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if sender.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Stopped reading console input {e:?}");
                        break;
                    }
                }
            }
            debug!("Console input closed");
        })?;
    Ok(receiver)
}

/// Dispatches console lines to the tracker until it stops or input runs out. The line after a bare
/// `focus` is taken as the task label.
pub async fn run_console(handle: TrackerHandle, mut lines: mpsc::Receiver<String>) {
    let mut pending_label: Option<oneshot::Sender<String>> = None;
    loop {
        let line = tokio::select! {
            biased;
            _ = handle.shutdown_token().cancelled() => break,
            line = lines.recv() => line,
        };
        let Some(line) = line else {
            break;
        };

        if let Some(sender) = pending_label.take() {
            deliver_label(sender, line);
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<ConsoleCommand>() {
            Ok(command) => pending_label = execute(&handle, command),
            Err(e) => println!("{e}. Type 'help' for the list of commands"),
        }
    }
}

/// Hands a typed label to the waiting focus request. Returns whether anyone was still waiting.
fn deliver_label(sender: oneshot::Sender<String>, line: String) -> bool {
    let delivered = sender.send(line).is_ok();
    if !delivered {
        debug!("Task label arrived after its focus request was dropped");
    }
    delivered
}

fn execute(handle: &TrackerHandle, command: ConsoleCommand) -> Option<oneshot::Sender<String>> {
    match command {
        ConsoleCommand::Focus(Some(label)) => {
            if let Err(e) = handle.request_start_focus(&label) {
                println!("Can't start focus: {e}");
            }
        }
        ConsoleCommand::Focus(None) => {
            println!("Task name >");
            let (sender, receiver) = oneshot::channel();
            handle.start_focus_when(async move { receiver.await.ok() });
            return Some(sender);
        }
        ConsoleCommand::Break => handle.request_start_break(),
        ConsoleCommand::StopTimer => handle.request_stop_timer(),
        ConsoleCommand::TogglePause => {
            if handle.request_toggle_pause() {
                println!("Activity logging paused");
            } else {
                println!("Activity logging resumed");
            }
        }
        ConsoleCommand::Status => {
            let timer = handle.snapshot();
            let label = timer.task_label.clone();
            println!(
                "{}",
                TrackerStatus {
                    timer,
                    paused: handle.is_paused(),
                }
            );
            if let Some(label) = label {
                println!("Task: {label}");
            }
        }
        ConsoleCommand::Quit => handle.request_stop(),
        ConsoleCommand::Help => println!("{HELP}"),
    }
    None
}
