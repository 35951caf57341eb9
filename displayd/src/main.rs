//! `displayd`: the display session process.
//!
//! Owns the one window for the whole run. Commands arrive as JSON lines on
//! stdin; a single `READY` line on stdout tells the supervisor the window is
//! up and the command channel is live. Log output goes to stderr and the
//! shared log file, never stdout.

mod bridge;
mod screen;
mod session;
mod tasks;

use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;

use rtmrs::config::Config;
use rtmrs::logging::{self, ConsoleStream};
use rtmrs::paths::AppPaths;
use rtmrs::protocol::Command;
use rtmrs::recording::SessionRecorder;
use rtmrs::RigError;
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::screen::TermScreen;
use crate::session::DisplaySession;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("displayd: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), RigError> {
    let paths = AppPaths::new()?;
    logging::init(&paths.log_file("displayd"), ConsoleStream::Stderr);

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| paths.config_file());
    let config = Config::load(&config_path)?;

    let participant = config.get_str("session.participant_id", "anonymous");
    let session_id = config.get_str("session.session_id", "001");
    let recorder = SessionRecorder::begin(
        &paths.sessions_dir(),
        &participant,
        &session_id,
        "realtime_mrs",
    )?;

    let screen = TermScreen::new()
        .map_err(|e| RigError::Setup(format!("could not initialize the display: {e}")))?;

    let (tx, rx) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();
    tokio::spawn(read_commands(tx.clone(), shutdown.clone()));

    // Window up, reader running: tell the supervisor we are live.
    println!("READY");
    std::io::stdout().flush()?;
    info!("displayd ready, entering session loop");

    DisplaySession::new(screen, config, rx, tx, shutdown, recorder)
        .run()
        .await;
    Ok(())
}

/// Forward stdin lines to the command queue until EOF. A malformed line is
/// logged and skipped; EOF means the controller is gone, so shut down.
async fn read_commands(tx: UnboundedSender<Command>, shutdown: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match Command::parse_line(&line) {
                    Ok(cmd) => {
                        if tx.send(cmd).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Ignoring malformed command {line:?}: {e}"),
                }
            }
            Ok(None) => {
                info!("Command channel closed (stdin EOF)");
                break;
            }
            Err(e) => {
                warn!("Command channel read error: {e}");
                break;
            }
        }
    }
    shutdown.cancel();
}
