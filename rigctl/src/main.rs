//! `rigctl`: the operator console.
//!
//! Runs the text menu in the operator's terminal, supervises the `displayd`
//! child process, and drives tasks by writing JSON command lines to its
//! stdin. For the E/I visualization it also runs the simulated data sender
//! in-process. Console logs go to stderr so the menu stays readable.

mod intros;
mod sender;
mod supervisor;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use rtmrs::config::Config;
use rtmrs::logging::{self, ConsoleStream};
use rtmrs::paths::AppPaths;
use rtmrs::protocol::Command;
use rtmrs::RigError;
use tokio::io::{AsyncBufReadExt as _, BufReader, Lines, Stdin};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::supervisor::DisplayProcess;

type Input = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("rigctl: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), RigError> {
    let paths = AppPaths::new()?;
    logging::init(&paths.log_file("rigctl"), ConsoleStream::Stderr);

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| paths.config_file());
    let config = Config::load(&config_path)?;

    let mut display = DisplayProcess::new(config_path)?;
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    loop {
        // The display child may have crashed during the previous task;
        // restart it before offering the menu again.
        match display.ensure_running().await {
            Ok(()) => {
                let _ = display.send(&Command::ShowStandby).await;
            }
            Err(e) => error!("Display process unavailable: {e}"),
        }

        print_menu();
        let Some(choice) = read_choice(&mut input).await? else {
            info!("Operator input closed, exiting");
            break;
        };
        match choice {
            1 => run_ei_visualization(&mut display, &config, &mut input).await,
            2 => {
                run_display_task(
                    &mut display,
                    "M1 Tapping Task",
                    intros::M1_TASK,
                    Command::RunM1Task,
                )
                .await
            }
            3 => {
                run_display_task(
                    &mut display,
                    "V1 Orientation Task",
                    intros::V1_TASK,
                    Command::RunV1Task,
                )
                .await
            }
            4 => break,
            other => println!("No task number {other}. Please choose 1-4."),
        }
    }

    display.shutdown().await;
    println!("Thank you for using the realtime MRS visualization system.");
    Ok(())
}

fn print_menu() {
    println!();
    println!("{}", "=".repeat(60));
    println!("           REALTIME MRS VISUALIZATION SYSTEM");
    println!("{}", "=".repeat(60));
    println!();
    println!("Available Tasks:");
    println!();
    println!("  1. E/I Ratio Visualization");
    println!("     Circle that changes size with the streamed E/I ratio");
    println!("  2. M1 Task");
    println!("     Finger tapping with configurable sequence and repetitions");
    println!("  3. V1 Task");
    println!("     Orientation discrimination");
    println!("  4. Exit");
    println!();
    println!("Enter the number of the task you want to run.");
}

/// Read menu lines until one parses as a number. `None` means stdin closed.
async fn read_choice(input: &mut Input) -> Result<Option<u32>, RigError> {
    loop {
        print!("Choice: ");
        use std::io::Write as _;
        std::io::stdout().flush()?;

        let Some(line) = input.next_line().await? else {
            return Ok(None);
        };
        match line.trim().parse::<u32>() {
            Ok(n) => return Ok(Some(n)),
            Err(_) => println!("Invalid input. Please enter a valid number."),
        }
    }
}

/// Show the intro on the display window and wait there for the participant's
/// Enter; the follow-up command queues behind it on the same channel.
async fn send_intro(display: &mut DisplayProcess, task_name: &str, intro: &str) -> bool {
    println!("Displaying instructions for {task_name} on the display window...");
    println!("The participant confirms with Enter in the display window.");
    display
        .send(&Command::show_text(intro, true))
        .await
        .is_ok()
}

/// M1/V1 run entirely inside the display process; the menu just kicks them
/// off and comes back.
async fn run_display_task(
    display: &mut DisplayProcess,
    task_name: &str,
    intro: &str,
    command: Command,
) {
    if !send_intro(display, task_name, intro).await {
        return;
    }
    if display.send(&command).await.is_err() {
        return;
    }
    println!("{task_name} is running on the display. It returns to standby when finished.");
}

async fn run_ei_visualization(display: &mut DisplayProcess, config: &Config, input: &mut Input) {
    if !send_intro(display, "E/I Ratio Visualization", intros::EI_VISUALIZATION).await {
        return;
    }
    if display.send(&Command::RunEiTask).await.is_err() {
        return;
    }
    // Give the display time to bind its listener before the sender connects.
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let cancel = CancellationToken::new();
    let mut sender_task = tokio::spawn({
        let config = config.clone();
        let cancel = cancel.clone();
        async move { sender::stream_ei(&config, cancel).await }
    });

    println!("E/I data sender is running. Press Enter to stop and return to the menu.");
    let finished = tokio::select! {
        _ = input.next_line() => {
            info!("Operator stopped the E/I stream");
            false
        }
        res = &mut sender_task => {
            report_sender_result(res);
            true
        }
    };

    if !finished {
        cancel.cancel();
        match timeout(Duration::from_secs(2), &mut sender_task).await {
            Ok(res) => report_sender_result(res),
            Err(_) => {
                warn!("E/I sender did not stop in time, aborting it");
                sender_task.abort();
            }
        }
    }

    let _ = display.send(&Command::StopEiTask).await;
}

fn report_sender_result(res: Result<Result<(), RigError>, tokio::task::JoinError>) {
    match res {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("E/I sender failed: {e}"),
        Err(e) => error!("E/I sender task panicked: {e}"),
    }
}
