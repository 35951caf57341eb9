//! V1 orientation discrimination task.
//!
//! Each trial flashes a grating tilted a few degrees left or right of
//! vertical, then waits for a left/right arrow response under a cutoff.
//! Trial rows are appended to the task CSV as they complete.

use std::time::{Duration, Instant};

use chrono::Local;
use rtmrs::config::Config;
use rtmrs::prng::Prng;
use rtmrs::recording::SessionRecorder;
use rtmrs::RigError;
use serde_json::json;
use tokio::time::sleep;
use tracing::info;

use crate::screen::{Key, Screen};

use super::TaskOutcome;

const TASK_NAME: &str = "v1_orientation";
const TILT_DEGREES: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct V1Config {
    pub n_trials: u32,
    pub stimulus_duration: f64,
    pub response_cutoff_time: f64,
    pub feedback_seconds: f64,
    pub completion_seconds: f64,
}

impl V1Config {
    pub fn from_config(config: &Config) -> Self {
        Self {
            n_trials: config.get_u64("v1_task.n_trials", 20) as u32,
            stimulus_duration: config.get_f64("v1_task.stimulus_duration", 0.1),
            response_cutoff_time: config.get_f64("v1_task.response_cutoff_time", 3.0),
            feedback_seconds: config.get_f64("v1_task.feedback_seconds", 1.0),
            completion_seconds: config.get_f64("v1_task.completion_seconds", 3.0),
        }
    }
}

/// Text stand-in for the tilted grating. Negative tilt leans left.
fn orientation_glyph(orientation: f64) -> String {
    let stroke = if orientation < 0.0 { '\\' } else { '/' };
    let line: String = std::iter::repeat(stroke)
        .take(9)
        .flat_map(|c| [c, ' '])
        .collect();
    let line = line.trim_end().to_string();
    vec![line.clone(), line.clone(), line.clone(), line].join("\n")
}

/// Left arrow is correct for a left-leaning (negative) tilt.
fn is_correct(orientation: f64, key: Key) -> bool {
    match key {
        Key::Left => orientation < 0.0,
        Key::Right => orientation >= 0.0,
        _ => false,
    }
}

pub async fn run_v1_experiment<S: Screen>(
    screen: &mut S,
    config: &V1Config,
    recorder: &mut SessionRecorder,
) -> Result<TaskOutcome, RigError> {
    info!(
        "V1 task starting: {} trials, stimulus {}s, cutoff {}s",
        config.n_trials, config.stimulus_duration, config.response_cutoff_time
    );
    recorder.record_event(
        "task_start",
        TASK_NAME,
        &json!({ "n_trials": config.n_trials }),
    )?;

    let mut csv = recorder.task_csv(
        "v1_orientation.csv",
        &[
            "trial",
            "orientation",
            "response",
            "response_time",
            "correct",
            "timestamp",
        ],
    )?;
    let mut rng = Prng::from_entropy();

    for trial in 0..config.n_trials {
        let orientation = if rng.next_f64_01() < 0.5 {
            -TILT_DEGREES
        } else {
            TILT_DEGREES
        };

        // Brief stimulus flash.
        screen.clear();
        screen.set_message(&orientation_glyph(orientation));
        screen.flip()?;
        let flash_deadline = Instant::now() + Duration::from_secs_f64(config.stimulus_duration);
        while Instant::now() < flash_deadline {
            if let Some(Key::Escape) = screen.poll_key(Duration::from_millis(1))? {
                return abort(recorder, trial);
            }
            sleep(Duration::from_millis(1)).await;
        }

        // Response window.
        screen.clear();
        screen.set_message("Left or right?");
        screen.flip()?;
        let clock = Instant::now();
        let cutoff = Duration::from_secs_f64(config.response_cutoff_time);
        let mut response: Option<Key> = None;
        while clock.elapsed() < cutoff {
            match screen.poll_key(Duration::from_millis(10))? {
                Some(Key::Escape) => return abort(recorder, trial),
                Some(key @ (Key::Left | Key::Right)) => {
                    response = Some(key);
                    break;
                }
                _ => {}
            }
            sleep(Duration::from_millis(1)).await;
        }
        let response_time = clock.elapsed().as_secs_f64();

        let (label, correct) = match response {
            Some(Key::Left) => ("left", is_correct(orientation, Key::Left)),
            Some(Key::Right) => ("right", is_correct(orientation, Key::Right)),
            _ => ("timeout", false),
        };

        screen.clear();
        screen.set_message(if correct { "Correct!" } else { "Incorrect." });
        screen.flip()?;
        sleep(Duration::from_secs_f64(config.feedback_seconds)).await;

        csv.append(&[
            (trial + 1).to_string(),
            format!("{orientation:.1}"),
            label.to_string(),
            format!("{response_time:.3}"),
            correct.to_string(),
            Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        ])?;
        recorder.record_event(
            "trial",
            TASK_NAME,
            &json!({
                "trial": trial + 1,
                "orientation": orientation,
                "response": label,
                "correct": correct,
            }),
        )?;
    }

    screen.clear();
    screen.set_message("V1 Orientation Task Complete!\n\nThank you for participating.");
    screen.flip()?;
    sleep(Duration::from_secs_f64(config.completion_seconds)).await;

    recorder.record_event("task_end", TASK_NAME, &json!({ "outcome": "completed" }))?;
    info!("V1 task completed");
    Ok(TaskOutcome::Completed)
}

fn abort(recorder: &mut SessionRecorder, trial: u32) -> Result<TaskOutcome, RigError> {
    info!("V1 task aborted at trial {}", trial + 1);
    recorder.record_event(
        "task_end",
        TASK_NAME,
        &json!({ "outcome": "aborted", "trial": trial + 1 }),
    )?;
    Ok(TaskOutcome::Aborted)
}
