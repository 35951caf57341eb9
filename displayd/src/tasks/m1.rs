//! M1 finger tapping task.
//!
//! Per repetition: the cued sequence is shown for a fixed display window with
//! input already allowed, then a "replicate now" phase collects the remaining
//! taps under a response cutoff. Taps made during the display window count
//! toward the sequence; the cutoff timer starts only when the display window
//! ends and is not shortened by early taps.

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

const TASK_NAME: &str = "m1_tapping";
const TAP_FEEDBACK: Duration = Duration::from_millis(150);

#[derive(Debug, Clone)]
pub struct M1Config {
    pub repetitions: u32,
    pub base_sequence: Vec<String>,
    pub sequence_display_time: f64,
    pub response_cutoff_time: f64,
    pub randomize_sequence: bool,
    pub feedback_seconds: f64,
    pub completion_seconds: f64,
}

impl M1Config {
    pub fn from_config(config: &Config) -> Self {
        Self {
            repetitions: config.get_u64("m1_task.repetitions", 3) as u32,
            base_sequence: config
                .get_str_list("m1_task.sequence", &["4", "1", "3", "2", "4"]),
            sequence_display_time: config.get_f64("m1_task.sequence_display_time", 2.0),
            response_cutoff_time: config.get_f64("m1_task.response_cutoff_time", 5.0),
            randomize_sequence: config.get_bool("m1_task.randomize_sequence", false),
            feedback_seconds: config.get_f64("m1_task.feedback_seconds", 2.0),
            completion_seconds: config.get_f64("m1_task.completion_seconds", 3.0),
        }
    }
}

/// Accepted tap keys are the digits 1-4, matching the cue vocabulary.
fn tap_label(key: Key) -> Option<String> {
    match key {
        Key::Digit(c @ '1'..='4') => Some(c.to_string()),
        _ => None,
    }
}

pub async fn run_m1_experiment<S: Screen>(
    screen: &mut S,
    config: &M1Config,
    recorder: &mut SessionRecorder,
) -> Result<TaskOutcome, RigError> {
    info!(
        "M1 task starting: {} repetitions, sequence {:?}, display {}s, cutoff {}s",
        config.repetitions,
        config.base_sequence,
        config.sequence_display_time,
        config.response_cutoff_time
    );
    recorder.record_event(
        "task_start",
        TASK_NAME,
        &json!({
            "repetitions": config.repetitions,
            "sequence": config.base_sequence,
            "randomize": config.randomize_sequence,
        }),
    )?;

    let mut csv = recorder.task_csv(
        "m1_finger_tapping.csv",
        &[
            "repetition",
            "expected_sequence",
            "response_sequence",
            "response_times",
            "correct",
            "timestamp",
        ],
    )?;
    let mut rng = Prng::from_entropy();

    for rep in 0..config.repetitions {
        let mut expected = config.base_sequence.clone();
        if config.randomize_sequence {
            rng.shuffle(&mut expected);
        }
        info!(
            "M1 repetition {}/{}: sequence {:?}",
            rep + 1,
            config.repetitions,
            expected
        );

        let mut responses: Vec<String> = Vec::new();
        let mut response_times: Vec<f64> = Vec::new();
        let tap_clock = Instant::now();

        // Phase 1: show the sequence; taps already count.
        screen.clear();
        screen.set_message(&expected.join("-"));
        let display_deadline =
            Instant::now() + Duration::from_secs_f64(config.sequence_display_time);
        while Instant::now() < display_deadline {
            match screen.poll_key(Duration::from_millis(1))? {
                Some(Key::Escape) => return abort(recorder, rep),
                Some(key) => {
                    if let Some(label) = tap_label(key) {
                        if responses.len() < expected.len() {
                            responses.push(label);
                            response_times.push(tap_clock.elapsed().as_secs_f64());
                        }
                    }
                }
                None => {}
            }
            screen.flip()?;
            sleep(Duration::from_millis(1)).await;
        }

        // Phase 2: collect the remainder under the cutoff.
        screen.clear();
        screen.set_message("Replicate the sequence now!");
        let cutoff_deadline =
            Instant::now() + Duration::from_secs_f64(config.response_cutoff_time);
        while responses.len() < expected.len() && Instant::now() < cutoff_deadline {
            match screen.poll_key(Duration::from_millis(10))? {
                Some(Key::Escape) => return abort(recorder, rep),
                Some(key) => {
                    if let Some(label) = tap_label(key) {
                        screen.set_status(&format!("Got: {label}"));
                        responses.push(label);
                        response_times.push(tap_clock.elapsed().as_secs_f64());
                        screen.flip()?;
                        sleep(TAP_FEEDBACK).await;
                    }
                }
                None => {}
            }
            screen.flip()?;
            sleep(Duration::from_millis(1)).await;
        }

        let correct = responses == expected;
        screen.clear();
        screen.set_message(if correct {
            "Correct!"
        } else {
            "Incorrect sequence."
        });
        screen.flip()?;
        sleep(Duration::from_secs_f64(config.feedback_seconds)).await;

        let times = response_times
            .iter()
            .map(|t| format!("{t:.3}"))
            .collect::<Vec<_>>()
            .join(",");
        csv.append(&[
            (rep + 1).to_string(),
            expected.join("-"),
            responses.join("-"),
            times,
            correct.to_string(),
            Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        ])?;
        recorder.record_event(
            "trial",
            TASK_NAME,
            &json!({
                "repetition": rep + 1,
                "correct": correct,
                "responses": responses.len(),
            }),
        )?;
    }

    screen.clear();
    screen.set_message("M1 Tapping Task Complete!\n\nThank you for participating.");
    screen.flip()?;
    sleep(Duration::from_secs_f64(config.completion_seconds)).await;

    recorder.record_event("task_end", TASK_NAME, &json!({ "outcome": "completed" }))?;
    info!("M1 task completed");
    Ok(TaskOutcome::Completed)
}

fn abort(recorder: &mut SessionRecorder, rep: u32) -> Result<TaskOutcome, RigError> {
    info!("M1 task aborted at repetition {}", rep + 1);
    recorder.record_event(
        "task_end",
        TASK_NAME,
        &json!({ "outcome": "aborted", "repetition": rep + 1 }),
    )?;
    Ok(TaskOutcome::Aborted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screen::fake::FakeScreen;

    fn fast_config(sequence: &[&str]) -> M1Config {
        M1Config {
            repetitions: 1,
            base_sequence: sequence.iter().map(|s| s.to_string()).collect(),
            sequence_display_time: 0.0,
            response_cutoff_time: 1.0,
            randomize_sequence: false,
            feedback_seconds: 0.0,
            completion_seconds: 0.0,
        }
    }

    fn recorder() -> (SessionRecorder, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let rec = SessionRecorder::begin(dir.path(), "t", "001", "m1_test").unwrap();
        (rec, dir)
    }

    fn csv_rows(recorder: &SessionRecorder) -> Vec<String> {
        std::fs::read_to_string(recorder.dir().join("m1_finger_tapping.csv"))
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn correct_sequence_is_scored_correct() {
        let (mut rec, _dir) = recorder();
        let mut screen = FakeScreen::with_keys(vec![
            Some(Key::Digit('1')),
            Some(Key::Digit('2')),
        ]);
        let outcome = run_m1_experiment(&mut screen, &fast_config(&["1", "2"]), &mut rec)
            .await
            .unwrap();
        assert_eq!(outcome, TaskOutcome::Completed);

        let rows = csv_rows(&rec);
        assert_eq!(rows.len(), 2); // header + one repetition
        assert!(rows[1].contains("1-2,1-2"), "row was {:?}", rows[1]);
        assert!(rows[1].contains("true"));
        // Each row carries a wall-clock timestamp.
        let today = Local::now().format("%Y-%m-%d").to_string();
        assert!(rows[1].contains(&today), "row was {:?}", rows[1]);
    }

    #[tokio::test]
    async fn wrong_sequence_is_scored_incorrect() {
        let (mut rec, _dir) = recorder();
        let mut screen = FakeScreen::with_keys(vec![
            Some(Key::Digit('2')),
            Some(Key::Digit('1')),
        ]);
        let outcome = run_m1_experiment(&mut screen, &fast_config(&["1", "2"]), &mut rec)
            .await
            .unwrap();
        assert_eq!(outcome, TaskOutcome::Completed);
        assert!(csv_rows(&rec)[1].contains("false"));
    }

    #[tokio::test]
    async fn cutoff_without_full_sequence_is_incorrect() {
        let (mut rec, _dir) = recorder();
        let mut cfg = fast_config(&["1", "2", "3"]);
        cfg.response_cutoff_time = 0.05;
        let mut screen = FakeScreen::with_keys(vec![Some(Key::Digit('1'))]);
        let outcome = run_m1_experiment(&mut screen, &cfg, &mut rec).await.unwrap();
        assert_eq!(outcome, TaskOutcome::Completed);

        let row = &csv_rows(&rec)[1];
        assert!(row.contains("1-2-3,1,"), "row was {row:?}");
        assert!(row.contains("false"));
    }

    #[tokio::test]
    async fn escape_aborts_without_writing_a_row() {
        let (mut rec, _dir) = recorder();
        let mut screen = FakeScreen::with_keys(vec![Some(Key::Escape)]);
        let outcome = run_m1_experiment(&mut screen, &fast_config(&["1", "2"]), &mut rec)
            .await
            .unwrap();
        assert_eq!(outcome, TaskOutcome::Aborted);
        assert_eq!(csv_rows(&rec).len(), 1); // header only
    }

    #[tokio::test]
    async fn non_tap_keys_are_ignored() {
        let (mut rec, _dir) = recorder();
        let mut cfg = fast_config(&["1"]);
        cfg.response_cutoff_time = 0.3;
        let mut screen = FakeScreen::with_keys(vec![
            Some(Key::Left),
            Some(Key::Digit('9')),
            Some(Key::Digit('1')),
        ]);
        let outcome = run_m1_experiment(&mut screen, &cfg, &mut rec).await.unwrap();
        assert_eq!(outcome, TaskOutcome::Completed);
        assert!(csv_rows(&rec)[1].contains("true"));
    }

    #[test]
    fn config_defaults() {
        let cfg = M1Config::from_config(&Config::default());
        assert_eq!(cfg.repetitions, 3);
        assert_eq!(cfg.base_sequence, vec!["4", "1", "3", "2", "4"]);
        assert_eq!(cfg.sequence_display_time, 2.0);
        assert_eq!(cfg.response_cutoff_time, 5.0);
        assert!(!cfg.randomize_sequence);
    }
}
