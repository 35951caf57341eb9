//! Per-session recording artifacts.
//!
//! Each session gets its own directory containing `session_info.json`, an
//! append-only `events.csv`, and whatever per-task CSV files the tasks write
//! through [`CsvAppender`]. Everything is flushed as it is written so a crash
//! mid-task loses at most the current row.

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::info;

use crate::RigError;

/// CSV file that writes its header exactly once, on creation.
#[derive(Debug)]
pub struct CsvAppender {
    file: File,
    path: PathBuf,
}

impl CsvAppender {
    pub fn open(path: &Path, header: &[&str]) -> Result<Self, RigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let existed = path.exists();
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if !existed {
            writeln!(file, "{}", header.join(","))?;
            file.flush()?;
        }
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Append one row. Fields containing commas or quotes are quoted.
    pub fn append(&mut self, fields: &[String]) -> Result<(), RigError> {
        let row: Vec<String> = fields.iter().map(|f| escape_field(f)).collect();
        writeln!(self.file, "{}", row.join(","))?;
        self.file.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[derive(Debug, Serialize)]
struct SessionInfo<'a> {
    participant_id: &'a str,
    session_id: &'a str,
    experiment_name: &'a str,
    start_time: String,
    end_time: Option<String>,
}

/// One experiment session on disk.
#[derive(Debug)]
pub struct SessionRecorder {
    dir: PathBuf,
    participant_id: String,
    session_id: String,
    experiment_name: String,
    started_at: DateTime<Local>,
    events: CsvAppender,
}

impl SessionRecorder {
    /// Create `base/<participant>_<session>_<timestamp>/` with its
    /// `session_info.json` and an empty `events.csv`.
    pub fn begin(
        base: &Path,
        participant_id: &str,
        session_id: &str,
        experiment_name: &str,
    ) -> Result<Self, RigError> {
        let started_at = Local::now();
        let dir = base.join(format!(
            "{}_{}_{}",
            participant_id,
            session_id,
            started_at.format("%Y%m%d_%H%M%S")
        ));
        std::fs::create_dir_all(&dir)?;

        let events = CsvAppender::open(
            &dir.join("events.csv"),
            &["timestamp", "event_type", "task_name", "event_data"],
        )?;

        let recorder = Self {
            dir,
            participant_id: participant_id.to_string(),
            session_id: session_id.to_string(),
            experiment_name: experiment_name.to_string(),
            started_at,
            events,
        };
        recorder.write_session_info(None)?;
        info!("Recording session to {:?}", recorder.dir);
        Ok(recorder)
    }

    fn write_session_info(&self, end_time: Option<String>) -> Result<(), RigError> {
        let info = SessionInfo {
            participant_id: &self.participant_id,
            session_id: &self.session_id,
            experiment_name: &self.experiment_name,
            start_time: self.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            end_time,
        };
        let json = serde_json::to_string_pretty(&info)?;
        std::fs::write(self.dir.join("session_info.json"), json)?;
        Ok(())
    }

    /// Append one event row immediately.
    pub fn record_event(
        &mut self,
        event_type: &str,
        task_name: &str,
        event_data: &serde_json::Value,
    ) -> Result<(), RigError> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string();
        self.events.append(&[
            timestamp,
            event_type.to_string(),
            task_name.to_string(),
            event_data.to_string(),
        ])
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Open (or reopen) a task-specific CSV inside the session directory.
    pub fn task_csv(&self, file_name: &str, header: &[&str]) -> Result<CsvAppender, RigError> {
        CsvAppender::open(&self.dir.join(file_name), header)
    }

    /// Rewrite `session_info.json` with the end time.
    pub fn finish(self) -> Result<(), RigError> {
        let end = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        self.write_session_info(Some(end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn header_written_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trials.csv");

        let mut csv = CsvAppender::open(&path, &["a", "b"]).unwrap();
        csv.append(&["1".into(), "2".into()]).unwrap();
        drop(csv);

        // Reopen: header must not repeat.
        let mut csv = CsvAppender::open(&path, &["a", "b"]).unwrap();
        csv.append(&["3".into(), "4".into()]).unwrap();
        drop(csv);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["a,b", "1,2", "3,4"]);
    }

    #[test]
    fn fields_with_commas_are_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.csv");
        let mut csv = CsvAppender::open(&path, &["x"]).unwrap();
        csv.append(&["a,b".into()]).unwrap();
        csv.append(&["say \"hi\"".into()]).unwrap();
        drop(csv);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"a,b\""));
        assert!(text.contains("\"say \"\"hi\"\"\""));
    }

    #[test]
    fn session_layout_and_events() {
        let base = tempfile::tempdir().unwrap();
        let mut rec = SessionRecorder::begin(base.path(), "p01", "s01", "rig_test").unwrap();
        rec.record_event("task_start", "m1_tapping", &json!({"repetitions": 3}))
            .unwrap();

        let dir = rec.dir().to_path_buf();
        assert!(dir.join("session_info.json").exists());
        let events = std::fs::read_to_string(dir.join("events.csv")).unwrap();
        assert!(events.starts_with("timestamp,event_type,task_name,event_data"));
        assert!(events.contains("task_start"));

        rec.finish().unwrap();
        let info = std::fs::read_to_string(dir.join("session_info.json")).unwrap();
        let v: serde_json::Value = serde_json::from_str(&info).unwrap();
        assert_eq!(v["participant_id"], "p01");
        assert!(v["end_time"].is_string());
    }
}
