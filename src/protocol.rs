//! Wire protocol for the command channel and the display update queue.
//!
//! Commands travel one way, controller → display session, one JSON object per
//! newline-terminated line:
//!
//! ```text
//! {"action":"show_text","content":"Hello","wait_for_enter":true}
//! {"action":"run_ei_task"}
//! ```
//!
//! Display updates never cross a process boundary; they are the in-process
//! message type the network bridge enqueues for the render loop.

use serde::{Deserialize, Serialize};

use crate::RigError;

/// A request from the controller to the display session.
///
/// Created once, serialized to one line, consumed exactly once by the
/// dispatch loop. Unknown actions fail to decode; the reader logs and skips
/// them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    ShowText {
        #[serde(default = "default_content")]
        content: String,
        #[serde(default)]
        wait_for_enter: bool,
    },
    ShowStandby,
    ClearScreen,
    RunM1Task,
    RunV1Task,
    RunEiTask,
    StopEiTask,
    Exit,
}

fn default_content() -> String {
    "No content provided.".to_string()
}

impl Command {
    /// Decode one line of the command channel.
    pub fn parse_line(line: &str) -> Result<Self, RigError> {
        Ok(serde_json::from_str(line.trim())?)
    }

    /// Encode for the command channel, newline included.
    pub fn to_line(&self) -> Result<String, RigError> {
        let mut s = serde_json::to_string(self)?;
        s.push('\n');
        Ok(s)
    }

    pub fn show_text(content: impl Into<String>, wait_for_enter: bool) -> Self {
        Command::ShowText {
            content: content.into(),
            wait_for_enter,
        }
    }
}

/// A change for the render loop to apply to its owned stimuli.
///
/// Produced by the network bridge thread, consumed once per frame tick by the
/// display session. The update queue is the only cross-thread path to the
/// drawable objects.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayUpdate {
    StatusText(String),
    CircleSize(u32),
}

/// Deterministic value-to-diameter mapping with a floor, so a tiny ratio
/// never collapses the indicator to nothing.
pub fn circle_diameter_px(ei_ratio: f64) -> u32 {
    ((ei_ratio * 20.0) as i64).max(10) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_action() {
        let all = [
            Command::show_text("hello", true),
            Command::ShowStandby,
            Command::ClearScreen,
            Command::RunM1Task,
            Command::RunV1Task,
            Command::RunEiTask,
            Command::StopEiTask,
            Command::Exit,
        ];
        for cmd in all {
            let line = cmd.to_line().unwrap();
            assert!(line.ends_with('\n'));
            assert_eq!(Command::parse_line(&line).unwrap(), cmd);
        }
    }

    #[test]
    fn decodes_wire_format() {
        let cmd =
            Command::parse_line(r#"{"action":"show_text","content":"Hi","wait_for_enter":true}"#)
                .unwrap();
        assert_eq!(cmd, Command::show_text("Hi", true));

        let cmd = Command::parse_line(r#"{"action":"run_ei_task"}"#).unwrap();
        assert_eq!(cmd, Command::RunEiTask);
    }

    #[test]
    fn show_text_fields_are_optional() {
        let cmd = Command::parse_line(r#"{"action":"show_text"}"#).unwrap();
        assert_eq!(cmd, Command::show_text("No content provided.", false));
    }

    #[test]
    fn unknown_action_is_an_error() {
        assert!(Command::parse_line(r#"{"action":"warp_core_breach"}"#).is_err());
        assert!(Command::parse_line("not json at all").is_err());
    }

    #[test]
    fn diameter_scale_with_floor() {
        assert_eq!(circle_diameter_px(0.85), 17);
        assert_eq!(circle_diameter_px(0.1), 10);
        assert_eq!(circle_diameter_px(0.0), 10);
        assert_eq!(circle_diameter_px(7.25), 145);
    }
}
