//! The one window and everything drawable in it.
//!
//! All rendering state lives behind the [`Screen`] trait so the dispatch loop
//! and the tasks can be exercised headless in tests. The real implementation,
//! [`TermScreen`], owns the terminal: raw mode, alternate screen, and a small
//! fixed set of stimuli (message text, status line, the E/I indicator disc).
//!
//! Only the session's own loop ever touches a `Screen`. Background threads
//! describe changes via the update queue; they never hold a screen handle.

use std::io::{self, Write as _};
use std::time::Duration;

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::style::Stylize as _;
use crossterm::{cursor, event, execute, queue, terminal};

/// Keys the rig cares about. Everything else maps to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Escape,
    Left,
    Right,
    Digit(char),
    Other,
}

pub trait Screen {
    /// Replace the central message text (empty string clears it).
    fn set_message(&mut self, text: &str);

    /// Replace the one-line status text at the top of the screen.
    fn set_status(&mut self, text: &str);

    /// Show or resize the indicator disc; `None` hides it.
    fn set_circle(&mut self, diameter_px: Option<u32>);

    /// Remove all transient stimuli.
    fn clear(&mut self);

    /// One display refresh. Equivalent of a frame flip.
    fn flip(&mut self) -> io::Result<()>;

    /// Wait up to `timeout` for one key press.
    fn poll_key(&mut self, timeout: Duration) -> io::Result<Option<Key>>;
}

fn map_key(code: KeyCode) -> Key {
    match code {
        KeyCode::Enter => Key::Enter,
        KeyCode::Esc => Key::Escape,
        KeyCode::Left => Key::Left,
        KeyCode::Right => Key::Right,
        KeyCode::Char(c @ '0'..='9') => Key::Digit(c),
        _ => Key::Other,
    }
}

/// Terminal-backed screen. Created once per process; dropping it restores the
/// terminal.
pub struct TermScreen {
    message: String,
    status: String,
    circle_diameter: Option<u32>,
    dirty: bool,
}

impl TermScreen {
    pub fn new() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        execute!(io::stdout(), terminal::EnterAlternateScreen, cursor::Hide)?;
        Ok(Self {
            message: String::new(),
            status: String::new(),
            circle_diameter: None,
            dirty: true,
        })
    }

    fn redraw(&mut self) -> io::Result<()> {
        let (cols, rows) = terminal::size()?;
        let mut out = io::stdout();
        queue!(out, terminal::Clear(terminal::ClearType::All))?;

        // Status line, top-left.
        if !self.status.is_empty() {
            queue!(out, cursor::MoveTo(1, 0))?;
            write!(out, "{}", self.status.as_str().cyan())?;
        }

        // Centered message block.
        if !self.message.is_empty() {
            let lines: Vec<&str> = self.message.lines().collect();
            let top = (rows / 2).saturating_sub(lines.len() as u16 / 2);
            for (i, line) in lines.iter().enumerate() {
                let col = (cols / 2).saturating_sub(line.chars().count() as u16 / 2);
                queue!(out, cursor::MoveTo(col, top + i as u16))?;
                write!(out, "{line}")?;
            }
        }

        // Indicator disc, centered below the status line. A character cell is
        // roughly twice as tall as wide, so halve the row count.
        if let Some(diameter) = self.circle_diameter {
            let width = (diameter / 4).clamp(2, cols as u32 / 2) as i32;
            let height = (width / 2).max(1);
            let cx = cols as i32 / 2;
            let cy = rows as i32 / 2;
            for dy in -height..=height {
                let span = ((1.0 - (dy as f64 / height as f64).powi(2)).max(0.0)).sqrt();
                let half = (span * width as f64).round() as i32;
                let row = cy + dy;
                if row < 0 || row >= rows as i32 {
                    continue;
                }
                for dx in -half..=half {
                    let col = cx + dx;
                    if col < 0 || col >= cols as i32 {
                        continue;
                    }
                    queue!(out, cursor::MoveTo(col as u16, row as u16))?;
                    write!(out, "{}", "█".cyan())?;
                }
            }
        }

        out.flush()
    }
}

impl Screen for TermScreen {
    fn set_message(&mut self, text: &str) {
        self.message = text.to_string();
        self.dirty = true;
    }

    fn set_status(&mut self, text: &str) {
        self.status = text.to_string();
        self.dirty = true;
    }

    fn set_circle(&mut self, diameter_px: Option<u32>) {
        self.circle_diameter = diameter_px;
        self.dirty = true;
    }

    fn clear(&mut self) {
        self.message.clear();
        self.status.clear();
        self.circle_diameter = None;
        self.dirty = true;
    }

    fn flip(&mut self) -> io::Result<()> {
        if self.dirty {
            self.redraw()?;
            self.dirty = false;
        }
        Ok(())
    }

    fn poll_key(&mut self, timeout: Duration) -> io::Result<Option<Key>> {
        if event::poll(timeout)? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                if kind == KeyEventKind::Press {
                    return Ok(Some(map_key(code)));
                }
            }
        }
        Ok(None)
    }
}

impl Drop for TermScreen {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), cursor::Show, terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}
