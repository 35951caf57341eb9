//! Blocking psychophysics tasks.
//!
//! Each task runs its own responsive loop against the live screen, polls for
//! the cancel key every iteration, and persists trial data incrementally so a
//! crash loses at most the trial in flight. Tasks return to the session when
//! finished or aborted; they never terminate the process.

pub mod m1;
pub mod v1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Aborted,
}
