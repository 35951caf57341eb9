//! Shared library for the realtime-MRS neurofeedback rig.
//!
//! The two binaries (`displayd`, `rigctl`) build on this crate for
//! configuration, logging, the metabolite/E-I generator, the command/update
//! wire protocol, and session data recording.

pub mod config;
pub mod logging;
pub mod metabolite;
pub mod paths;
pub mod prng;
pub mod protocol;
pub mod recording;

use std::path::PathBuf;

/// Errors shared across the rig.
#[derive(Debug, thiserror::Error)]
pub enum RigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config file {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("setup failed: {0}")]
    Setup(String),
}
