//! Cross-platform application paths

use std::fs;
use std::path::PathBuf;

use crate::RigError;

#[derive(Debug, Clone)]
pub struct AppPaths {
    data_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Result<Self, RigError> {
        let base = dirs::data_dir()
            .ok_or_else(|| RigError::Setup("could not determine OS data directory".to_string()))?;
        let data_dir = base.join("rtmrs");
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    /// Shared append log. Both binaries write here, prefixed by component.
    pub fn log_file(&self, component: &str) -> PathBuf {
        self.data_dir.join(format!("{component}.log"))
    }

    /// Default root for per-session recording directories.
    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("rtmrs.json")
    }
}
