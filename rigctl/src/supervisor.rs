//! Lifecycle of the display session child process.
//!
//! The supervisor spawns `displayd` with all three standard streams piped,
//! waits for its `READY` line, then feeds it JSON command lines over stdin.
//! Child stderr is re-logged here so one terminal shows the whole rig. A
//! broken pipe marks the child dead; the menu loop restarts it before the
//! next task.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use rtmrs::protocol::Command;
use rtmrs::RigError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, AsyncWriteExt as _, BufReader};
use tokio::process::{Child, ChildStdin, Command as ProcessCommand};
use tokio::time::timeout;
use tracing::{error, info, warn};

const READY_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct DisplayProcess {
    program: PathBuf,
    config_path: PathBuf,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
}

impl DisplayProcess {
    /// Control a `displayd` binary expected next to our own executable.
    pub fn new(config_path: PathBuf) -> Result<Self, RigError> {
        let own = std::env::current_exe()?;
        let dir = own
            .parent()
            .ok_or_else(|| RigError::Setup("executable has no parent directory".to_string()))?;
        Ok(Self {
            program: dir.join("displayd"),
            config_path,
            child: None,
            stdin: None,
        })
    }

    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            None => false,
            Some(child) => match child.try_wait() {
                Ok(None) => true,
                Ok(Some(status)) => {
                    warn!("Display process exited with {status}");
                    self.child = None;
                    self.stdin = None;
                    false
                }
                Err(e) => {
                    warn!("Could not poll display process: {e}");
                    false
                }
            },
        }
    }

    /// Spawn the child if it is not already running and wait for `READY`.
    pub async fn ensure_running(&mut self) -> Result<(), RigError> {
        if self.is_running() {
            return Ok(());
        }

        info!("Starting display process {:?}", self.program);
        let mut child = ProcessCommand::new(&self.program)
            .arg(&self.config_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RigError::Setup(format!("could not start {:?}: {e}", self.program)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RigError::Setup("display process has no stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RigError::Setup("display process has no stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RigError::Setup("display process has no stderr".to_string()))?;

        let mut stdout = BufReader::new(stdout);
        match timeout(READY_TIMEOUT, read_until_ready(&mut stdout)).await {
            Ok(Ok(())) => info!("Display process is ready"),
            Ok(Err(e)) => {
                let _ = child.kill().await;
                return Err(e);
            }
            Err(_) => {
                let _ = child.kill().await;
                return Err(RigError::Setup(format!(
                    "display process sent no READY within {READY_TIMEOUT:?}"
                )));
            }
        }

        // Keep draining both pipes so the child never blocks on them.
        tokio::spawn(relay_output(stdout, "displayd stdout"));
        tokio::spawn(relay_output(BufReader::new(stderr), "displayd stderr"));

        self.child = Some(child);
        self.stdin = Some(stdin);
        Ok(())
    }

    /// Write one command line. A pipe failure marks the child dead so the
    /// caller can restart it.
    pub async fn send(&mut self, cmd: &Command) -> Result<(), RigError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| RigError::Setup("display process is not running".to_string()))?;
        let line = cmd.to_line()?;
        if let Err(e) = stdin.write_all(line.as_bytes()).await {
            error!("Lost the display command channel: {e}");
            self.stdin = None;
            if let Some(mut child) = self.child.take() {
                let _ = child.kill().await;
            }
            return Err(RigError::Io(e));
        }
        stdin.flush().await?;
        info!("Sent display command: {}", line.trim_end());
        Ok(())
    }

    /// Graceful stop: exit command, close stdin, bounded wait, then kill.
    pub async fn shutdown(&mut self) {
        if self.child.is_none() {
            return;
        }
        let _ = self.send(&Command::Exit).await;
        self.stdin = None; // closing stdin is EOF for the child reader

        if let Some(mut child) = self.child.take() {
            match timeout(SHUTDOWN_TIMEOUT, child.wait()).await {
                Ok(Ok(status)) => info!("Display process exited with {status}"),
                Ok(Err(e)) => warn!("Error waiting for display process: {e}"),
                Err(_) => {
                    warn!("Display process did not exit within {SHUTDOWN_TIMEOUT:?}, killing");
                    let _ = child.kill().await;
                }
            }
        }
    }
}

/// Consume child stdout until the handshake line. Earlier lines are re-logged,
/// EOF before `READY` is a startup failure.
async fn read_until_ready<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<(), RigError> {
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(RigError::Setup(
                "display process closed stdout before READY".to_string(),
            ));
        }
        let trimmed = line.trim();
        if trimmed == "READY" {
            return Ok(());
        }
        if !trimmed.is_empty() {
            info!("displayd startup: {trimmed}");
        }
    }
}

async fn relay_output<R: AsyncBufRead + Unpin>(mut reader: R, label: &'static str) {
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    info!("{label}: {trimmed}");
                }
            }
        }
    }
}
