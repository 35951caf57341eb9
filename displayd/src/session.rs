//! The display session: one loop, one owner of the screen.
//!
//! State machine: Initializing → Standby ⇄ RunningBlockingTask / StreamingActive,
//! any state → ShuttingDown. Transitions are driven only by dequeued commands;
//! nothing outside this module mutates the screen.
//!
//! Per-frame loop: drain all queued commands (a blocking task intentionally
//! delays later commands; tasks are exclusive), drain display updates while
//! streaming, poll the cancel key, one flip, short yield.

use std::time::Duration;

use rtmrs::config::Config;
use rtmrs::protocol::{Command, DisplayUpdate};
use rtmrs::recording::SessionRecorder;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bridge::{self, BridgeConfig};
use crate::screen::{Key, Screen};
use crate::tasks::{self, TaskOutcome};

pub const STANDBY_TEXT: &str = "Standby. Please wait for task selection.";
const ENTER_PROMPT: &str = "\n\n(Press Enter to continue)";
const FRAME: Duration = Duration::from_millis(20);
const BRIDGE_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Per-streaming-task state. Created on `run_ei_task`, cleared on stop.
struct EiStream {
    updates: UnboundedReceiver<DisplayUpdate>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct DisplaySession<S: Screen> {
    screen: S,
    config: Config,
    commands: UnboundedReceiver<Command>,
    /// Used to requeue follow-up commands (completion message, standby) so
    /// they flow through the same dispatch path as external ones.
    requeue: UnboundedSender<Command>,
    shutdown: CancellationToken,
    recorder: SessionRecorder,
    streaming: Option<EiStream>,
}

impl<S: Screen> DisplaySession<S> {
    pub fn new(
        screen: S,
        config: Config,
        commands: UnboundedReceiver<Command>,
        requeue: UnboundedSender<Command>,
        shutdown: CancellationToken,
        recorder: SessionRecorder,
    ) -> Self {
        Self {
            screen,
            config,
            commands,
            requeue,
            shutdown,
            recorder,
            streaming: None,
        }
    }

    pub fn streaming_active(&self) -> bool {
        self.streaming.is_some()
    }

    /// Main loop. Returns once the shutdown token fires (exit command, stdin
    /// EOF, or an unrecoverable flip failure).
    pub async fn run(mut self) {
        self.screen
            .set_message("Display manager initialized.\nWaiting for commands...");
        let _ = self.screen.flip();

        while !self.shutdown.is_cancelled() {
            self.tick().await;
            tokio::time::sleep(FRAME).await;
        }

        info!("Display session shutting down");
        self.stop_ei_task().await;
        let _ = self.recorder.finish();
    }

    /// One frame: commands, then updates, then the cancel key, then a flip.
    pub async fn tick(&mut self) {
        while let Ok(cmd) = self.commands.try_recv() {
            debug!("Dispatching command: {cmd:?}");
            if let Err(e) = self.dispatch(cmd).await {
                // A bad command must not take the session down: show the
                // error, then reassert standby.
                error!("Command dispatch failed: {e}");
                let _ = self
                    .requeue
                    .send(Command::show_text(format!("Error: {e}"), false));
                let _ = self.requeue.send(Command::ShowStandby);
            }
        }

        self.apply_pending_updates();

        match self.screen.poll_key(Duration::ZERO) {
            Ok(Some(Key::Escape)) if self.streaming.is_some() => {
                info!("Escape pressed, stopping E/I task");
                self.stop_ei_task().await;
                self.show_standby();
            }
            Ok(_) => {}
            Err(e) => warn!("Key poll failed: {e}"),
        }

        if let Err(e) = self.screen.flip() {
            error!("Display refresh failed: {e}");
            self.shutdown.cancel();
        }
    }

    fn apply_pending_updates(&mut self) {
        let Some(stream) = self.streaming.as_mut() else {
            return;
        };
        while let Ok(update) = stream.updates.try_recv() {
            match update {
                DisplayUpdate::StatusText(text) => self.screen.set_status(&text),
                DisplayUpdate::CircleSize(diameter) => self.screen.set_circle(Some(diameter)),
            }
        }
    }

    async fn dispatch(&mut self, cmd: Command) -> Result<(), std::io::Error> {
        match cmd {
            Command::ShowText {
                content,
                wait_for_enter,
            } => {
                let text = if wait_for_enter {
                    format!("{content}{ENTER_PROMPT}")
                } else {
                    content
                };
                self.screen.clear();
                self.screen.set_message(&text);
                self.screen.flip()?;
                if wait_for_enter {
                    self.wait_for_ack().await?;
                    self.screen.clear();
                    self.screen.flip()?;
                }
            }
            Command::ShowStandby => self.show_standby(),
            Command::ClearScreen => {
                self.screen.clear();
                self.screen.flip()?;
            }
            Command::RunM1Task => self.run_blocking_task(BlockingTask::M1).await?,
            Command::RunV1Task => self.run_blocking_task(BlockingTask::V1).await?,
            Command::RunEiTask => self.start_ei_task(),
            Command::StopEiTask => {
                self.stop_ei_task().await;
                self.show_standby();
            }
            Command::Exit => {
                info!("Exit command received");
                self.shutdown.cancel();
            }
        }
        Ok(())
    }

    fn show_standby(&mut self) {
        self.screen.clear();
        self.screen.set_message(STANDBY_TEXT);
    }

    /// Sub-loop for `wait_for_enter`: the window keeps flipping so it stays
    /// responsive, and Escape cancels the wait.
    async fn wait_for_ack(&mut self) -> Result<(), std::io::Error> {
        loop {
            if self.shutdown.is_cancelled() {
                return Ok(());
            }
            match self.screen.poll_key(Duration::from_millis(10))? {
                Some(Key::Enter) | Some(Key::Escape) => return Ok(()),
                _ => {}
            }
            self.screen.flip()?;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn run_blocking_task(&mut self, task: BlockingTask) -> Result<(), std::io::Error> {
        self.screen.clear();
        self.screen.set_message(&format!("Starting {}...", task.title()));
        self.screen.flip()?;
        tokio::time::sleep(Duration::from_millis(500)).await;
        self.screen.clear();
        self.screen.flip()?;

        let result = match task {
            BlockingTask::M1 => {
                let cfg = tasks::m1::M1Config::from_config(&self.config);
                tasks::m1::run_m1_experiment(&mut self.screen, &cfg, &mut self.recorder).await
            }
            BlockingTask::V1 => {
                let cfg = tasks::v1::V1Config::from_config(&self.config);
                tasks::v1::run_v1_experiment(&mut self.screen, &cfg, &mut self.recorder).await
            }
        };

        // Completion/error messages flow through the queue so the normal
        // frame loop shows them, exactly like externally sent commands.
        let follow_up = match result {
            Ok(TaskOutcome::Completed) => format!("{} Complete.", task.title()),
            Ok(TaskOutcome::Aborted) => {
                info!("{} aborted by operator", task.title());
                format!("{} aborted.", task.title())
            }
            Err(e) => {
                error!("Error during {}: {e}", task.title());
                format!("Error during {}: {e}", task.title())
            }
        };
        let _ = self.requeue.send(Command::show_text(follow_up, false));
        let _ = self.requeue.send(Command::ShowStandby);
        Ok(())
    }

    /// Enter StreamingActive. Rejected (log + no-op) while already active so
    /// the TCP port is never double-bound.
    fn start_ei_task(&mut self) {
        if self.streaming.is_some() {
            warn!("E/I task already active, ignoring start request");
            return;
        }

        let initial_radius = self.config.get_u64("ei_task.initial_radius_pix", 50) as u32;
        self.screen.clear();
        self.screen.set_circle(Some(initial_radius * 2));
        self.screen.set_status("E/I: Waiting for client...");

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = bridge::spawn(BridgeConfig::from_config(&self.config), tx, cancel.clone());

        self.streaming = Some(EiStream {
            updates: rx,
            cancel,
            handle,
        });
        info!("E/I streaming task started");
    }

    /// Leave StreamingActive: cancel, bounded join, detach stimuli, drain
    /// residual updates. Idempotent: a stop with no active task is a no-op.
    pub async fn stop_ei_task(&mut self) {
        let Some(stream) = self.streaming.take() else {
            debug!("Stop requested but no E/I task is active");
            return;
        };

        stream.cancel.cancel();
        let mut handle = stream.handle;
        if timeout(BRIDGE_JOIN_TIMEOUT, &mut handle).await.is_err() {
            // A wedged bridge must not keep us out of standby.
            warn!("E/I bridge did not stop within {BRIDGE_JOIN_TIMEOUT:?}, detaching");
            handle.abort();
        }

        let mut updates = stream.updates;
        while updates.try_recv().is_ok() {}

        self.screen.set_circle(None);
        self.screen.set_status("");
        info!("E/I streaming task stopped");
    }
}

#[derive(Debug, Clone, Copy)]
enum BlockingTask {
    M1,
    V1,
}

impl BlockingTask {
    fn title(self) -> &'static str {
        match self {
            BlockingTask::M1 => "M1 Tapping Task",
            BlockingTask::V1 => "V1 Orientation Task",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screen::fake::FakeScreen;
    use serde_json::json;

    struct Harness {
        session: DisplaySession<FakeScreen>,
        tx: UnboundedSender<Command>,
        shutdown: CancellationToken,
        _dir: tempfile::TempDir,
    }

    fn harness(screen: FakeScreen, config: serde_json::Value) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let recorder = SessionRecorder::begin(dir.path(), "test", "001", "session_test").unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let session = DisplaySession::new(
            screen,
            Config::from_value(config),
            rx,
            tx.clone(),
            shutdown.clone(),
            recorder,
        );
        Harness {
            session,
            tx,
            shutdown,
            _dir: dir,
        }
    }

    fn ei_config(port: u16) -> serde_json::Value {
        json!({
            "network": { "ip": "127.0.0.1", "port": port },
            "ei_task": {
                "accept_timeout_ms": 50,
                "recv_timeout_ms": 20,
                "data_timeout_seconds": 5.0
            }
        })
    }

    #[tokio::test]
    async fn commands_dispatch_in_order() {
        let mut h = harness(FakeScreen::new(), json!({}));
        for text in ["first", "second", "third"] {
            h.tx.send(Command::show_text(text, false)).unwrap();
        }
        h.session.tick().await;
        assert_eq!(h.session.screen.message(), "third");
        assert_eq!(
            h.session.screen.message_history(),
            vec!["first", "second", "third"]
        );
    }

    #[tokio::test]
    async fn standby_clears_previous_stimuli() {
        let mut h = harness(FakeScreen::new(), json!({}));
        h.tx.send(Command::show_text("hello", false)).unwrap();
        h.tx.send(Command::ShowStandby).unwrap();
        h.session.tick().await;
        assert_eq!(h.session.screen.message(), STANDBY_TEXT);
        assert!(h.session.screen.circle().is_none());
    }

    #[tokio::test]
    async fn second_ei_start_is_rejected() {
        let mut h = harness(FakeScreen::new(), ei_config(47341));
        h.tx.send(Command::RunEiTask).unwrap();
        h.tx.send(Command::RunEiTask).unwrap();
        h.session.tick().await;
        assert!(h.session.streaming_active());

        // Stopping once is enough: the second start never bound anything.
        h.session.stop_ei_task().await;
        assert!(!h.session.streaming_active());
    }

    #[tokio::test]
    async fn stop_without_active_task_is_noop() {
        let mut h = harness(FakeScreen::new(), json!({}));
        h.session.stop_ei_task().await;
        assert!(!h.session.streaming_active());

        h.tx.send(Command::StopEiTask).unwrap();
        h.session.tick().await;
        assert!(!h.session.streaming_active());
        // The session falls back to standby, nothing panicked.
        assert_eq!(h.session.screen.message(), STANDBY_TEXT);
    }

    #[tokio::test]
    async fn streamed_value_reaches_the_screen() {
        let mut h = harness(FakeScreen::new(), ei_config(47342));
        h.tx.send(Command::RunEiTask).unwrap();
        h.session.tick().await;

        let mut client = None;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while client.is_none() && tokio::time::Instant::now() < deadline {
            client = tokio::net::TcpStream::connect(("127.0.0.1", 47342)).await.ok();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let mut client = client.expect("could not connect to session bridge");
        use tokio::io::AsyncWriteExt as _;
        client.write_all(b"0.85\n").await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            h.session.tick().await;
            if h.session.screen.circle() == Some(17)
                && h.session.screen.status().contains("0.85")
            {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "update never applied; status={:?} circle={:?}",
                h.session.screen.status(),
                h.session.screen.circle()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        h.session.stop_ei_task().await;
    }

    #[tokio::test]
    async fn escape_stops_streaming() {
        let screen = FakeScreen::with_keys(vec![None, Some(Key::Escape)]);
        let mut h = harness(screen, ei_config(47343));
        h.tx.send(Command::RunEiTask).unwrap();
        h.session.tick().await;
        assert!(h.session.streaming_active());

        h.session.tick().await; // consumes the scripted Escape
        assert!(!h.session.streaming_active());
        assert_eq!(h.session.screen.message(), STANDBY_TEXT);
    }

    #[tokio::test]
    async fn exit_command_fires_shutdown() {
        let mut h = harness(FakeScreen::new(), json!({}));
        h.tx.send(Command::Exit).unwrap();
        h.session.tick().await;
        assert!(h.shutdown.is_cancelled());
    }
}
