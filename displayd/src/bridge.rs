//! Network bridge: TCP in, display updates out.
//!
//! One bridge task per active streaming visualization. It owns the listening
//! socket, accepts at most one client at a time, parses newline-terminated
//! ASCII floats, and enqueues [`DisplayUpdate`]s. It never touches the screen.
//!
//! Every socket operation is bounded by a short timeout so the cancellation
//! token is observed promptly; shutdown latency is at most one accept or one
//! receive interval.

use std::time::Duration;

use rtmrs::config::Config;
use rtmrs::protocol::{circle_diameter_px, DisplayUpdate};
use tokio::io::AsyncReadExt as _;
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
    pub accept_timeout: Duration,
    pub recv_timeout: Duration,
    pub data_timeout: Duration,
}

impl BridgeConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.get_str("network.ip", "127.0.0.1"),
            port: config.get_u64("network.port", 5005) as u16,
            accept_timeout: Duration::from_millis(
                config.get_u64("ei_task.accept_timeout_ms", 500),
            ),
            recv_timeout: Duration::from_millis(config.get_u64("ei_task.recv_timeout_ms", 100)),
            data_timeout: Duration::from_secs_f64(
                config.get_f64("ei_task.data_timeout_seconds", 10.0),
            ),
        }
    }
}

pub fn spawn(
    config: BridgeConfig,
    updates: UnboundedSender<DisplayUpdate>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run(config, updates, cancel))
}

async fn run(config: BridgeConfig, updates: UnboundedSender<DisplayUpdate>, cancel: CancellationToken) {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = match bind(&addr) {
        Ok(l) => l,
        Err(e) => {
            // Fatal to this bridge only; the session stays up.
            error!("E/I bridge could not listen on {addr}: {e}");
            let _ = updates.send(DisplayUpdate::StatusText(format!("E/I: Server error: {e}")));
            return;
        }
    };
    info!("E/I bridge listening on {addr}");
    let _ = updates.send(DisplayUpdate::StatusText(format!(
        "E/I: Waiting for client on {addr}"
    )));

    while !cancel.is_cancelled() {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            res = timeout(config.accept_timeout, listener.accept()) => res,
        };
        let (stream, peer) = match accepted {
            Err(_) => continue, // accept timed out, re-check cancellation
            Ok(Err(e)) => {
                warn!("E/I bridge accept error: {e}");
                continue;
            }
            Ok(Ok(conn)) => conn,
        };

        info!("E/I client connected from {peer}");
        let _ = updates.send(DisplayUpdate::StatusText(format!(
            "E/I: Client connected from {}",
            peer.ip()
        )));
        serve_client(stream, &config, &updates, &cancel).await;
    }

    info!("E/I bridge finished");
}

fn bind(addr: &str) -> std::io::Result<tokio::net::TcpListener> {
    let addr = addr
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(1)
}

/// Read one client until it disconnects, times out, errors, or we are
/// cancelled. Returning means "go back to accepting" unless cancelled.
async fn serve_client(
    mut stream: TcpStream,
    config: &BridgeConfig,
    updates: &UnboundedSender<DisplayUpdate>,
    cancel: &CancellationToken,
) {
    let mut buf = [0u8; 1024];
    let mut pending = Vec::new();
    let mut last_data = Instant::now();

    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => return,
            res = timeout(config.recv_timeout, stream.read(&mut buf)) => res,
        };
        match read {
            Err(_) => {
                // Receive timed out: no new bytes this interval.
                if last_data.elapsed() > config.data_timeout {
                    info!("E/I client data timeout, closing connection");
                    let _ = updates.send(DisplayUpdate::StatusText(
                        "E/I: Client timed out. Waiting...".to_string(),
                    ));
                    return;
                }
            }
            Ok(Ok(0)) => {
                info!("E/I client disconnected");
                let _ = updates.send(DisplayUpdate::StatusText(
                    "E/I: Client disconnected. Waiting...".to_string(),
                ));
                return;
            }
            Ok(Ok(n)) => {
                last_data = Instant::now();
                pending.extend_from_slice(&buf[..n]);
                drain_lines(&mut pending, updates);
            }
            Ok(Err(e)) => {
                warn!("E/I network error: {e}");
                let _ = updates.send(DisplayUpdate::StatusText(
                    "E/I: Network error. Waiting...".to_string(),
                ));
                return;
            }
        }
    }
}

/// Split complete lines off the buffer and emit updates for each valid value.
/// Malformed lines are logged and discarded; the connection stays open.
fn drain_lines(pending: &mut Vec<u8>, updates: &UnboundedSender<DisplayUpdate>) {
    while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
        let line: Vec<u8> = pending.drain(..=pos).collect();
        let text = String::from_utf8_lossy(&line);
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        match text.parse::<f64>() {
            Ok(value) => {
                let _ = updates.send(DisplayUpdate::CircleSize(circle_diameter_px(value)));
                let _ = updates.send(DisplayUpdate::StatusText(format!("E/I Ratio: {value:.2}")));
            }
            Err(_) => warn!("E/I invalid data: {text:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt as _;
    use tokio::sync::mpsc;

    fn test_config(port: u16) -> BridgeConfig {
        BridgeConfig {
            host: "127.0.0.1".to_string(),
            port,
            accept_timeout: Duration::from_millis(50),
            recv_timeout: Duration::from_millis(20),
            data_timeout: Duration::from_millis(200),
        }
    }

    async fn connect(port: u16) -> TcpStream {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            match TcpStream::connect(("127.0.0.1", port)).await {
                Ok(s) => return s,
                Err(_) if Instant::now() < deadline => {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                Err(e) => panic!("could not connect to bridge: {e}"),
            }
        }
    }

    async fn next_update(rx: &mut mpsc::UnboundedReceiver<DisplayUpdate>) -> DisplayUpdate {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for update")
            .expect("update channel closed")
    }

    async fn skip_status_until_circle(
        rx: &mut mpsc::UnboundedReceiver<DisplayUpdate>,
    ) -> DisplayUpdate {
        loop {
            match next_update(rx).await {
                DisplayUpdate::StatusText(_) => continue,
                circle => return circle,
            }
        }
    }

    #[tokio::test]
    async fn value_round_trip() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = spawn(test_config(47331), tx, cancel.clone());

        let mut client = connect(47331).await;
        client.write_all(b"0.85\n").await.unwrap();

        // Listening + connected status first, then the value pair.
        let circle = skip_status_until_circle(&mut rx).await;
        assert_eq!(circle, DisplayUpdate::CircleSize(17));
        match next_update(&mut rx).await {
            DisplayUpdate::StatusText(s) => assert!(s.contains("0.85"), "status was {s:?}"),
            other => panic!("expected status, got {other:?}"),
        }

        cancel.cancel();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn malformed_line_keeps_connection_open() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = spawn(test_config(47332), tx, cancel.clone());

        let mut client = connect(47332).await;
        client.write_all(b"not-a-number\n").await.unwrap();
        client.write_all(b"7.25\n").await.unwrap();

        // The malformed line produces nothing; the valid one still arrives.
        let circle = skip_status_until_circle(&mut rx).await;
        assert_eq!(circle, DisplayUpdate::CircleSize(145));
        match next_update(&mut rx).await {
            DisplayUpdate::StatusText(s) => assert!(s.contains("7.25")),
            other => panic!("expected status, got {other:?}"),
        }

        cancel.cancel();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn split_writes_reassemble_into_lines() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = spawn(test_config(47333), tx, cancel.clone());

        let mut client = connect(47333).await;
        client.write_all(b"1.").await.unwrap();
        client.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        client.write_all(b"5\n").await.unwrap();

        let circle = skip_status_until_circle(&mut rx).await;
        assert_eq!(circle, DisplayUpdate::CircleSize(30));

        cancel.cancel();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn data_timeout_disconnects_and_resumes_accepting() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = spawn(test_config(47334), tx, cancel.clone());

        let mut client = connect(47334).await;
        client.write_all(b"2.0\n").await.unwrap();
        let _ = skip_status_until_circle(&mut rx).await;
        let _ = next_update(&mut rx).await; // status for 2.0

        // Go silent past the data timeout.
        let status = loop {
            match next_update(&mut rx).await {
                DisplayUpdate::StatusText(s) if s.contains("timed out") => break s,
                _ => continue,
            }
        };
        assert!(status.contains("Waiting"));

        // A new client is accepted afterwards.
        let mut second = connect(47334).await;
        second.write_all(b"3.0\n").await.unwrap();
        let circle = skip_status_until_circle(&mut rx).await;
        assert_eq!(circle, DisplayUpdate::CircleSize(60));

        cancel.cancel();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn cancellation_bounds_shutdown_latency() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let config = test_config(47335);
        let budget = config.accept_timeout + config.recv_timeout + Duration::from_millis(500);
        let handle = spawn(config, tx, cancel.clone());

        // Wait for the listening status so the bridge is definitely up.
        let _ = next_update(&mut rx).await;

        let started = Instant::now();
        cancel.cancel();
        timeout(budget, handle)
            .await
            .expect("bridge did not stop within its timeout budget")
            .unwrap();
        assert!(started.elapsed() <= budget);
    }

    #[tokio::test]
    async fn bind_failure_emits_error_status_and_exits() {
        // Occupy the port with a plain listener first.
        let blocker = std::net::TcpListener::bind("127.0.0.1:47336").unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = spawn(test_config(47336), tx, cancel.clone());

        match next_update(&mut rx).await {
            DisplayUpdate::StatusText(s) => assert!(s.contains("Server error"), "got {s:?}"),
            other => panic!("expected error status, got {other:?}"),
        }
        timeout(Duration::from_secs(1), handle)
            .await
            .expect("bridge task should exit after bind failure")
            .unwrap();
        drop(blocker);
    }
}
