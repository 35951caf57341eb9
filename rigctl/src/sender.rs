//! Simulated E/I data sender.
//!
//! Connects to the display bridge as a TCP client and streams the generator's
//! E/I ratio, one ASCII float per line, at a fixed interval until cancelled
//! or the connection drops. The bridge side keeps listening either way.

use std::time::Duration;

use rtmrs::config::Config;
use rtmrs::metabolite::{Intervention, MetaboliteModel};
use rtmrs::RigError;
use tokio::io::AsyncWriteExt as _;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub host: String,
    pub port: u16,
    pub interval: Duration,
    pub connect_attempts: u32,
    pub connect_retry: Duration,
    pub seed: u64,
    /// One-shot baseline bias applied after a delay into the stream.
    pub intervention: Option<(Intervention, f64, Duration)>,
}

impl SenderConfig {
    pub fn from_config(config: &Config) -> Self {
        let intervention = match config.get_str("sender.intervention", "none").as_str() {
            "excitatory" => Some(Intervention::Excitatory),
            "inhibitory" => Some(Intervention::Inhibitory),
            _ => None,
        }
        .map(|kind| {
            (
                kind,
                config.get_f64("sender.intervention_magnitude", 0.2),
                Duration::from_secs_f64(config.get_f64("sender.intervention_after_seconds", 30.0)),
            )
        });

        Self {
            host: config.get_str("network.ip", "127.0.0.1"),
            port: config.get_u64("network.port", 5005) as u16,
            interval: Duration::from_secs_f64(config.get_f64("sender.interval_seconds", 1.5)),
            connect_attempts: config.get_u64("sender.connect_attempts", 10) as u32,
            connect_retry: Duration::from_secs_f64(
                config.get_f64("sender.connect_retry_seconds", 2.0),
            ),
            seed: config.get_u64("generator.seed", 0),
            intervention,
        }
    }
}

/// Stream generated E/I values until cancelled or the peer goes away.
pub async fn stream_ei(config: &Config, cancel: CancellationToken) -> Result<(), RigError> {
    let cfg = SenderConfig::from_config(config);
    let mut model = MetaboliteModel::new(config, cfg.seed);

    let Some(mut stream) = connect(&cfg, &cancel).await? else {
        return Ok(()); // cancelled while still connecting
    };

    let started = tokio::time::Instant::now();
    let mut pending_intervention = cfg.intervention;
    loop {
        if let Some((kind, magnitude, after)) = pending_intervention {
            if started.elapsed() >= after {
                model.apply_intervention(kind, magnitude);
                pending_intervention = None;
            }
        }

        let value = model.next_value();
        let line = format!("{value:.3}\n");
        if let Err(e) = stream.write_all(line.as_bytes()).await {
            warn!("E/I sender lost the connection: {e}");
            break;
        }
        debug!("Sent E/I ratio {value:.3}");

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(cfg.interval) => {}
        }
    }

    info!("E/I sender finished");
    Ok(())
}

/// Retry the connection a bounded number of times. `None` means cancelled.
async fn connect(
    cfg: &SenderConfig,
    cancel: &CancellationToken,
) -> Result<Option<TcpStream>, RigError> {
    for attempt in 1..=cfg.connect_attempts {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        match TcpStream::connect((cfg.host.as_str(), cfg.port)).await {
            Ok(stream) => {
                info!("E/I sender connected to {}:{}", cfg.host, cfg.port);
                return Ok(Some(stream));
            }
            Err(e) => {
                warn!(
                    "E/I sender connect attempt {attempt}/{} failed: {e}",
                    cfg.connect_attempts
                );
                if attempt < cfg.connect_attempts {
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(None),
                        _ = tokio::time::sleep(cfg.connect_retry) => {}
                    }
                }
            }
        }
    }
    Err(RigError::Setup(format!(
        "could not reach the display bridge at {}:{}",
        cfg.host, cfg.port
    )))
}
