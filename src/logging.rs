//! Process-wide logging setup.
//!
//! Each binary calls [`init`] exactly once. Output goes to the console and to
//! an append-only log file under the application data directory. `displayd`
//! must keep its stdout clean for the supervisor readback, so it selects the
//! stderr console stream.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleStream {
    Stdout,
    Stderr,
}

/// Install the global subscriber: console layer + file layer.
///
/// The file is opened in append mode so repeated runs accumulate. A file that
/// cannot be opened downgrades to console-only (reported on stderr, not
/// fatal). Calling twice is a no-op for the second caller.
pub fn init(log_file: &Path, console: ConsoleStream) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let console_writer = match console {
        ConsoleStream::Stdout => BoxMakeWriter::new(std::io::stdout),
        ConsoleStream::Stderr => BoxMakeWriter::new(std::io::stderr),
    };
    let console_layer = tracing_subscriber::fmt::layer().with_writer(console_writer);

    let file_layer = match OpenOptions::new().create(true).append(true).open(log_file) {
        Ok(file) => Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        ),
        Err(e) => {
            eprintln!("Could not open log file {log_file:?}: {e}; logging to console only");
            None
        }
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();
}
