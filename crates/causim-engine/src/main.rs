//! Engine binary for the Causim causal-graph simulator.
//!
//! Runs one simulation session and bridges it to the process's standard
//! streams. Each stdin line is one inbound JSON message and each stdout
//! line is one outbound response. Logs go to stderr so stdout stays a
//! clean message stream.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from the path in the first argument, or from
//!    `causim-config.yaml` when present
//! 2. Initialize structured logging (tracing) on stderr
//! 3. Spawn the session actor and the stdout writer
//! 4. Forward stdin lines to the session until EOF
//! 5. Drain the remaining responses and log the result

mod error;

use std::path::{Path, PathBuf};

use causim_core::config::{CausimConfig, LoggingConfig};
use causim_core::{SessionHandle, spawn_session};
use causim_types::Response;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Config file looked up in the working directory when no path is given.
const DEFAULT_CONFIG_PATH: &str = "causim-config.yaml";

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded, stdin or stdout
/// fail, or the session actor dies.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = load_config(std::env::args_os().nth(1).map(PathBuf::from))?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!(
        dt = config.run.dt,
        steps = config.run.steps,
        interval_ms = config.run.interval_ms,
        channel_capacity = config.session.channel_capacity,
        seeded = config.session.seed.is_some(),
        "causim-engine starting"
    );

    // 3. Spawn the session actor and the stdout writer.
    let (handle, responses, actor) = spawn_session(&config);
    let writer = tokio::spawn(write_responses(responses, tokio::io::stdout()));

    // 4. Forward stdin.
    let forwarded = forward_lines(BufReader::new(tokio::io::stdin()), &handle).await?;
    info!(forwarded, "stdin closed");

    // 5. Drain and shut down.
    drop(handle);
    actor.await.map_err(EngineError::from)?;
    let written = writer.await.map_err(EngineError::from)??;

    info!(forwarded, written, "causim-engine shutdown complete");
    Ok(())
}

/// Load configuration from `explicit`, or from [`DEFAULT_CONFIG_PATH`]
/// if that file exists, or fall back to defaults.
///
/// An explicitly named file must exist.
fn load_config(explicit: Option<PathBuf>) -> Result<CausimConfig, EngineError> {
    if let Some(path) = explicit {
        return Ok(CausimConfig::from_file(&path)?);
    }
    let default_path = Path::new(DEFAULT_CONFIG_PATH);
    if default_path.exists() {
        Ok(CausimConfig::from_file(default_path)?)
    } else {
        // Still honors the environment overrides.
        Ok(CausimConfig::parse("")?)
    }
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// configured level.
fn init_logging(logging: &LoggingConfig) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level)),
        )
        .with_target(true)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Send every non-blank line of `reader` to the session as raw JSON.
///
/// Returns the number of lines forwarded once `reader` reaches EOF.
async fn forward_lines<R>(reader: R, handle: &SessionHandle) -> Result<u64, EngineError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded: u64 = 0;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        handle.send_raw(line).await?;
        forwarded = forwarded.saturating_add(1);
    }
    Ok(forwarded)
}

/// Write each response as one JSON line until the channel closes.
///
/// Flushes after every line so a reader on the other end of a pipe sees
/// responses as they happen.
async fn write_responses<W>(
    mut responses: mpsc::Receiver<Response>,
    mut out: W,
) -> Result<u64, EngineError>
where
    W: AsyncWrite + Unpin,
{
    let mut written: u64 = 0;
    while let Some(response) = responses.recv().await {
        let mut line = serde_json::to_vec(&response)?;
        line.push(b'\n');
        out.write_all(&line).await?;
        out.flush().await?;
        written = written.saturating_add(1);
    }
    Ok(written)
}
