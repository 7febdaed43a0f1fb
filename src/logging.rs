use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_ENV_VAR: &str = "COMMIT_TASKLOG_LOG";

/// Stderr output held back while the terminal dialog owns the screen.
static HELD: Mutex<Option<Vec<u8>>> = Mutex::new(None);

/// Stderr writer that buffers instead of writing while output is held.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrWriter;

impl Write for StderrWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Ok(mut guard) = HELD.lock()
            && let Some(held) = guard.as_mut()
        {
            held.extend_from_slice(buf);
            return Ok(buf.len());
        }
        io::stderr().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

/// Buffer stderr log output until [`release_stderr`].
pub fn hold_stderr() {
    if let Ok(mut guard) = HELD.lock() {
        guard.get_or_insert_with(Vec::new);
    }
}

/// Stop buffering and write out everything held so far.
pub fn release_stderr() {
    let held = HELD.lock().ok().and_then(|mut guard| guard.take());
    if let Some(bytes) = held
        && !bytes.is_empty()
    {
        let _ = io::stderr().write_all(&bytes);
    }
}

/// Install the global subscriber.
///
/// Filter comes from `COMMIT_TASKLOG_LOG` (default `warn`). With a log file
/// configured, events are appended there; otherwise they go to stderr, held
/// back while the dialog is on screen (see [`hold_stderr`]).
pub fn setup(log_file: Option<&Path>) -> Result<()> {
    let env_filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry();

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let fmt_layer = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(env_filter);
            registry.with(fmt_layer).try_init()?;
        }
        None => {
            let fmt_layer = fmt::layer()
                .with_target(true)
                .without_time()
                .with_writer(|| StderrWriter)
                .with_filter(env_filter);
            registry.with(fmt_layer).try_init()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn held_output_is_buffered_until_released() {
        hold_stderr();
        StderrWriter.write_all(b"refresh failed\n").unwrap();
        assert_eq!(
            HELD.lock().unwrap().as_deref(),
            Some(b"refresh failed\n".as_slice())
        );

        release_stderr();
        assert!(HELD.lock().unwrap().is_none());
    }
}
