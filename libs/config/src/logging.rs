//! Process logging
//!
//! One global `tracing` subscriber per process. Writes to a file go through
//! a mutex so concurrent server and client threads never interleave lines.

use anyhow::{anyhow, Context, Result};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber
///
/// `RUST_LOG` overrides `default_level`. With `output` set the file is
/// truncated and receives every line without ANSI colors; otherwise logs go
/// to stdout. Fails if a subscriber is already installed.
///
/// The file writer appends, so other handles may add to the same file (the
/// server's metrics report) without later log lines overwriting them.
pub fn init_logging(output: Option<&Path>, default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .with_context(|| format!("Invalid log filter '{default_level}'"))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = match output {
        Some(path) => {
            let file = open_log_file(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.try_init(),
    };

    installed.map_err(|e| anyhow!("Failed to install log subscriber: {e}"))
}

/// Truncate `path`, then reopen it in append mode
fn open_log_file(path: &Path) -> io::Result<File> {
    File::create(path)?;
    OpenOptions::new().append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_log_writer_never_overwrites_other_appenders() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server_output.txt");
        std::fs::write(&path, "left over from the last run\n").unwrap();

        let mut log = open_log_file(&path).unwrap();
        writeln!(log, "INFO Server listening").unwrap();

        let mut report = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(report, "=== SERVER METRICS ===").unwrap();

        writeln!(log, "INFO Server exited").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "INFO Server listening\n=== SERVER METRICS ===\nINFO Server exited\n"
        );
    }
}
