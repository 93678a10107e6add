//! Framelink Server
//!
//! Reads settings (default `server_input.txt`), logs to the output file
//! (default `server_output.txt`), serves until SIGINT/SIGTERM, then appends
//! a metrics report to the same file.

use anyhow::{Context, Result};
use clap::Parser;
use framelink_config::{init_logging, load_settings, ServerSettings};
use framelink_network::{ClientId, Message, MessageType, MetricsSnapshot, Server, SocketMode};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "framelink-server")]
#[command(about = "Framed message server over Unix or TCP sockets")]
struct Args {
    /// Settings file (`.toml`, or key=value input)
    #[arg(short, long, default_value = "server_input.txt")]
    config: PathBuf,

    /// Socket mode (unix or inet), overrides the settings file
    #[arg(short, long)]
    mode: Option<SocketMode>,

    /// Socket path or host[:port], overrides the settings file
    #[arg(short, long)]
    address: Option<String>,

    /// Enable TLS (inet only)
    #[arg(long)]
    tls: bool,

    /// Log and report file, overrides the settings file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings: ServerSettings = load_settings(&args.config)
        .with_context(|| format!("Failed to read settings from {}", args.config.display()))?;
    if let Some(mode) = args.mode {
        settings.mode = mode;
    }
    if let Some(address) = args.address {
        settings.address = Some(address);
    }
    if args.tls {
        settings.tls = true;
    }
    if let Some(path) = args.log_file {
        settings.output = path;
    }

    init_logging(Some(&settings.output), &args.log_level)?;

    let (settings, tls_corrected) = settings.normalized();
    if tls_corrected {
        warn!("TLS requested for Unix mode; disabling TLS because it is not required");
    }
    info!(
        mode = %settings.mode,
        address = settings.address(),
        tls = settings.tls,
        "Server configuration"
    );

    let mut server = Server::new(settings.mode, settings.address(), settings.tls)
        .inspect_err(|e| error!(error = %e, "Failed to initialize server"))
        .context("Failed to initialize server")?;

    let handle = server.handle();
    ctrlc::set_handler(move || {
        info!("Received signal, shutting down");
        handle.stop();
    })
    .context("Failed to install signal handler")?;

    info!("Starting server");
    if let Err(e) = server.start(log_text_message) {
        error!(error = %e, "Server failed");
        return Err(e).context("Server failed");
    }

    let snapshot = server.metrics();
    server.cleanup();
    info!("Server exited");
    // last write to the output file; nothing logs after the report
    append_report(&settings.output, &server, &snapshot)
}

fn log_text_message(client: ClientId, message: &Message) {
    if matches!(message.message_type(), Ok(MessageType::Text)) {
        info!(
            client_id = %client,
            "Received text message: {}",
            String::from_utf8_lossy(message.payload())
        );
    }
}

fn append_report(path: &Path, server: &Server, snapshot: &MetricsSnapshot) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {} for the metrics report", path.display()))?;
    write_report(
        &mut file,
        server.mode(),
        server.address(),
        server.tls_enabled(),
        snapshot,
    )
    .context("Failed to write metrics report")
}

/// End-of-run report; "latency" is the mean gap between message arrivals
fn write_report(
    out: &mut impl Write,
    mode: SocketMode,
    address: &str,
    tls: bool,
    metrics: &MetricsSnapshot,
) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "=== SERVER METRICS ===")?;
    writeln!(out, "Mode: {mode}")?;
    writeln!(out, "Address: {address}")?;
    if mode == SocketMode::Inet {
        writeln!(out, "TLS Enabled: {}", if tls { "Yes" } else { "No" })?;
    }
    writeln!(out, "Total Clients: {}", metrics.total_clients)?;
    writeln!(out, "Total Messages Received: {}", metrics.total_messages)?;
    writeln!(out, "Uptime: {:.2} seconds", metrics.uptime.as_secs_f64())?;
    writeln!(out, "Message Rate: {:.2} msg/s", metrics.message_rate())?;
    writeln!(out, "Average Latency: {:.2} ms", metrics.avg_interval_ms)?;
    writeln!(out, "Throughput: {:.4} MB/s", metrics.throughput_mbps)?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            total_clients: 2,
            total_messages: 10,
            total_bytes: 1_048_576,
            uptime: Duration::from_secs(4),
            throughput_mbps: 0.25,
            avg_interval_ms: 12.5,
            min_interval_ms: 1.0,
            max_interval_ms: 40.0,
        }
    }

    #[test]
    fn test_inet_report_includes_tls_line() {
        let mut out = Vec::new();
        write_report(&mut out, SocketMode::Inet, "localhost:8080", true, &snapshot()).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("\n=== SERVER METRICS ===\n"));
        assert!(text.contains("Mode: inet\n"));
        assert!(text.contains("TLS Enabled: Yes\n"));
        assert!(text.contains("Total Messages Received: 10\n"));
        assert!(text.contains("Uptime: 4.00 seconds\n"));
        assert!(text.contains("Message Rate: 2.50 msg/s\n"));
        assert!(text.contains("Average Latency: 12.50 ms\n"));
        assert!(text.contains("Throughput: 0.2500 MB/s\n"));
    }

    #[test]
    fn test_unix_report_omits_tls_line() {
        let mut out = Vec::new();
        write_report(&mut out, SocketMode::Unix, "/tmp/server.sock", false, &snapshot()).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Address: /tmp/server.sock\n"));
        assert!(!text.contains("TLS Enabled"));
    }

    #[test]
    fn test_cli_overrides_parse() {
        let args = Args::parse_from(["framelink-server", "--mode", "unix", "--tls", "-a", "/tmp/a.sock"]);
        assert_eq!(args.mode, Some(SocketMode::Unix));
        assert!(args.tls);
        assert_eq!(args.address.as_deref(), Some("/tmp/a.sock"));
        assert_eq!(args.config, PathBuf::from("server_input.txt"));
    }
}
