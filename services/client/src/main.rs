//! Framelink Client
//!
//! Connects once (with retry), then either sends the scripted `message=`
//! lines from its settings or reads messages from stdin until `quit`/`exit`.
//! A failed send is logged and the session carries on.

use anyhow::{Context, Result};
use clap::Parser;
use framelink_config::{init_logging, load_settings, ClientSettings};
use framelink_network::{ClientSession, SocketMode};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "framelink-client")]
#[command(about = "Send text messages to a framelink server")]
struct Args {
    /// Settings file (`.toml`, or key=value input)
    #[arg(short, long, default_value = "client_input.txt")]
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

    /// Socket timeout in seconds (0 disables)
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Read messages from stdin
    #[arg(short, long)]
    interactive: bool,

    /// Log file, overrides the settings file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings: ClientSettings = load_settings(&args.config)
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
    if let Some(timeout) = args.timeout {
        settings.timeout_secs = timeout;
    }
    if args.interactive {
        settings.interactive = true;
    }
    if let Some(path) = args.log_file {
        settings.output = path;
    }

    init_logging(Some(&settings.output), &args.log_level)?;

    let (settings, tls_corrected) = settings.normalized();
    if tls_corrected {
        warn!("TLS requested for Unix mode; disabling TLS because it is not required");
    }

    let mut client = ClientSession::new(settings.mode, settings.address(), settings.tls)
        .inspect_err(|e| error!(error = %e, "Failed to initialize client"))
        .context("Failed to initialize client")?;

    info!(address = settings.address(), "Connecting to server");
    client
        .connect(Duration::from_secs(settings.timeout_secs))
        .inspect_err(|e| error!(error = %e, "Failed to connect to server"))
        .context("Failed to connect to server")?;
    info!("Connected successfully");

    if settings.interactive {
        println!("Connected. Type messages to send (type 'quit' or 'exit' to close):");
        io::stdout().flush().ok();
        run_interactive(&mut client, io::stdin().lock())?;
    } else {
        for message in &settings.messages {
            send_logged(&mut client, message);
        }
    }

    client.disconnect();
    Ok(())
}

/// Send one message and log the outcome
fn send_logged(client: &mut ClientSession, text: &str) {
    info!("Sending message: {text}");
    match client.send_text_and_await_ack(text) {
        Ok(()) => info!("Message sent successfully: {text}"),
        Err(e) => error!(error = %e, "Failed to send message: {text}"),
    }
}

/// Send each input line until `quit`, `exit` or end of input
///
/// Returns how many lines were submitted, acknowledged or not.
fn run_interactive(client: &mut ClientSession, input: impl BufRead) -> Result<usize> {
    let mut submitted = 0;
    for line in input.lines() {
        let line = line.context("Failed to read from stdin")?;
        let line = line.trim_end_matches('\r');
        if line == "quit" || line == "exit" {
            break;
        }
        if line.is_empty() {
            continue;
        }
        send_logged(client, line);
        submitted += 1;
    }
    Ok(submitted)
}
