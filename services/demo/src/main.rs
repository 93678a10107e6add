//! Framelink Demo
//!
//! Runs a server and three clients in one process: each client sends three
//! messages, then disconnects. Logs go to stdout.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use framelink_config::{default_address, init_logging};
use framelink_network::{ClientId, ClientSession, Message, Server, SocketMode};
use std::thread;
use std::time::Duration;
use tracing::{error, info};

const CLIENTS: usize = 3;
const MESSAGES_PER_CLIENT: usize = 3;
const CLIENT_STAGGER: Duration = Duration::from_millis(200);
const MESSAGE_GAP: Duration = Duration::from_millis(100);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "framelink-demo")]
#[command(about = "Run a framelink server with a few clients in one process")]
struct Args {
    /// Socket mode (unix or inet)
    #[arg(short, long, default_value_t = SocketMode::Inet)]
    mode: SocketMode,

    /// Socket path or host[:port]; defaults by mode
    #[arg(short, long)]
    address: Option<String>,

    /// Enable TLS (inet only)
    #[arg(long)]
    tls: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(None, "info")?;

    let address = args
        .address
        .unwrap_or_else(|| default_address(args.mode).to_string());
    run_demo(args.mode, &address, args.tls)
}

fn log_message(client: ClientId, message: &Message) {
    let text = String::from_utf8_lossy(message.payload());
    let preview: String = text.chars().take(50).collect();
    info!("Client {client} sent text: {preview}");
}

/// Serve on `address` until every client has finished
fn run_demo(mode: SocketMode, address: &str, tls: bool) -> Result<()> {
    let mut server = Server::new(mode, address, tls).context("Failed to initialize server")?;
    server.bind().context("Failed to bind server")?;

    // port 0 resolves to whatever the listener was given
    let connect_address = match server.local_addr() {
        Some(addr) => addr.to_string(),
        None => address.to_string(),
    };
    let handle = server.handle();

    info!(%mode, address = %connect_address, tls = server.tls_enabled(), "Server started");
    let server_thread = thread::Builder::new()
        .name("framelink-server".to_string())
        .spawn(move || {
            let result = server.run(log_message);
            server.cleanup();
            result
        })
        .context("Failed to spawn server thread")?;

    let mut clients = Vec::with_capacity(CLIENTS);
    for i in 0..CLIENTS {
        let address = connect_address.clone();
        let client = thread::Builder::new()
            .name(format!("framelink-client-{i}"))
            .spawn(move || run_client(i, mode, &address, tls))
            .context("Failed to spawn client thread")?;
        clients.push(client);
        thread::sleep(CLIENT_STAGGER);
    }

    for client in clients {
        if client.join().is_err() {
            error!("Client thread panicked");
        }
    }

    handle.stop();
    let result = server_thread
        .join()
        .map_err(|_| anyhow!("Server thread panicked"))?;
    result.context("Server failed")?;

    let metrics = handle.metrics();
    info!(
        clients = metrics.total_clients,
        messages = metrics.total_messages,
        bytes = metrics.total_bytes,
        "Demo completed"
    );
    Ok(())
}

fn run_client(id: usize, mode: SocketMode, address: &str, tls: bool) {
    let mut client = match ClientSession::new(mode, address, tls) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Client {id} failed to initialize");
            return;
        }
    };

    if let Err(e) = client.connect(CONNECT_TIMEOUT) {
        error!(error = %e, "Client {id} failed to connect");
        return;
    }

    for n in 0..MESSAGES_PER_CLIENT {
        let text = format!("Hello from client {id}, message {n}");
        if let Err(e) = client.send_text_and_await_ack(&text) {
            error!(error = %e, "Client {id} failed to send message {n}");
        }
        thread::sleep(MESSAGE_GAP);
    }

    client.disconnect();
    info!("Client {id} disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_over_unix_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.sock");

        run_demo(SocketMode::Unix, path.to_str().unwrap(), true).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_cli_defaults() {
        let args = Args::parse_from(["framelink-demo"]);
        assert_eq!(args.mode, SocketMode::Inet);
        assert!(args.address.is_none());
        assert!(!args.tls);
    }
}
