//! Shared fixtures for server/client integration tests
//!
//! Real sockets only: servers bind a temp-dir Unix path or 127.0.0.1:0 and
//! run on their own thread.

#![allow(dead_code)]

use framelink_network::{
    CredentialProvider, MessageHandler, Result, SelfSignedProvider, Server, ServerHandle,
    SocketMode, StaticCredentials,
};
use std::sync::OnceLock;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Keeps stop latency low in tests
pub const POLL_TIMEOUT: Duration = Duration::from_millis(20);

pub struct RunningServer {
    pub handle: ServerHandle,
    pub address: String,
    join: Option<JoinHandle<Result<()>>>,
}

impl RunningServer {
    /// Stop the loop and wait for the thread; the server is cleaned up on drop
    pub fn shutdown(mut self) -> Result<()> {
        self.handle.stop();
        match self.join.take() {
            Some(join) => join.join().expect("server thread panicked"),
            None => Ok(()),
        }
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.handle.stop();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// One generated identity shared by every TLS test in the binary
pub fn test_credentials() -> &'static StaticCredentials {
    static CREDENTIALS: OnceLock<StaticCredentials> = OnceLock::new();
    CREDENTIALS.get_or_init(|| {
        let credentials = SelfSignedProvider::default()
            .provision("localhost")
            .expect("generate test identity");
        StaticCredentials::new(credentials)
    })
}

/// Bind on the calling thread, serve on a new one
pub fn spawn_server<H>(mode: SocketMode, address: &str, tls: bool, handler: H) -> RunningServer
where
    H: MessageHandler + Send + 'static,
{
    let mut server = Server::with_credentials(mode, address, tls, test_credentials())
        .expect("create server")
        .with_poll_timeout(POLL_TIMEOUT)
        .with_io_timeout(Duration::from_secs(2));
    server.bind().expect("bind server");

    let address = match server.local_addr() {
        Some(addr) => addr.to_string(),
        None => address.to_string(),
    };
    let handle = server.handle();
    let join = thread::spawn(move || server.run(handler));

    RunningServer {
        handle,
        address,
        join: Some(join),
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
