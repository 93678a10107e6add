//! Server/client integration over Unix sockets

mod common;

use common::{spawn_server, wait_until};
use framelink_network::transport::Stream;
use framelink_network::{
    ClientId, ClientSession, Connection, Endpoint, Message, MessageHeader, NoopHandler,
    RetryPolicy, Server, SocketMode,
};
use parking_lot::Mutex;
use std::io::Write;
use std::os::unix::net::UnixListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(5);

fn socket_path(dir: &TempDir) -> String {
    dir.path()
        .join("server.sock")
        .to_str()
        .expect("utf-8 temp path")
        .to_string()
}

fn raw_connection(path: &str) -> Connection {
    let endpoint = Endpoint::parse(SocketMode::Unix, path).unwrap();
    let stream = Stream::connect(&endpoint, None).unwrap();
    stream.set_timeouts(Some(Duration::from_secs(2))).unwrap();
    Connection::plain(stream, Some(Duration::from_secs(2)))
}

#[test_log::test]
fn test_ping_receives_empty_ack() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir);
    let server = spawn_server(SocketMode::Unix, &path, false, NoopHandler);

    let mut connection = raw_connection(&path);
    connection.send(&Message::text("ping")).unwrap();
    let reply = connection.receive().unwrap();

    assert!(reply.is_ack());
    assert_eq!(reply.header().length, 0);
    assert_eq!(reply.payload_len(), 0);
    assert_eq!(server.handle.metrics().total_messages, 1);

    server.shutdown().unwrap();
}

#[test_log::test]
fn test_client_session_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir);
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let server = spawn_server(SocketMode::Unix, &path, false, move |id: ClientId, msg: &Message| {
        sink.lock().push((id, msg.payload().to_vec()));
    });

    let mut client = ClientSession::new(SocketMode::Unix, &path, false).unwrap();
    client.connect(Duration::from_secs(2)).unwrap();
    assert!(client.is_connected());

    for text in ["one", "two", "three"] {
        client.send_text_and_await_ack(text).unwrap();
    }
    client.disconnect();
    assert!(!client.is_connected());

    let received = received.lock().clone();
    assert_eq!(received.len(), 3);
    assert_eq!(received[0].1, b"one");
    assert_eq!(received[2].1, b"three");
    assert!(received.iter().all(|(id, _)| *id == received[0].0));

    let metrics = server.handle.metrics();
    assert_eq!(metrics.total_messages, 3);
    assert_eq!(metrics.total_bytes, 11);
    assert_eq!(metrics.total_clients, 1);

    server.shutdown().unwrap();
}

#[test_log::test]
fn test_inbound_ack_gets_no_reply() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let server = spawn_server(SocketMode::Unix, &path, false, move |_: ClientId, _: &Message| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let mut connection = raw_connection(&path);
    connection.send(&Message::ack()).unwrap();
    connection.send(&Message::text("after ack")).unwrap();

    // exactly one reply: the ACK for the text frame
    assert!(connection.receive().unwrap().is_ack());
    connection.set_timeout(Some(Duration::from_millis(200))).unwrap();
    let err = connection.receive().unwrap_err();
    assert_eq!(err.category(), "network");

    assert!(wait_until(WAIT, || calls.load(Ordering::SeqCst) == 2));
    assert_eq!(server.handle.metrics().total_messages, 2);

    server.shutdown().unwrap();
}

#[test_log::test]
fn test_fragmented_frame_is_delivered_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let server = spawn_server(SocketMode::Unix, &path, false, move |_: ClientId, msg: &Message| {
        assert_eq!(msg.payload(), b"split across writes");
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let endpoint = Endpoint::parse(SocketMode::Unix, &path).unwrap();
    let mut raw = Stream::connect(&endpoint, None).unwrap();
    raw.set_timeouts(Some(Duration::from_secs(2))).unwrap();

    let payload = b"split across writes";
    let header = MessageHeader::new(0x01, payload.len() as u64, 0).to_bytes();
    raw.write_all(&header[..7]).unwrap();
    thread::sleep(Duration::from_millis(50));
    raw.write_all(&header[7..]).unwrap();
    raw.write_all(&payload[..5]).unwrap();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    raw.write_all(&payload[5..]).unwrap();

    let mut connection = Connection::plain(raw, Some(Duration::from_secs(2)));
    assert!(connection.receive().unwrap().is_ack());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    server.shutdown().unwrap();
}

#[test_log::test]
fn test_closed_peer_is_evicted_without_disturbing_others() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir);
    let server = spawn_server(SocketMode::Unix, &path, false, NoopHandler);

    let mut clients: Vec<ClientSession> = (0..3)
        .map(|_| {
            let mut client = ClientSession::new(SocketMode::Unix, &path, false).unwrap();
            client.connect(Duration::from_secs(2)).unwrap();
            client
        })
        .collect();
    assert!(wait_until(WAIT, || server.handle.client_count() == 3));

    let dropped = clients.remove(1);
    drop(dropped);
    assert!(wait_until(WAIT, || server.handle.client_count() == 2));

    for client in &mut clients {
        client.send_text_and_await_ack("still here").unwrap();
    }
    assert_eq!(server.handle.client_count(), 2);
    assert_eq!(server.handle.metrics().total_clients, 3);

    server.shutdown().unwrap();
}

#[test_log::test]
fn test_stop_and_cleanup_remove_socket_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir);
    let server = spawn_server(SocketMode::Unix, &path, false, NoopHandler);
    assert!(std::path::Path::new(&path).exists());

    let handle = server.handle.clone();
    server.shutdown().unwrap();
    assert!(!handle.is_running());
    assert!(!std::path::Path::new(&path).exists());
}

#[test_log::test]
fn test_stale_socket_file_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir);
    std::fs::write(&path, b"stale").unwrap();

    let server = spawn_server(SocketMode::Unix, &path, false, NoopHandler);
    let mut client = ClientSession::new(SocketMode::Unix, &path, false).unwrap();
    client.connect(Duration::from_secs(2)).unwrap();
    client.send_text_and_await_ack("hi").unwrap();

    server.shutdown().unwrap();
}

#[test]
fn test_backoff_against_missing_socket() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir);
    let mut client = ClientSession::new(SocketMode::Unix, &path, false)
        .unwrap()
        .with_retry_policy(RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
        });

    let mut delays = Vec::new();
    let err = client
        .connect_with(Duration::from_secs(1), |d| delays.push(d))
        .unwrap_err();

    assert_eq!(err.category(), "connection");
    assert_eq!(
        delays,
        vec![
            Duration::from_millis(1),
            Duration::from_millis(2),
            Duration::from_millis(4),
            Duration::from_millis(8)
        ]
    );
    assert!(!client.is_connected());
}

#[test]
fn test_unix_with_tls_is_normalized() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir);

    let server = Server::new(SocketMode::Unix, &path, true).unwrap();
    assert!(!server.tls_enabled());
    assert_eq!(server.mode(), SocketMode::Unix);

    let client = ClientSession::new(SocketMode::Unix, &path, true).unwrap();
    assert!(!client.tls_enabled());
}

#[test]
fn test_run_without_bind_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir);
    let mut server = Server::new(SocketMode::Unix, &path, false).unwrap();
    let err = server.run(NoopHandler).unwrap_err();
    assert_eq!(err.category(), "invalid_argument");
}

#[test]
fn test_set_timeout_applies_to_open_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir);

    // accepts and never answers
    let listener = UnixListener::bind(&path).unwrap();
    let silent = thread::spawn(move || {
        let (peer, _) = listener.accept().unwrap();
        thread::sleep(Duration::from_secs(3));
        drop(peer);
    });

    let mut client = ClientSession::new(SocketMode::Unix, &path, false).unwrap();
    client.connect(Duration::from_secs(10)).unwrap();
    client.set_timeout(Duration::from_millis(50)).unwrap();
    assert_eq!(client.timeout(), Duration::from_millis(50));

    let started = Instant::now();
    let err = client.send_text_and_await_ack("anyone there?").unwrap_err();
    assert_eq!(err.category(), "network");
    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
    assert!(!client.is_connected());

    silent.join().unwrap();
}
