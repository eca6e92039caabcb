//! WebSocket server for live reload.
//!
//! Three background threads share one client list:
//!
//! ```text
//! acceptor     TcpListener -> handshake thread -> clients
//! broadcaster  ChangeFeed  -> HotReloadMessage -> every client
//! reaper       polls clients (non-blocking), drops closed connections
//! ```

use std::io::ErrorKind;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow};
use crossbeam::channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use tungstenite::WebSocket;
use tungstenite::protocol::Message;

use super::feed::{BuildEvent, ChangeFeed};
use super::message::HotReloadMessage;

/// Maximum port retry attempts
const MAX_PORT_RETRIES: u16 = 10;

/// Poll interval for the acceptor and reaper threads
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A peer that stalls the websocket handshake longer than this is dropped
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

type Clients = Arc<Mutex<Vec<WebSocket<TcpStream>>>>;

/// Handle to a running reload server. Dropping it stops the threads.
pub struct ReloadServer {
    port: u16,
    clients: Clients,
    stop: Arc<AtomicBool>,
}

impl ReloadServer {
    /// Bind `interface:port` (or the next free port) and start serving
    /// events published on `feed`.
    pub fn start(interface: &str, base_port: u16, feed: &ChangeFeed) -> Result<Self> {
        let (listener, port) = try_bind_port(interface, base_port, MAX_PORT_RETRIES)?;
        listener.set_nonblocking(true)?;

        let server = Self {
            port,
            clients: Arc::new(Mutex::new(Vec::new())),
            stop: Arc::new(AtomicBool::new(false)),
        };

        {
            let clients = Arc::clone(&server.clients);
            let stop = Arc::clone(&server.stop);
            thread::spawn(move || accept_loop(&listener, &clients, &stop));
        }
        {
            let clients = Arc::clone(&server.clients);
            let stop = Arc::clone(&server.stop);
            let events = feed.subscribe();
            thread::spawn(move || broadcast_loop(&events, &clients, &stop));
        }
        {
            let clients = Arc::clone(&server.clients);
            let stop = Arc::clone(&server.stop);
            thread::spawn(move || reap_loop(&clients, &stop));
        }

        crate::log!("reload"; "listening on ws://{}:{}", interface, port);
        Ok(server)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Send a message to every connected client.
    pub fn broadcast(&self, message: &HotReloadMessage) {
        broadcast(&self.clients, message);
    }
}

impl Drop for ReloadServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

fn accept_loop(listener: &TcpListener, clients: &Clients, stop: &AtomicBool) {
    while !stop.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => {
                crate::debug!("reload"; "client connected: {}", addr);
                let clients = Arc::clone(clients);
                thread::spawn(move || add_client(stream, &clients));
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                crate::log!("reload"; "accept error: {}", e);
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

/// Handshake and greet one client, then hand it to the shared list.
fn add_client(stream: TcpStream, clients: &Clients) {
    // Handshake runs in blocking mode, bounded by the timeouts
    let bounded = stream
        .set_nonblocking(false)
        .and_then(|()| stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT)))
        .and_then(|()| stream.set_write_timeout(Some(HANDSHAKE_TIMEOUT)));
    if let Err(e) = bounded {
        crate::log!("reload"; "cannot configure client socket: {}", e);
        return;
    }

    match tungstenite::accept(stream) {
        Ok(mut ws) => {
            let greeting = HotReloadMessage::connected().to_json();
            if let Err(e) = ws.send(Message::Text(greeting.into())) {
                crate::log!("reload"; "failed to send connected message: {}", e);
                return;
            }
            // Reads are polled by the reaper
            let socket = ws.get_ref();
            let _ = socket.set_read_timeout(None);
            let _ = socket.set_write_timeout(None);
            let _ = socket.set_nonblocking(true);

            let mut clients = clients.lock();
            clients.push(ws);
            crate::debug!("reload"; "clients: {}", clients.len());
        }
        Err(e) => {
            crate::log!("reload"; "handshake failed: {}", e);
        }
    }
}

fn broadcast_loop(events: &Receiver<BuildEvent>, clients: &Clients, stop: &AtomicBool) {
    while !stop.load(Ordering::SeqCst) {
        match events.recv_timeout(POLL_INTERVAL) {
            Ok(event) => broadcast(clients, &HotReloadMessage::from(&event)),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Send to all clients, dropping the ones whose connection is gone.
fn broadcast(clients: &Clients, message: &HotReloadMessage) {
    let text = message.to_json();
    let mut clients = clients.lock();
    clients.retain_mut(|ws| match ws.send(Message::Text(text.clone().into())) {
        Ok(()) => true,
        // Frame is queued; flushed on the next write or read
        Err(tungstenite::Error::Io(ref e)) if e.kind() == ErrorKind::WouldBlock => true,
        Err(e) => {
            crate::debug!("reload"; "dropping client: {}", e);
            false
        }
    });
}

fn reap_loop(clients: &Clients, stop: &AtomicBool) {
    while !stop.load(Ordering::SeqCst) {
        thread::sleep(POLL_INTERVAL);

        let mut clients = clients.lock();
        clients.retain_mut(|ws| match ws.read() {
            Ok(Message::Close(_)) => false,
            Ok(_) => true,
            Err(tungstenite::Error::Io(ref e)) if e.kind() == ErrorKind::WouldBlock => true,
            Err(_) => false,
        });
    }
}

/// Try binding to port, retry with incremented port if in use.
/// Port 0 asks the OS for any free port.
fn try_bind_port(interface: &str, base_port: u16, max_retries: u16) -> Result<(TcpListener, u16)> {
    let mut last_error = None;

    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        match TcpListener::bind((interface, port)) {
            Ok(listener) => {
                let actual_port = listener.local_addr()?.port();
                return Ok((listener, actual_port));
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(anyhow!(
        "failed to bind reload server after {} attempts: {}",
        max_retries,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::LogicalId;
    use crate::reload::feed::ChangeEvent;
    use std::path::PathBuf;
    use std::time::Instant;

    #[test]
    fn test_bind_skips_taken_port() {
        let (taken, port) = try_bind_port("127.0.0.1", 0, 1).unwrap();
        let (_next, next_port) = try_bind_port("127.0.0.1", port, 3).unwrap();
        assert_ne!(port, next_port);
        drop(taken);
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out");
            thread::sleep(Duration::from_millis(20));
        }
    }

    fn read_text<S: std::io::Read + std::io::Write>(ws: &mut WebSocket<S>) -> String {
        loop {
            if let Message::Text(text) = ws.read().unwrap() {
                return text.to_string();
            }
        }
    }

    #[test]
    fn test_silent_peer_does_not_block_accept() {
        let feed = ChangeFeed::new();
        let server = ReloadServer::start("127.0.0.1", 0, &feed).unwrap();

        // Connects but never sends a handshake request
        let _silent = TcpStream::connect(("127.0.0.1", server.port())).unwrap();
        thread::sleep(POLL_INTERVAL * 2);

        let url = format!("ws://127.0.0.1:{}", server.port());
        let (mut client, _) = tungstenite::connect(url).unwrap();
        if let tungstenite::stream::MaybeTlsStream::Plain(stream) = client.get_ref() {
            stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        }
        let greeting = read_text(&mut client);
        assert!(greeting.contains(r#""type":"connected""#));
        wait_for(|| server.client_count() == 1);
    }

    #[test]
    fn test_feed_events_reach_clients() {
        let feed = ChangeFeed::new();
        let server = ReloadServer::start("127.0.0.1", 0, &feed).unwrap();

        let url = format!("ws://127.0.0.1:{}", server.port());
        let (mut client, _) = tungstenite::connect(url).unwrap();
        if let tungstenite::stream::MaybeTlsStream::Plain(stream) = client.get_ref() {
            stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        }

        let greeting = read_text(&mut client);
        assert!(greeting.contains(r#""type":"connected""#));
        wait_for(|| server.client_count() == 1);

        feed.publish(BuildEvent::Changed(ChangeEvent {
            id: LogicalId::from("page/home"),
            orig: PathBuf::from("/app/views/page/home.riot"),
            file: PathBuf::from("/c/views/page/home.riot.js"),
            name: "home".into(),
            code: "export default {}".into(),
        }));

        let update = read_text(&mut client);
        assert!(update.contains(r#""type":"update""#));
        assert!(update.contains(r#""id":"page/home""#));
    }
}
