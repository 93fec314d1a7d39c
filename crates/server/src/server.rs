//! TCP server for the selector session protocol.
//!
//! One thread per connection, each with its own `Session`. The listener is
//! non-blocking and polls a shutdown flag between accepts.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use wrfsel_protocol::*;

use crate::session::{Session, SessionContext};

/// Maximum concurrent connections. Extra connections are closed on accept.
pub const MAX_CONNECTIONS: usize = 32;

/// Maximum consecutive parse failures before disconnecting a client.
const MAX_PARSE_FAILURES: u32 = 3;

/// Poll interval of the non-blocking listener.
const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// Read timeout per connection, so handler threads notice shutdown.
const READ_POLL: Duration = Duration::from_millis(200);

/// The selector server: TCP listener plus connection threads.
pub struct SelectorServer {
    listener_handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    bound_addr: Option<SocketAddr>,
    active: Arc<AtomicUsize>,
}

impl SelectorServer {
    /// Create a new server (not started).
    pub fn new() -> Self {
        Self {
            listener_handle: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            bound_addr: None,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Bind and start accepting. Port 0 picks a free port; see `bound_addr`.
    pub fn start(&mut self, addr: impl ToSocketAddrs, context: SessionContext) -> std::io::Result<SocketAddr> {
        if let (true, Some(addr)) = (self.is_running(), self.bound_addr) {
            return Ok(addr);
        }

        self.shutdown.store(false, Ordering::SeqCst);

        let listener = TcpListener::bind(addr)?;
        let addr = listener.local_addr()?;
        self.bound_addr = Some(addr);

        // Non-blocking so the loop can check the shutdown flag
        listener.set_nonblocking(true)?;

        let shutdown = Arc::clone(&self.shutdown);
        let active = Arc::clone(&self.active);
        let context = Arc::new(context);

        self.listener_handle = Some(thread::spawn(move || {
            run_listener(listener, shutdown, active, context);
        }));

        log::info!("Selector server listening on {}", addr);
        Ok(addr)
    }

    /// Stop accepting and wait for the listener thread. Open connections
    /// finish their current message and close.
    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }

        self.shutdown.store(true, Ordering::SeqCst);

        if let Some(handle) = self.listener_handle.take() {
            let _ = handle.join();
        }

        self.bound_addr = None;
        log::info!("Selector server stopped");
    }

    /// Block until `stop` is called from another thread or the listener
    /// fails.
    pub fn wait(&mut self) {
        if let Some(handle) = self.listener_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.listener_handle.is_some() && !self.shutdown.load(Ordering::SeqCst)
    }

    pub fn bound_addr(&self) -> Option<SocketAddr> {
        self.bound_addr
    }

    /// Shutdown flag, for signal handlers or tests driving `wait`.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn connection_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl Default for SelectorServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SelectorServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Decrements the active connection count when a handler thread ends.
struct ConnectionGuard(Arc<AtomicUsize>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn run_listener(
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    context: Arc<SessionContext>,
) {
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => {
                if active.load(Ordering::SeqCst) >= MAX_CONNECTIONS {
                    log::warn!(
                        "Connection refused from {}: limit of {} reached",
                        addr,
                        MAX_CONNECTIONS
                    );
                    drop(stream);
                    continue;
                }

                active.fetch_add(1, Ordering::SeqCst);
                let guard = ConnectionGuard(Arc::clone(&active));
                let context = Arc::clone(&context);
                let shutdown = Arc::clone(&shutdown);

                log::debug!("Accepted connection from {}", addr);
                thread::spawn(move || {
                    let _guard = guard;
                    if let Err(e) = handle_connection(stream, context, &shutdown) {
                        log::warn!("Connection error from {}: {}", addr, e);
                    }
                    log::debug!("Connection from {} closed", addr);
                });
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                log::error!("Accept error: {}", e);
                break;
            }
        }
    }
}

/// Outcome of reading one line from the client.
enum ReadLine {
    Line(String),
    TooLarge,
    Closed,
    Idle,
}

/// Read one line, refusing to buffer more than `MAX_MESSAGE_SIZE` bytes.
///
/// A timeout mid-line keeps the partial bytes in `buf` for the next call.
fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<ReadLine> {
    let limit = (MAX_MESSAGE_SIZE + 1).saturating_sub(buf.len()) as u64;
    match reader.by_ref().take(limit).read_until(b'\n', buf) {
        Ok(0) if buf.is_empty() => Ok(ReadLine::Closed),
        Ok(_) => {
            // No newline means the limit or EOF was hit
            if buf.last() != Some(&b'\n') && buf.len() > MAX_MESSAGE_SIZE {
                return Ok(ReadLine::TooLarge);
            }
            let line = String::from_utf8_lossy(buf).trim_end_matches(['\r', '\n']).to_string();
            buf.clear();
            Ok(ReadLine::Line(line))
        }
        Err(ref e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {
            Ok(ReadLine::Idle)
        }
        Err(e) => Err(e),
    }
}

/// Handle a single client connection.
fn handle_connection(
    mut stream: TcpStream,
    context: Arc<SessionContext>,
    shutdown: &AtomicBool,
) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(READ_POLL))?;
    stream.set_write_timeout(Some(Duration::from_secs(10)))?;

    let mut reader = BufReader::new(stream.try_clone()?);
    let mut buf = Vec::new();
    let mut session: Option<Session> = None;
    let mut parse_failures: u32 = 0;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            return Ok(());
        }

        let line = match read_line(&mut reader, &mut buf)? {
            ReadLine::Line(line) => line,
            ReadLine::Idle => continue,
            ReadLine::Closed => return Ok(()),
            ReadLine::TooLarge => {
                send_error(&mut stream, None, ProtocolError::MessageTooLarge)?;
                log::warn!("Client sent a message over {} bytes, disconnecting", MAX_MESSAGE_SIZE);
                return Ok(());
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let msg: ClientMessage = match serde_json::from_str(&line) {
            Ok(m) => {
                parse_failures = 0;
                m
            }
            Err(e) => {
                parse_failures += 1;
                log::debug!("Malformed message ({}/{}): {}", parse_failures, MAX_PARSE_FAILURES, e);
                send_error(&mut stream, None, ProtocolError::MalformedMessage)?;

                if parse_failures >= MAX_PARSE_FAILURES {
                    log::warn!("Client exceeded parse failure limit, disconnecting");
                    return Ok(());
                }
                continue;
            }
        };

        if let Some(active) = session.as_mut() {
            let response = active.handle(msg);
            send_message(&mut stream, &response)?;
            continue;
        }

        // First message must be hello
        match msg {
            ClientMessage::Hello(hello) => {
                if hello.protocol_version > PROTOCOL_VERSION {
                    send_error(&mut stream, Some(hello.id), ProtocolError::ProtocolMismatch)?;
                    return Ok(());
                }

                let new_session = Session::new(Arc::clone(&context));
                log::info!(
                    "Session {} opened by {} {}",
                    new_session.id(),
                    hello.client,
                    hello.version
                );
                send_message(&mut stream, &new_session.welcome(hello.id, hello.protocol_version))?;
                session = Some(new_session);
            }
            other => {
                send_error(&mut stream, Some(other.id().to_string()), ProtocolError::HandshakeRequired)?;
                return Ok(());
            }
        }
    }
}

/// Send a message to the client.
fn send_message(stream: &mut TcpStream, msg: &ServerMessage) -> std::io::Result<()> {
    let json = serde_json::to_string(msg).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    writeln!(stream, "{}", json)?;
    stream.flush()
}

/// Send an error message to the client.
fn send_error(stream: &mut TcpStream, id: Option<String>, error: ProtocolError) -> std::io::Result<()> {
    send_message(stream, &ServerMessage::Error(error.to_error_message(id)))
}
