//! TLS socket
//!
//! [`TlsSocket`] owns a non-blocking transport and the TLS engine state that
//! goes with it, and exposes both as one blocking-style stream socket.
//!
//! The socket moves through `Closed → Open → Connecting → Established`, and
//! `close` returns it to `Closed` from anywhere. Engine resources live inside
//! the same state variant as the transport, so one is never held without the
//! other.

use super::bridge::TransportBridge;
use super::config::TlsSocketConfig;
use super::engine::EngineResources;
use super::error::{report, TlsError};
use super::handshake::{self, await_transport, wants, Session};
use super::info::SessionInfo;
use super::state::SocketState;
use crate::transport::{TcpTransport, Transport};
use openssl::ssl::{ErrorCode, SslStream};
use std::io::{self, Read, Write};

/// Result type for socket operations
pub type Result<T> = std::result::Result<T, TlsError>;

/// Resources held in each state
enum Slot<T> {
    Closed,
    Open {
        transport: T,
        engine: EngineResources,
    },
    /// Placeholder while `connect` owns the resources
    Connecting,
    /// A connect attempt failed; the transport is closed
    Aborted(Aborted<T>),
    Established(Session<T>),
}

/// What is left over after a failed connect
enum Aborted<T> {
    Transport(T),
    Session(Session<T>),
}

impl<T> Slot<T> {
    fn state(&self) -> SocketState {
        match self {
            Slot::Closed => SocketState::Closed,
            Slot::Open { .. } | Slot::Aborted(_) => SocketState::Open,
            Slot::Connecting => SocketState::Connecting,
            Slot::Established(_) => SocketState::Established,
        }
    }
}

/// Blocking-style TLS client socket over a non-blocking transport
///
/// The root CA bundle is borrowed, not copied, and must outlive the socket.
///
/// # Examples
///
/// ```no_run
/// use tls_socket::{TcpTarget, TlsSocket};
///
/// let root_ca = std::fs::read("ca.pem").unwrap();
///
/// let mut socket: TlsSocket = TlsSocket::open_on(&TcpTarget::v4()).unwrap();
/// socket.connect_with_root_ca("localhost", 8443, &root_ca).unwrap();
///
/// assert_eq!(socket.send(b"ping").unwrap(), 4);
/// let mut buf = [0u8; 4];
/// socket.recv(&mut buf).unwrap();
///
/// socket.close().unwrap();
/// ```
pub struct TlsSocket<'ca, T: Transport = TcpTransport> {
    slot: Slot<T>,
    root_ca_pem: Option<&'ca [u8]>,
    config: TlsSocketConfig,
}

impl<'ca, T: Transport> TlsSocket<'ca, T> {
    /// Create a closed socket with the default configuration
    pub fn new() -> Self {
        Self::with_config(TlsSocketConfig::default())
    }

    /// Create a closed socket
    pub fn with_config(config: TlsSocketConfig) -> Self {
        TlsSocket {
            slot: Slot::Closed,
            root_ca_pem: None,
            config,
        }
    }

    /// Create a socket and open it on `target`
    pub fn open_on(target: &T::Target) -> Result<Self> {
        Self::open_on_with_config(target, TlsSocketConfig::default())
    }

    /// Create a socket with `config` and open it on `target`
    pub fn open_on_with_config(target: &T::Target, config: TlsSocketConfig) -> Result<Self> {
        let mut socket = Self::with_config(config);
        socket.open(target)?;
        Ok(socket)
    }

    /// Current lifecycle state
    pub fn state(&self) -> SocketState {
        self.slot.state()
    }

    /// Whether transport and engine resources are allocated
    pub fn is_open(&self) -> bool {
        self.state() != SocketState::Closed
    }

    /// Whether the handshake has completed
    pub fn is_established(&self) -> bool {
        self.state() == SocketState::Established
    }

    /// Socket configuration
    pub fn config(&self) -> &TlsSocketConfig {
        &self.config
    }

    /// The underlying transport, while open
    pub fn transport(&self) -> Option<&T> {
        match &self.slot {
            Slot::Open { transport, .. } | Slot::Aborted(Aborted::Transport(transport)) => {
                Some(transport)
            }
            Slot::Aborted(Aborted::Session(session)) | Slot::Established(session) => {
                Some(session.get_ref().get_ref())
            }
            Slot::Closed | Slot::Connecting => None,
        }
    }

    /// Negotiated session details, once established
    pub fn session_info(&self) -> Option<SessionInfo> {
        match &self.slot {
            Slot::Established(session) => Some(SessionInfo::from_ssl(session.ssl())),
            _ => None,
        }
    }

    /// Allocate a fresh non-blocking transport and TLS engine state
    ///
    /// Does nothing if the socket is already open. Neither connects nor
    /// handshakes.
    pub fn open(&mut self, target: &T::Target) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }

        let mut transport = T::open(target).map_err(|e| {
            let err = TlsError::Io(e);
            report("transport_open", &err);
            err
        })?;

        if let Err(e) = transport.set_nonblocking(true) {
            let err = TlsError::Io(e);
            report("set_nonblocking", &err);
            close_transport(&mut transport);
            return Err(err);
        }

        let engine = match EngineResources::new() {
            Ok(engine) => engine,
            Err(err) => {
                report("engine_init", &err);
                close_transport(&mut transport);
                return Err(err);
            }
        };

        self.enter(Slot::Open { transport, engine });
        Ok(())
    }

    /// Release the engine state and the transport
    ///
    /// Does nothing if the socket is already closed. The socket is closed
    /// afterwards even if the transport reports an error while closing.
    pub fn close(&mut self) -> Result<()> {
        let result = match std::mem::replace(&mut self.slot, Slot::Closed) {
            Slot::Closed | Slot::Connecting => return Ok(()),
            Slot::Open {
                mut transport,
                engine,
            } => {
                drop(engine);
                transport.close()
            }
            Slot::Aborted(Aborted::Transport(mut transport)) => transport.close(),
            Slot::Aborted(Aborted::Session(mut session)) => session.get_mut().get_mut().close(),
            Slot::Established(mut session) => {
                // Single close_notify attempt; a busy transport may not take it
                if let Err(e) = session.shutdown() {
                    tracing::debug!("close_notify not sent: {}", e);
                }
                if self.config.trace_engine() {
                    handshake::log_shutdown_state(&mut session);
                }
                session.get_mut().get_mut().close()
            }
        };

        tracing::debug!("socket closed");
        result.map_err(|e| {
            let err = TlsError::Io(e);
            report("transport_close", &err);
            err
        })
    }

    /// Set the trusted root certificates (PEM) used by the next `connect`
    pub fn set_root_ca_pem(&mut self, root_ca_pem: &'ca [u8]) {
        self.root_ca_pem = Some(root_ca_pem);
    }

    /// Connect to `hostname:port` and complete the TLS handshake
    ///
    /// The peer must present a chain anchored in the configured root CA
    /// bundle and valid for `hostname`. On failure the transport is closed
    /// and the socket must be closed and reopened before another attempt.
    pub fn connect(&mut self, hostname: &str, port: u16) -> Result<()> {
        let (transport, engine) = match std::mem::replace(&mut self.slot, Slot::Connecting) {
            Slot::Open { transport, engine } => (transport, engine),
            other => {
                let err = match &other {
                    Slot::Closed => TlsError::NotOpen,
                    Slot::Aborted(_) => TlsError::ReopenRequired,
                    _ => TlsError::InvalidState {
                        expected: SocketState::Open,
                        actual: other.state(),
                    },
                };
                self.slot = other;
                return Err(err);
            }
        };

        match self.establish(transport, engine, hostname, port) {
            Ok(session) => {
                self.enter(Slot::Established(session));
                Ok(())
            }
            Err((err, leftover)) => {
                self.enter(leftover.map(Slot::Aborted).unwrap_or(Slot::Closed));
                Err(err)
            }
        }
    }

    /// Set the root CA bundle, then `connect`
    pub fn connect_with_root_ca(
        &mut self,
        hostname: &str,
        port: u16,
        root_ca_pem: &'ca [u8],
    ) -> Result<()> {
        self.set_root_ca_pem(root_ca_pem);
        self.connect(hostname, port)
    }

    fn establish(
        &self,
        mut transport: T,
        engine: EngineResources,
        hostname: &str,
        port: u16,
    ) -> std::result::Result<Session<T>, (TlsError, Option<Aborted<T>>)> {
        let ssl = match engine.configure(hostname, self.root_ca_pem, &self.config) {
            Ok(ssl) => ssl,
            Err(err) => {
                report("tls_configure", &err);
                close_transport(&mut transport);
                return Err((err, Some(Aborted::Transport(transport))));
            }
        };

        // Dropping the bridge on failure releases the unconnected transport
        let mut session = SslStream::new(ssl, TransportBridge::new(transport))
            .map_err(|e| {
                let err = TlsError::Setup {
                    operation: "ssl_set_bio",
                    source: e,
                };
                report("ssl_set_bio", &err);
                (err, None)
            })?;

        tracing::info!("Connecting to {}:{}", hostname, port);
        if let Err(e) = session.get_mut().get_mut().connect(hostname, port) {
            let err = TlsError::Io(e);
            report("transport_connect", &err);
            close_transport(session.get_mut().get_mut());
            return Err((err, Some(Aborted::Session(session))));
        }
        tracing::info!("Connected.");

        tracing::info!("Starting the TLS handshake...");
        if let Err(err) = handshake::drive(
            &mut session,
            self.config.io_timeout(),
            self.config.trace_engine(),
        ) {
            report("ssl_handshake", &err);
            close_transport(session.get_mut().get_mut());
            return Err((err, Some(Aborted::Session(session))));
        }
        tracing::info!("TLS connection to {}:{} established", hostname, port);

        handshake::log_peer_verification(session.ssl());
        Ok(session)
    }

    fn enter(&mut self, slot: Slot<T>) {
        let (from, to) = (self.slot.state(), slot.state());
        debug_assert!(from.can_transition_to(to), "{} -> {}", from, to);
        tracing::debug!("socket {} -> {}", from, to);
        self.slot = slot;
    }

    fn session_mut(&mut self) -> Result<&mut Session<T>> {
        match &mut self.slot {
            Slot::Established(session) => Ok(session),
            _ => Err(TlsError::NotConnected),
        }
    }

    /// Send all of `data`
    ///
    /// Partial writes are retried until every byte is accepted. Returns
    /// `data.len()`; on failure the error carries the count already sent.
    pub fn send(&mut self, data: &[u8]) -> Result<usize> {
        let timeout = self.config.io_timeout();
        let session = self.session_mut()?;

        let mut offset = 0;
        while offset < data.len() {
            match session.ssl_write(&data[offset..]) {
                Ok(n) => offset += n,
                Err(e) => match wants(&e) {
                    Some(events) => await_transport(session, events, timeout, "send", offset)
                        .inspect_err(|err| report("ssl_write", err))?,
                    None if e.code() == ErrorCode::ZERO_RETURN => {
                        return Err(TlsError::PeerClosed {
                            transferred: offset,
                        });
                    }
                    None => {
                        let err = TlsError::Transfer {
                            operation: "send",
                            transferred: offset,
                            source: e,
                        };
                        report("ssl_write", &err);
                        return Err(err);
                    }
                },
            }
        }

        Ok(offset)
    }

    /// Receive until `buf` is full or the peer closes
    ///
    /// Returns the number of bytes received, which is less than `buf.len()`
    /// only if the peer closed after sending them. A close before any byte
    /// arrives is reported as [`TlsError::PeerClosed`].
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut offset = 0;
        while offset < buf.len() {
            match self.recv_some(&mut buf[offset..]) {
                Ok(n) => offset += n,
                Err(TlsError::PeerClosed { .. }) if offset > 0 => break,
                Err(err) => return Err(with_transferred(err, offset)),
            }
        }

        Ok(offset)
    }

    /// Receive whatever the next record yields, waiting only if none is buffered
    pub fn recv_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        let timeout = self.config.io_timeout();
        let trace_engine = self.config.trace_engine();
        let session = self.session_mut()?;

        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            match session.ssl_read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.code() == ErrorCode::ZERO_RETURN => {
                    tracing::debug!("peer sent close_notify");
                    if trace_engine {
                        handshake::log_shutdown_state(session);
                    }
                    return Err(TlsError::PeerClosed { transferred: 0 });
                }
                Err(e) => match wants(&e) {
                    Some(events) => await_transport(session, events, timeout, "recv", 0)
                        .inspect_err(|err| report("ssl_read", err))?,
                    None => {
                        let err = TlsError::Transfer {
                            operation: "recv",
                            transferred: 0,
                            source: e,
                        };
                        report("ssl_read", &err);
                        return Err(err);
                    }
                },
            }
        }
    }
}

/// Re-attribute an error from one loop iteration to the whole call
fn with_transferred(err: TlsError, transferred: usize) -> TlsError {
    match err {
        TlsError::Transfer {
            operation, source, ..
        } => TlsError::Transfer {
            operation,
            transferred,
            source,
        },
        TlsError::Timeout { operation, .. } => TlsError::Timeout {
            operation,
            transferred,
        },
        TlsError::PeerClosed { .. } => TlsError::PeerClosed { transferred },
        other => other,
    }
}

fn close_transport<T: Transport>(transport: &mut T) {
    if let Err(e) = transport.close() {
        tracing::warn!("failed to close transport: {}", e);
    }
}

impl<'ca, T: Transport> Default for TlsSocket<'ca, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'ca, T: Transport> Drop for TlsSocket<'ca, T> {
    fn drop(&mut self) {
        if self.is_open() {
            let _ = self.close();
        }
    }
}

impl<'ca, T: Transport> std::fmt::Debug for TlsSocket<'ca, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsSocket")
            .field("state", &self.state())
            .field("root_ca_pem", &self.root_ca_pem.map(|pem| pem.len()))
            .field("config", &self.config)
            .finish()
    }
}

impl<'ca, T: Transport> Read for TlsSocket<'ca, T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.recv_some(buf) {
            Ok(n) => Ok(n),
            Err(TlsError::PeerClosed { .. }) => Ok(0),
            Err(err) => Err(err.into()),
        }
    }
}

impl<'ca, T: Transport> Write for TlsSocket<'ca, T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.send(buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
