//! TLS socket errors and diagnostics

use super::state::SocketState;
use openssl::error::ErrorStack;
use openssl::ssl;

/// TLS errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("OpenSSL error in {operation}: {source}")]
    Setup {
        operation: &'static str,
        #[source]
        source: ErrorStack,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No root CA certificate configured")]
    MissingRootCa,

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("Handshake failed: {0}")]
    Handshake(#[source] ssl::Error),

    #[error("TLS {operation} failed after {transferred} bytes: {source}")]
    Transfer {
        operation: &'static str,
        transferred: usize,
        #[source]
        source: ssl::Error,
    },

    #[error("Peer closed the connection after {transferred} bytes")]
    PeerClosed { transferred: usize },

    #[error("TLS {operation} timed out after {transferred} bytes")]
    Timeout {
        operation: &'static str,
        transferred: usize,
    },

    #[error("Socket is not open")]
    NotOpen,

    #[error("TLS session is not established")]
    NotConnected,

    #[error("Socket must be closed and reopened before connecting again")]
    ReopenRequired,

    #[error("Invalid socket state: expected {expected}, found {actual}")]
    InvalidState {
        expected: SocketState,
        actual: SocketState,
    },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: SocketState, to: SocketState },

    #[error("Invalid TLS version: {0}")]
    InvalidVersion(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TlsError {
    pub(crate) fn setup(operation: &'static str) -> impl FnOnce(ErrorStack) -> TlsError {
        move |source| TlsError::Setup { operation, source }
    }

    /// Legacy integer status for this error
    ///
    /// Engine failures map to the negated OpenSSL error code, transport
    /// failures to the negated errno, and everything else to -1. Never 0.
    pub fn status_code(&self) -> i32 {
        match self {
            TlsError::Setup { source, .. } => stack_code(source),
            TlsError::Io(e) => e.raw_os_error().map(|errno| -errno).unwrap_or(-1),
            TlsError::Handshake(e) | TlsError::Transfer { source: e, .. } => ssl_code(e),
            _ => -1,
        }
    }

    /// Bytes moved before a send or receive failed
    pub fn transferred(&self) -> usize {
        match self {
            TlsError::Transfer { transferred, .. }
            | TlsError::PeerClosed { transferred }
            | TlsError::Timeout { transferred, .. } => *transferred,
            _ => 0,
        }
    }
}

impl From<TlsError> for std::io::Error {
    fn from(err: TlsError) -> Self {
        use std::io::ErrorKind;

        let kind = match err {
            TlsError::Io(e) => return e,
            TlsError::NotOpen | TlsError::NotConnected => ErrorKind::NotConnected,
            TlsError::Timeout { .. } => ErrorKind::TimedOut,
            TlsError::PeerClosed { .. } => ErrorKind::UnexpectedEof,
            _ => ErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}

fn stack_code(stack: &ErrorStack) -> i32 {
    stack
        .errors()
        .first()
        .map(|e| -((e.code() & 0x7fff_ffff) as i32))
        .filter(|code| *code != 0)
        .unwrap_or(-1)
}

fn ssl_code(err: &ssl::Error) -> i32 {
    if let Some(stack) = err.ssl_error() {
        return stack_code(stack);
    }
    if let Some(errno) = err.io_error().and_then(|e| e.raw_os_error()) {
        return -errno;
    }
    -err.code().as_raw().max(1)
}

/// Log a failed operation the same way everywhere
pub(crate) fn report(operation: &str, err: &TlsError) {
    let code = err.status_code();
    tracing::error!(
        "{}() failed: -0x{:04x} ({}): {}",
        operation,
        code.unsigned_abs(),
        code,
        err
    );
}
