//! tls-socket - blocking-style TLS client sockets
//!
//! This crate layers an OpenSSL client session over a non-blocking stream
//! transport and presents the pair as an ordinary socket with `open`,
//! `connect`, `send`, `recv` and `close`.

pub mod tls;
pub mod transport;

pub use tls::{SessionInfo, SocketState, TlsError, TlsSocket, TlsSocketConfig, TlsVersion};
pub use transport::{IpFamily, TcpTarget, TcpTransport, Transport};
