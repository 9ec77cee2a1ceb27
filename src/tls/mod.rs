//! Blocking-style TLS client over a non-blocking transport
//!
//! This module drives an OpenSSL client session over any [`Transport`]
//! whose operations return "would block" instead of waiting. The caller sees
//! plain blocking calls: `connect` returns once the handshake is done, `send`
//! returns once every byte was accepted, and `recv` returns once the buffer
//! is full.
//!
//! # Architecture
//!
//! 1. [`TlsSocketConfig`] holds the protocol settings (versions, ciphers, timeout)
//! 2. [`EngineResources`](engine::EngineResources) is allocated by `open` and
//!    turned into a configured session by `connect`
//! 3. [`TransportBridge`](bridge::TransportBridge) presents the transport to
//!    the engine as a byte stream
//! 4. [`TlsSocket`] owns all of the above and retries engine calls after
//!    waiting for transport readiness
//!
//! Peer verification is always required. Only certificates chaining to the
//! root CA bundle given to the socket are trusted.
//!
//! # Examples
//!
//! ```no_run
//! use tls_socket::tls::{TlsSocket, TlsSocketConfig, TlsVersion};
//! use tls_socket::transport::{TcpTarget, TcpTransport};
//! use std::time::Duration;
//!
//! let config = TlsSocketConfig::builder()
//!     .version(TlsVersion::Tls13)
//!     .io_timeout(Some(Duration::from_secs(5)))
//!     .build()
//!     .unwrap();
//!
//! let root_ca = std::fs::read("ca.pem").unwrap();
//! let mut socket: TlsSocket<TcpTransport> =
//!     TlsSocket::open_on_with_config(&TcpTarget::v4(), config).unwrap();
//! socket.connect_with_root_ca("example.com", 443, &root_ca).unwrap();
//!
//! let info = socket.session_info().unwrap();
//! println!("{} {}", info.version, info.cipher);
//! ```

pub mod bridge;
pub mod cert;
pub mod config;
pub mod engine;
pub mod error;
pub mod handshake;
pub mod info;
pub mod socket;
pub mod state;

pub use cert::CertInfo;
pub use config::{TlsSocketConfig, TlsSocketConfigBuilder, TlsVersion};
pub use error::TlsError;
pub use info::SessionInfo;
pub use socket::{Result, TlsSocket};
pub use state::SocketState;

pub use crate::transport::Transport;
