//! Non-blocking byte-stream transports
//!
//! A [`Transport`] is the plain socket underneath a TLS session. Every
//! operation returns immediately: `send` and `recv` report
//! [`IoOutcome::WouldBlock`] rather than waiting, and callers that need to
//! wait do so explicitly through [`Transport::poll`].
//!
//! [`TcpTransport`] is the stock implementation over a `socket2` TCP socket.

pub mod tcp;

pub use tcp::{IpFamily, TcpTarget, TcpTransport};

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// Outcome of a single non-blocking transfer attempt
#[derive(Debug)]
pub enum IoOutcome {
    /// Bytes transferred (0 from `recv` means the peer closed the stream)
    Ready(usize),
    /// Nothing could be transferred without waiting
    WouldBlock,
    /// The transport failed
    Failed(io::Error),
}

impl IoOutcome {
    /// Classify the result of a non-blocking std I/O call
    pub fn from_io(result: io::Result<usize>) -> Self {
        match result {
            Ok(n) => IoOutcome::Ready(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => IoOutcome::WouldBlock,
            Err(e) => IoOutcome::Failed(e),
        }
    }
}

/// Poll events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvents {
    Read,
    Write,
    Both,
}

/// Transport operations consumed by the TLS socket
///
/// Implementations must never block in `send` or `recv`.
pub trait Transport: Sized {
    /// What a fresh transport is opened against
    type Target: ?Sized;

    /// Allocate a fresh, unconnected transport
    fn open(target: &Self::Target) -> io::Result<Self>;

    /// Switch between blocking and non-blocking mode
    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()>;

    /// Establish the byte-stream connection to `hostname:port`
    fn connect(&mut self, hostname: &str, port: u16) -> io::Result<()>;

    /// Attempt to send bytes
    fn send(&mut self, buf: &[u8]) -> IoOutcome;

    /// Attempt to receive bytes
    fn recv(&mut self, buf: &mut [u8]) -> IoOutcome;

    /// Wait until the transport is ready for `events`
    ///
    /// Returns false if `timeout` elapsed first. `None` waits indefinitely.
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> io::Result<bool>;

    /// Close the transport
    fn close(&mut self) -> io::Result<()>;
}

/// Wait for readiness on a raw file descriptor
pub fn poll_fd(fd: RawFd, events: PollEvents, timeout: Option<Duration>) -> io::Result<bool> {
    use libc::{poll, pollfd, POLLIN, POLLOUT};

    let mut pfd = pollfd {
        fd,
        events: match events {
            PollEvents::Read => POLLIN,
            PollEvents::Write => POLLOUT,
            PollEvents::Both => POLLIN | POLLOUT,
        },
        revents: 0,
    };

    // Round up so a sub-millisecond wait still blocks
    let timeout_ms = timeout
        .map(|d| d.as_micros().div_ceil(1000).min(i32::MAX as u128) as i32)
        .unwrap_or(-1); // -1 = infinite

    loop {
        let result = unsafe { poll(&mut pfd as *mut pollfd, 1, timeout_ms) };

        if result < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }

        return Ok(result > 0);
    }
}
