//! TCP transport over a non-blocking `socket2` socket

use super::{poll_fd, IoOutcome, PollEvents, Transport};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{self, Read};
use std::net::{Shutdown, SocketAddr, ToSocketAddrs};
use std::os::fd::AsRawFd;
use std::time::Duration;

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: libc::c_int = 0;

/// Address family a TCP transport is opened for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IpFamily {
    #[default]
    V4,
    V6,
}

impl IpFamily {
    fn domain(self) -> Domain {
        match self {
            IpFamily::V4 => Domain::IPV4,
            IpFamily::V6 => Domain::IPV6,
        }
    }

    fn matches(self, addr: &SocketAddr) -> bool {
        match self {
            IpFamily::V4 => addr.is_ipv4(),
            IpFamily::V6 => addr.is_ipv6(),
        }
    }
}

/// Where a [`TcpTransport`] is opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpTarget {
    /// Address family of the socket
    pub family: IpFamily,
    /// Upper bound on connection establishment (`None` = no bound)
    pub connect_timeout: Option<Duration>,
}

impl TcpTarget {
    /// IPv4 target without a connect timeout
    pub fn v4() -> Self {
        TcpTarget::default()
    }

    /// IPv6 target without a connect timeout
    pub fn v6() -> Self {
        TcpTarget {
            family: IpFamily::V6,
            connect_timeout: None,
        }
    }

    /// Bound connection establishment
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

/// Non-blocking TCP transport
#[derive(Debug)]
pub struct TcpTransport {
    socket: Option<Socket>,
    family: IpFamily,
    connect_timeout: Option<Duration>,
}

impl TcpTransport {
    fn socket(&self) -> io::Result<&Socket> {
        self.socket
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "transport is closed"))
    }

    /// Resolve `hostname` to the first address of this transport's family
    fn resolve(&self, hostname: &str, port: u16) -> io::Result<SocketAddr> {
        (hostname, port)
            .to_socket_addrs()?
            .find(|addr| self.family.matches(addr))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("no {:?} address for {}", self.family, hostname),
                )
            })
    }

    /// Local address of the socket, once bound
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket()?
            .local_addr()?
            .as_socket()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "not an IP socket"))
    }
}

impl Transport for TcpTransport {
    type Target = TcpTarget;

    fn open(target: &TcpTarget) -> io::Result<Self> {
        let socket = Socket::new(target.family.domain(), Type::STREAM, Some(Protocol::TCP))?;

        Ok(TcpTransport {
            socket: Some(socket),
            family: target.family,
            connect_timeout: target.connect_timeout,
        })
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        self.socket()?.set_nonblocking(nonblocking)
    }

    fn connect(&mut self, hostname: &str, port: u16) -> io::Result<()> {
        let addr = self.resolve(hostname, port)?;
        let socket = self.socket()?;

        match socket.connect(&SockAddr::from(addr)) {
            Ok(()) => {}
            Err(e)
                if e.raw_os_error() == Some(libc::EINPROGRESS)
                    || e.kind() == io::ErrorKind::WouldBlock =>
            {
                // Non-blocking connect: writable means the attempt finished
                if !poll_fd(socket.as_raw_fd(), PollEvents::Write, self.connect_timeout)? {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("connect to {} timed out", addr),
                    ));
                }
                if let Some(err) = socket.take_error()? {
                    return Err(err);
                }
            }
            Err(e) => return Err(e),
        }

        socket.set_nodelay(true)?;
        Ok(())
    }

    fn send(&mut self, buf: &[u8]) -> IoOutcome {
        match self.socket() {
            Ok(socket) => IoOutcome::from_io(socket.send_with_flags(buf, SEND_FLAGS)),
            Err(e) => IoOutcome::Failed(e),
        }
    }

    fn recv(&mut self, buf: &mut [u8]) -> IoOutcome {
        match self.socket() {
            Ok(mut socket) => IoOutcome::from_io(socket.read(buf)),
            Err(e) => IoOutcome::Failed(e),
        }
    }

    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> io::Result<bool> {
        poll_fd(self.socket()?.as_raw_fd(), events, timeout)
    }

    fn close(&mut self) -> io::Result<()> {
        let Some(socket) = self.socket.take() else {
            return Ok(());
        };

        // Never-connected sockets report NotConnected; dropping releases the fd either way
        match socket.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e),
            _ => Ok(()),
        }
    }
}
