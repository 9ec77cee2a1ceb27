//! Transport bridge between the TLS engine and a non-blocking transport
//!
//! OpenSSL drives its record layer through `Read`/`Write`. A `WouldBlock`
//! error from either surfaces from the engine as `WANT_READ`/`WANT_WRITE`,
//! which is exactly how a transport's would-block outcome has to reach the
//! retry loops. Any other transport failure is logged here and handed to the
//! engine as a generic error.

use crate::transport::{IoOutcome, Transport};
use std::io::{self, Read, Write};

/// `Read`/`Write` view of a transport, as seen by the TLS engine
#[derive(Debug)]
pub struct TransportBridge<T> {
    transport: T,
}

impl<T: Transport> TransportBridge<T> {
    /// Wrap a transport
    pub fn new(transport: T) -> Self {
        TransportBridge { transport }
    }

    /// Get reference to the transport
    pub fn get_ref(&self) -> &T {
        &self.transport
    }

    /// Get mutable reference to the transport
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

fn bridge_failure(direction: &str, err: io::Error) -> io::Error {
    tracing::error!("transport {} failed: {}", direction, err);
    io::Error::new(io::ErrorKind::Other, format!("transport {} failed: {}", direction, err))
}

impl<T: Transport> Read for TransportBridge<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.transport.recv(buf) {
            IoOutcome::Ready(n) => Ok(n),
            IoOutcome::WouldBlock => Err(io::ErrorKind::WouldBlock.into()),
            IoOutcome::Failed(e) => Err(bridge_failure("recv", e)),
        }
    }
}

impl<T: Transport> Write for TransportBridge<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.transport.send(buf) {
            IoOutcome::Ready(n) => Ok(n),
            IoOutcome::WouldBlock => Err(io::ErrorKind::WouldBlock.into()),
            IoOutcome::Failed(e) => Err(bridge_failure("send", e)),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::PollEvents;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Transport that replays scripted outcomes
    #[derive(Default)]
    struct Scripted {
        recv: VecDeque<IoOutcome>,
        send: VecDeque<IoOutcome>,
    }

    impl Transport for Scripted {
        type Target = ();

        fn open(_: &()) -> io::Result<Self> {
            Ok(Scripted::default())
        }

        fn set_nonblocking(&mut self, _: bool) -> io::Result<()> {
            Ok(())
        }

        fn connect(&mut self, _: &str, _: u16) -> io::Result<()> {
            Ok(())
        }

        fn send(&mut self, _: &[u8]) -> IoOutcome {
            self.send.pop_front().unwrap_or(IoOutcome::WouldBlock)
        }

        fn recv(&mut self, _: &mut [u8]) -> IoOutcome {
            self.recv.pop_front().unwrap_or(IoOutcome::WouldBlock)
        }

        fn poll(&self, _: PollEvents, _: Option<Duration>) -> io::Result<bool> {
            Ok(true)
        }

        fn close(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_bridge_passes_counts_through() {
        let mut transport = Scripted::default();
        transport.send.push_back(IoOutcome::Ready(3));
        transport.recv.push_back(IoOutcome::Ready(0));
        let mut bridge = TransportBridge::new(transport);

        assert_eq!(bridge.write(b"abcdef").unwrap(), 3);
        let mut buf = [0u8; 4];
        assert_eq!(bridge.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_bridge_translates_would_block() {
        let mut bridge = TransportBridge::new(Scripted::default());

        let mut buf = [0u8; 4];
        assert_eq!(bridge.read(&mut buf).unwrap_err().kind(), io::ErrorKind::WouldBlock);
        assert_eq!(bridge.write(b"x").unwrap_err().kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    #[tracing_test::traced_test]
    fn test_bridge_collapses_transport_failures() {
        let mut transport = Scripted::default();
        transport
            .send
            .push_back(IoOutcome::Failed(io::ErrorKind::ConnectionReset.into()));
        // NotConnected would otherwise look retryable to the engine
        transport
            .recv
            .push_back(IoOutcome::Failed(io::ErrorKind::NotConnected.into()));
        let mut bridge = TransportBridge::new(transport);

        assert_eq!(bridge.write(b"x").unwrap_err().kind(), io::ErrorKind::Other);
        let mut buf = [0u8; 4];
        assert_eq!(bridge.read(&mut buf).unwrap_err().kind(), io::ErrorKind::Other);

        assert!(logs_contain("transport send failed"));
        assert!(logs_contain("transport recv failed"));
    }
}
