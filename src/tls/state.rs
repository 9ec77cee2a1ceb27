//! Socket lifecycle state machine

use super::error::TlsError;

/// Socket state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    /// No transport and no TLS resources
    Closed,

    /// Transport and TLS resources allocated, no session
    Open,

    /// Transport connect and handshake in progress
    Connecting,

    /// Handshake complete, application data may flow
    Established,
}

impl SocketState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: SocketState) -> bool {
        use SocketState::*;

        matches!(
            (self, next),
            (Closed, Open)
                | (Open, Connecting)
                | (Connecting, Established)
                | (Connecting, Open)
                | (_, Closed)
        )
    }

    /// Transition to new state
    pub fn transition(&mut self, next: SocketState) -> Result<(), TlsError> {
        if !self.can_transition_to(next) {
            return Err(TlsError::InvalidTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }
}

impl std::fmt::Display for SocketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::Connecting => write!(f, "connecting"),
            Self::Established => write!(f, "established"),
        }
    }
}
