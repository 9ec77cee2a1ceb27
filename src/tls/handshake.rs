//! Handshake driving and readiness waits
//!
//! The engine never blocks: when it needs the transport it reports
//! `WANT_READ` or `WANT_WRITE` and expects the exact same call to be repeated
//! later. The helpers here turn those signals into a wait on the transport
//! followed by a retry, which is what makes the socket look blocking.

use super::bridge::TransportBridge;
use super::cert::{verify_failure_description, CertInfo};
use super::error::TlsError;
use crate::transport::{PollEvents, Transport};
use openssl::ssl::{self, ErrorCode, ShutdownState, SslRef, SslStream};
use openssl::x509::X509VerifyResult;
use std::time::Duration;

/// Engine session bound to a transport
pub type Session<T> = SslStream<TransportBridge<T>>;

/// Readiness the engine is waiting for, or `None` for a real failure
pub fn wants(err: &ssl::Error) -> Option<PollEvents> {
    match err.code() {
        ErrorCode::WANT_READ => Some(PollEvents::Read),
        ErrorCode::WANT_WRITE => Some(PollEvents::Write),
        _ => None,
    }
}

/// Block until the transport is ready for `events`
///
/// `operation` and `transferred` describe the caller in the timeout error.
pub fn await_transport<T: Transport>(
    session: &Session<T>,
    events: PollEvents,
    timeout: Option<Duration>,
    operation: &'static str,
    transferred: usize,
) -> Result<(), TlsError> {
    tracing::trace!(operation, ?events, "waiting for transport readiness");

    if session.get_ref().get_ref().poll(events, timeout)? {
        Ok(())
    } else {
        Err(TlsError::Timeout {
            operation,
            transferred,
        })
    }
}

/// Run handshake steps until the handshake completes or fails
///
/// With `trace_engine` set, every engine state change is logged, and so is
/// the error queue behind a fatal failure (received alerts included).
pub fn drive<T: Transport>(
    session: &mut Session<T>,
    timeout: Option<Duration>,
    trace_engine: bool,
) -> Result<(), TlsError> {
    let mut steps = 0u32;
    let mut last_state = "";

    loop {
        steps += 1;
        let result = session.connect();

        if trace_engine {
            let state = session.ssl().state_string_long();
            if state != last_state {
                tracing::debug!("engine state: {}", state);
                last_state = state;
            }
        }

        match result {
            Ok(()) => {
                tracing::debug!(steps, "handshake complete");
                return Ok(());
            }
            Err(e) => match wants(&e) {
                Some(events) => await_transport(session, events, timeout, "handshake", 0)?,
                None => {
                    if trace_engine {
                        log_engine_errors(&e);
                    }
                    return Err(TlsError::Handshake(e));
                }
            },
        }
    }
}

/// Log each entry of the engine error queue behind `err`
pub fn log_engine_errors(err: &ssl::Error) {
    match err.ssl_error() {
        Some(stack) => {
            for entry in stack.errors() {
                tracing::debug!("engine error: {}", entry);
            }
        }
        None => tracing::debug!("engine error: {}", err),
    }
}

/// Log which close_notify messages have been exchanged
pub fn log_shutdown_state<T: Transport>(session: &mut Session<T>) {
    let state = session.get_shutdown();
    tracing::debug!(
        "engine shutdown state: sent={} received={}",
        state.contains(ShutdownState::SENT),
        state.contains(ShutdownState::RECEIVED)
    );
}

/// Log the peer certificate and the verification verdict
///
/// Verification was required during the handshake, so a failure here is
/// only reported, never acted upon.
pub fn log_peer_verification(ssl: &SslRef) {
    if let Some(cert) = ssl.peer_certificate() {
        tracing::debug!(
            "Server certificate:\n{}",
            CertInfo::from_x509(&cert).describe("    ")
        );
    }

    let result = ssl.verify_result();
    if result.as_raw() != X509VerifyResult::OK.as_raw() {
        tracing::error!(
            "Certificate verification failed:\n{}",
            verify_failure_description(result, "  ! ")
        );
    } else {
        tracing::info!("Certificate verification passed");
    }
}
