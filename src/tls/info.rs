//! Negotiated session details
//!
//! A snapshot taken from the engine once the handshake has completed.

use super::cert::{get_cert_chain, CertInfo};
use openssl::ssl::{NameType, SslRef};
use openssl::x509::X509VerifyResult;

/// Session information available after the handshake
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Negotiated TLS version (e.g., "TLSv1.3")
    pub version: String,

    /// Negotiated cipher suite
    pub cipher: String,

    /// SNI servername sent to the peer
    pub servername: Option<String>,

    /// Certificate chain (index 0 is peer cert)
    pub cert_chain: Vec<CertInfo>,

    /// Raw verification result (0 = chain verified)
    pub verify_result: i32,

    /// Human-readable verification result
    pub verify_message: String,

    /// Whether session was resumed
    pub sess_reused: bool,
}

impl SessionInfo {
    /// Snapshot an established SSL connection
    pub fn from_ssl(ssl: &SslRef) -> Self {
        let verify = ssl.verify_result();

        SessionInfo {
            version: ssl.version_str().to_string(),
            cipher: ssl
                .current_cipher()
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| "<undef>".to_string()),
            servername: ssl.servername(NameType::HOST_NAME).map(|s| s.to_string()),
            cert_chain: get_cert_chain(ssl),
            verify_result: verify.as_raw(),
            verify_message: verify.error_string().to_string(),
            sess_reused: ssl.session_reused(),
        }
    }

    /// Whether the peer chain verified cleanly
    pub fn verified(&self) -> bool {
        self.verify_result == X509VerifyResult::OK.as_raw()
    }

    /// Get certificate info by index (0 = peer cert, 1+ = chain)
    pub fn cert(&self, index: usize) -> Option<&CertInfo> {
        self.cert_chain.get(index)
    }

    /// Peer certificate
    pub fn peer_cert(&self) -> Option<&CertInfo> {
        self.cert(0)
    }
}
