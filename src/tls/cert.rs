//! Certificate diagnostics
//!
//! Human-readable summaries of peer certificates and of verification
//! results, used for logging after the handshake.

use openssl::nid::Nid;
use openssl::ssl::SslRef;
use openssl::x509::{X509NameRef, X509Ref, X509VerifyResult};
use std::fmt::Write;

/// Certificate information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertInfo {
    /// Certificate subject (Common Name)
    pub subject: String,
    /// Certificate issuer (Common Name)
    pub issuer: String,
    /// Subject Alternative Names (DNS names and IP addresses)
    pub subject_alt_names: Vec<String>,
    /// Serial number in hex
    pub serial: String,
    pub not_before: String,
    pub not_after: String,
}

impl CertInfo {
    /// Extract certificate information from an X.509 certificate
    pub fn from_x509(cert: &X509Ref) -> Self {
        CertInfo {
            subject: Self::get_cn(cert.subject_name()),
            issuer: Self::get_cn(cert.issuer_name()),
            subject_alt_names: Self::get_subject_alt_names(cert),
            serial: cert
                .serial_number()
                .to_bn()
                .and_then(|bn| bn.to_hex_str().map(|s| s.to_string()))
                .unwrap_or_else(|_| "<undef>".to_string()),
            not_before: cert.not_before().to_string(),
            not_after: cert.not_after().to_string(),
        }
    }

    /// Render one field per line, each line starting with `prefix`
    pub fn describe(&self, prefix: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}subject name      : {}", prefix, self.subject);
        let _ = writeln!(out, "{}issuer name       : {}", prefix, self.issuer);
        let _ = writeln!(out, "{}serial number     : {}", prefix, self.serial);
        let _ = writeln!(out, "{}issued  on        : {}", prefix, self.not_before);
        let _ = writeln!(out, "{}expires on        : {}", prefix, self.not_after);
        if !self.subject_alt_names.is_empty() {
            let _ = writeln!(
                out,
                "{}subject alt name  : {}",
                prefix,
                self.subject_alt_names.join(", ")
            );
        }
        out
    }

    /// Get Common Name from X509_NAME
    fn get_cn(name: &X509NameRef) -> String {
        name.entries_by_nid(Nid::COMMONNAME)
            .next()
            .and_then(|entry| entry.data().as_utf8().ok())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "<undef>".to_string())
    }

    fn get_subject_alt_names(cert: &X509Ref) -> Vec<String> {
        let mut names = Vec::new();

        if let Some(san_ext) = cert.subject_alt_names() {
            for name in san_ext {
                if let Some(dns) = name.dnsname() {
                    names.push(format!("DNS:{}", dns));
                } else if let Some(ip) = name.ipaddress() {
                    let addr = match ip.len() {
                        4 => <[u8; 4]>::try_from(ip).ok().map(std::net::IpAddr::from),
                        16 => <[u8; 16]>::try_from(ip).ok().map(std::net::IpAddr::from),
                        _ => None,
                    };
                    if let Some(addr) = addr {
                        names.push(format!("IP:{}", addr));
                    }
                }
            }
        }

        names
    }
}

/// Peer certificate followed by the rest of the chain it presented
pub fn get_cert_chain(ssl: &SslRef) -> Vec<CertInfo> {
    let mut chain = Vec::new();

    if let Some(peer_cert) = ssl.peer_certificate() {
        chain.push(CertInfo::from_x509(&peer_cert));
    }

    // The client-side chain repeats the leaf at index 0
    if let Some(cert_chain) = ssl.peer_cert_chain() {
        for cert in cert_chain.iter().skip(1) {
            chain.push(CertInfo::from_x509(cert));
        }
    }

    chain
}

/// Describe a verification result, `prefix` leading the line
pub fn verify_failure_description(result: X509VerifyResult, prefix: &str) -> String {
    format!(
        "{}{} (code {})",
        prefix,
        result.error_string(),
        result.as_raw()
    )
}
