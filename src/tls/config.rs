//! TLS socket configuration
//!
//! This module provides the client configuration builder applied to every
//! connection a [`TlsSocket`](super::TlsSocket) makes.

use super::error::TlsError;
use std::time::Duration;

/// TLS version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    /// TLS 1.0
    Tls10,
    /// TLS 1.1
    Tls11,
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    /// Get OpenSSL protocol version constant
    pub fn to_openssl_version(&self) -> openssl::ssl::SslVersion {
        use openssl::ssl::SslVersion;
        match self {
            TlsVersion::Tls10 => SslVersion::TLS1,
            TlsVersion::Tls11 => SslVersion::TLS1_1,
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }

    /// Get version as string
    pub fn as_str(&self) -> &'static str {
        match self {
            TlsVersion::Tls10 => "TLSv1.0",
            TlsVersion::Tls11 => "TLSv1.1",
            TlsVersion::Tls12 => "TLSv1.2",
            TlsVersion::Tls13 => "TLSv1.3",
        }
    }
}

impl std::str::FromStr for TlsVersion {
    type Err = TlsError;

    /// Parse TLS version from string (case-insensitive)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TLSV1.0" | "TLS1.0" | "TLSV1" | "TLS1" => Ok(TlsVersion::Tls10),
            "TLSV1.1" | "TLS1.1" => Ok(TlsVersion::Tls11),
            "TLSV1.2" | "TLS1.2" => Ok(TlsVersion::Tls12),
            "TLSV1.3" | "TLS1.3" => Ok(TlsVersion::Tls13),
            _ => Err(TlsError::InvalidVersion(s.to_string())),
        }
    }
}

impl std::fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TLS socket configuration (immutable after building)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSocketConfig {
    pub(crate) min_version: Option<TlsVersion>,
    pub(crate) max_version: Option<TlsVersion>,
    pub(crate) cipher_list: Option<String>,
    pub(crate) io_timeout: Option<Duration>,
    pub(crate) trace_verification: bool,
    pub(crate) trace_engine: bool,
}

impl TlsSocketConfig {
    /// Create a new configuration builder
    pub fn builder() -> TlsSocketConfigBuilder {
        TlsSocketConfigBuilder::new()
    }

    /// Lowest protocol version offered
    pub fn min_version(&self) -> Option<TlsVersion> {
        self.min_version
    }

    /// Highest protocol version offered
    pub fn max_version(&self) -> Option<TlsVersion> {
        self.max_version
    }

    /// OpenSSL cipher list for TLS <= 1.2
    pub fn cipher_list(&self) -> Option<&str> {
        self.cipher_list.as_deref()
    }

    /// Bound on each wait for transport readiness
    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout
    }

    /// Whether the per-certificate verification hook logs the chain
    pub fn trace_verification(&self) -> bool {
        self.trace_verification
    }

    /// Whether engine state changes and shutdown state are logged
    pub fn trace_engine(&self) -> bool {
        self.trace_engine
    }
}

impl Default for TlsSocketConfig {
    fn default() -> Self {
        TlsSocketConfig {
            min_version: Some(TlsVersion::Tls12),
            max_version: None,
            cipher_list: None,
            io_timeout: None,
            trace_verification: false,
            trace_engine: false,
        }
    }
}

/// Configuration builder
pub struct TlsSocketConfigBuilder {
    config: TlsSocketConfig,
}

impl TlsSocketConfigBuilder {
    fn new() -> Self {
        TlsSocketConfigBuilder {
            config: TlsSocketConfig::default(),
        }
    }

    /// Set TLS version (both min and max)
    pub fn version(mut self, version: TlsVersion) -> Self {
        self.config.min_version = Some(version);
        self.config.max_version = Some(version);
        self
    }

    /// Set TLS version range
    pub fn version_range(mut self, min: TlsVersion, max: TlsVersion) -> Self {
        self.config.min_version = Some(min);
        self.config.max_version = Some(max);
        self
    }

    /// Set cipher list (for TLS <= 1.2)
    pub fn cipher_list(mut self, ciphers: impl Into<String>) -> Self {
        self.config.cipher_list = Some(ciphers.into());
        self
    }

    /// Bound every readiness wait (handshake, send and receive)
    pub fn io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.io_timeout = timeout;
        self
    }

    /// Log each certificate of the peer chain as it is verified
    pub fn trace_verification(mut self, enable: bool) -> Self {
        self.config.trace_verification = enable;
        self
    }

    /// Log every handshake state the engine passes through
    pub fn trace_engine(mut self, enable: bool) -> Self {
        self.config.trace_engine = enable;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<TlsSocketConfig, TlsError> {
        let config = self.config;

        if let (Some(min), Some(max)) = (config.min_version, config.max_version) {
            if min > max {
                return Err(TlsError::InvalidConfig(format!(
                    "minimum version {} is above maximum version {}",
                    min, max
                )));
            }
        }

        if config.cipher_list.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(TlsError::InvalidConfig("cipher list is empty".to_string()));
        }

        if config.io_timeout == Some(Duration::ZERO) {
            return Err(TlsError::InvalidConfig(
                "I/O timeout must be non-zero".to_string(),
            ));
        }

        Ok(config)
    }
}
