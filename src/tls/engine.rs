//! TLS engine resources
//!
//! [`EngineResources`] is what `open` allocates next to the transport: a
//! client context under construction and an empty trust store. `connect`
//! consumes it to produce a session configured for one peer.

use super::cert::{verify_failure_description, CertInfo};
use super::config::TlsSocketConfig;
use super::error::TlsError;
use openssl::ssl::{Ssl, SslContextBuilder, SslMethod, SslMode, SslOptions, SslVerifyMode};
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::verify::X509CheckFlags;
use openssl::x509::{X509StoreContextRef, X509};
use std::net::IpAddr;

/// Engine state owned by an open socket
pub struct EngineResources {
    context: SslContextBuilder,
    trust_store: X509StoreBuilder,
}

impl EngineResources {
    /// Allocate a client context and an empty trust store
    pub fn new() -> Result<Self, TlsError> {
        let context = SslContextBuilder::new(SslMethod::tls_client())
            .map_err(TlsError::setup("ssl_ctx_new"))?;
        let trust_store = X509StoreBuilder::new().map_err(TlsError::setup("x509_store_new"))?;

        Ok(EngineResources {
            context,
            trust_store,
        })
    }

    /// Configure a client session for `hostname`, trusting only `root_ca_pem`
    pub fn configure(
        self,
        hostname: &str,
        root_ca_pem: Option<&[u8]>,
        config: &TlsSocketConfig,
    ) -> Result<Ssl, TlsError> {
        let EngineResources {
            mut context,
            mut trust_store,
        } = self;

        seed_rng()?;

        // Trust anchors
        let pem = root_ca_pem.ok_or(TlsError::MissingRootCa)?;
        let roots = X509::stack_from_pem(pem)
            .map_err(|e| TlsError::Certificate(format!("failed to parse root CA bundle: {}", e)))?;
        if roots.is_empty() {
            return Err(TlsError::Certificate(
                "root CA bundle contains no certificates".to_string(),
            ));
        }
        for root in roots {
            trust_store
                .add_cert(root)
                .map_err(TlsError::setup("x509_store_add_cert"))?;
        }

        // Client defaults over a stream transport
        context.set_options(SslOptions::ALL | SslOptions::NO_COMPRESSION);
        context.set_mode(
            SslMode::AUTO_RETRY | SslMode::ACCEPT_MOVING_WRITE_BUFFER | SslMode::ENABLE_PARTIAL_WRITE,
        );
        if let Some(min) = config.min_version() {
            context
                .set_min_proto_version(Some(min.to_openssl_version()))
                .map_err(TlsError::setup("set_min_proto_version"))?;
        }
        if let Some(max) = config.max_version() {
            context
                .set_max_proto_version(Some(max.to_openssl_version()))
                .map_err(TlsError::setup("set_max_proto_version"))?;
        }
        if let Some(ciphers) = config.cipher_list() {
            context
                .set_cipher_list(ciphers)
                .map_err(TlsError::setup("set_cipher_list"))?;
        }

        context.set_cert_store(trust_store.build());

        // Peer certificate must validate
        if config.trace_verification() {
            context.set_verify_callback(SslVerifyMode::PEER, trace_verify);
        } else {
            context.set_verify(SslVerifyMode::PEER);
        }

        let context = context.build();
        let mut ssl = Ssl::new(&context).map_err(TlsError::setup("ssl_new"))?;

        // Expected peer identity
        match hostname.parse::<IpAddr>() {
            Ok(ip) => ssl
                .param_mut()
                .set_ip(ip)
                .map_err(TlsError::setup("x509_verify_param_set_ip"))?,
            Err(_) => {
                ssl.set_hostname(hostname)
                    .map_err(TlsError::setup("ssl_set_hostname"))?;
                let param = ssl.param_mut();
                param.set_hostflags(X509CheckFlags::NO_PARTIAL_WILDCARDS);
                param
                    .set_host(hostname)
                    .map_err(TlsError::setup("x509_verify_param_set_host"))?;
            }
        }

        Ok(ssl)
    }
}

impl std::fmt::Debug for EngineResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineResources").finish_non_exhaustive()
    }
}

/// Make sure the engine's CSPRNG is seeded before any key material is drawn
fn seed_rng() -> Result<(), TlsError> {
    let mut probe = [0u8; 32];
    openssl::rand::rand_bytes(&mut probe).map_err(TlsError::setup("rand_bytes"))
}

/// Verification hook: log every certificate of the chain, keep OpenSSL's verdict
fn trace_verify(preverify_ok: bool, ctx: &mut X509StoreContextRef) -> bool {
    tracing::debug!("Verifying certificate at depth {}:", ctx.error_depth());

    if let Some(cert) = ctx.current_cert() {
        tracing::debug!("{}", CertInfo::from_x509(cert).describe("  "));
    }

    if preverify_ok {
        tracing::info!("No verification issue for this certificate");
    } else {
        tracing::info!("{}", verify_failure_description(ctx.error(), "  ! "));
    }

    preverify_ok
}
