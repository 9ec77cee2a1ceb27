//! Shared fixtures for the integration tests
//!
//! - A throwaway PKI (root CA plus server leaves) generated with OpenSSL
//! - A TLS server thread on an ephemeral loopback port
//! - `TestTransport`, a TCP transport with injectable faults and handle counting

#![allow(dead_code)]

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::ssl::{SslAcceptor, SslMethod, SslStream};
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName,
    SubjectKeyIdentifier,
};
use openssl::x509::{X509Name, X509NameBuilder, X509};
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tls_socket::transport::{IoOutcome, PollEvents, TcpTarget, TcpTransport, Transport};

fn ec_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

fn name(cn: &str) -> X509Name {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("O", "tls-socket tests").unwrap();
    name.append_entry_by_text("CN", cn).unwrap();
    name.build()
}

/// Certificate authority that can issue server certificates
pub struct TestCa {
    pub cert: X509,
    key: PKey<Private>,
    next_serial: AtomicUsize,
}

impl TestCa {
    pub fn new(cn: &str) -> Self {
        let key = ec_key();
        let name = name(cn);

        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder.set_not_after(&Asn1Time::days_from_now(365).unwrap()).unwrap();

        builder
            .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
            .unwrap();
        builder
            .append_extension(
                KeyUsage::new()
                    .critical()
                    .key_cert_sign()
                    .crl_sign()
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let ski = SubjectKeyIdentifier::new()
            .build(&builder.x509v3_context(None, None))
            .unwrap();
        builder.append_extension(ski).unwrap();

        builder.sign(&key, MessageDigest::sha256()).unwrap();

        TestCa {
            cert: builder.build(),
            key,
            next_serial: AtomicUsize::new(2),
        }
    }

    /// Root certificate in PEM form, as handed to the socket
    pub fn pem(&self) -> Vec<u8> {
        self.cert.to_pem().unwrap()
    }

    /// Issue a server certificate valid for `dns_names` and 127.0.0.1
    pub fn issue(&self, dns_names: &[&str]) -> ServerIdentity {
        let key = ec_key();
        let cn = dns_names.first().copied().unwrap_or("127.0.0.1");

        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        let serial = self.next_serial.fetch_add(1, Ordering::SeqCst) as u32;
        let serial = BigNum::from_u32(serial).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name(cn)).unwrap();
        builder.set_issuer_name(self.cert.subject_name()).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder.set_not_after(&Asn1Time::days_from_now(30).unwrap()).unwrap();

        builder
            .append_extension(BasicConstraints::new().build().unwrap())
            .unwrap();
        builder
            .append_extension(
                KeyUsage::new()
                    .critical()
                    .digital_signature()
                    .build()
                    .unwrap(),
            )
            .unwrap();
        builder
            .append_extension(ExtendedKeyUsage::new().server_auth().build().unwrap())
            .unwrap();

        let mut san = SubjectAlternativeName::new();
        for dns in dns_names {
            san.dns(dns);
        }
        san.ip("127.0.0.1");
        let san = san
            .build(&builder.x509v3_context(Some(&self.cert), None))
            .unwrap();
        builder.append_extension(san).unwrap();

        let aki = AuthorityKeyIdentifier::new()
            .keyid(false)
            .issuer(false)
            .build(&builder.x509v3_context(Some(&self.cert), None))
            .unwrap();
        builder.append_extension(aki).unwrap();

        builder.sign(&self.key, MessageDigest::sha256()).unwrap();

        ServerIdentity {
            cert: builder.build(),
            key,
        }
    }
}

/// Server certificate and its private key
pub struct ServerIdentity {
    pub cert: X509,
    pub key: PKey<Private>,
}

/// Server side of one test connection
pub type ServerStream = SslStream<TcpStream>;

/// Accept one TLS connection on a loopback port and hand it to `handler`
///
/// The handler runs on its own thread and is skipped if the handshake
/// fails. Returns the port and the thread handle; the handle yields whether
/// the handshake succeeded.
pub fn spawn_server<F>(identity: ServerIdentity, handler: F) -> (u16, JoinHandle<bool>)
where
    F: FnOnce(&mut ServerStream) + Send + 'static,
{
    let mut acceptor = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls_server()).unwrap();
    acceptor.set_private_key(&identity.key).unwrap();
    acceptor.set_certificate(&identity.cert).unwrap();
    acceptor.check_private_key().unwrap();
    let acceptor = acceptor.build();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let (tcp_stream, _) = listener.accept().unwrap();
        tcp_stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();

        match acceptor.accept(tcp_stream) {
            Ok(mut stream) => {
                handler(&mut stream);
                let _ = stream.shutdown();
                true
            }
            Err(_) => false,
        }
    });

    (port, handle)
}

/// Echo everything back until the client closes
pub fn echo(stream: &mut ServerStream) {
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                if stream.write_all(&buf[..n]).is_err() {
                    return;
                }
            }
        }
    }
}

/// Read exactly `len` bytes, then report their sum and count back
pub fn checksum(len: usize) -> impl FnOnce(&mut ServerStream) {
    move |stream| {
        let mut data = vec![0u8; len];
        stream.read_exact(&mut data).unwrap();
        let sum: u64 = data.iter().map(|b| *b as u64).sum();

        let mut reply = Vec::with_capacity(16);
        reply.extend_from_slice(&(len as u64).to_be_bytes());
        reply.extend_from_slice(&sum.to_be_bytes());
        stream.write_all(&reply).unwrap();
    }
}

/// Deterministic payload
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Faults to inject into a `TestTransport`
#[derive(Debug, Default, Clone)]
pub struct Faults {
    pub fail_open: bool,
    pub fail_nonblocking: bool,
    pub fail_connect: bool,
    /// Report would-block on every Nth send and recv attempt
    pub would_block_every: Option<usize>,
}

/// Shared view of every transport opened against one target
#[derive(Debug, Default)]
pub struct Counters {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub would_blocks: AtomicUsize,
    pub polls: AtomicUsize,
    /// Fail all further transfers once set
    pub sever: AtomicBool,
}

impl Counters {
    /// Transports opened and not yet closed
    pub fn live(&self) -> usize {
        self.opened.load(Ordering::SeqCst) - self.closed.load(Ordering::SeqCst)
    }
}

/// Target for a `TestTransport`
#[derive(Debug, Default)]
pub struct TestTarget {
    pub tcp: TcpTarget,
    pub faults: Faults,
    pub counters: Arc<Counters>,
}

impl TestTarget {
    pub fn with_faults(faults: Faults) -> Self {
        TestTarget {
            faults,
            ..Default::default()
        }
    }
}

/// TCP transport wrapper with fault injection
#[derive(Debug)]
pub struct TestTransport {
    inner: TcpTransport,
    faults: Faults,
    counters: Arc<Counters>,
    attempts: usize,
    closed: bool,
}

impl TestTransport {
    fn should_block(&mut self) -> bool {
        self.attempts += 1;
        match self.faults.would_block_every {
            Some(n) if self.attempts % n == 0 => {
                self.counters.would_blocks.fetch_add(1, Ordering::SeqCst);
                true
            }
            _ => false,
        }
    }

    fn severed(&self) -> bool {
        self.counters.sever.load(Ordering::SeqCst)
    }
}

impl Transport for TestTransport {
    type Target = TestTarget;

    fn open(target: &TestTarget) -> io::Result<Self> {
        if target.faults.fail_open {
            return Err(io::Error::from_raw_os_error(libc::EMFILE));
        }

        let inner = TcpTransport::open(&target.tcp)?;
        target.counters.opened.fetch_add(1, Ordering::SeqCst);

        Ok(TestTransport {
            inner,
            faults: target.faults.clone(),
            counters: target.counters.clone(),
            attempts: 0,
            closed: false,
        })
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        if self.faults.fail_nonblocking {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        self.inner.set_nonblocking(nonblocking)
    }

    fn connect(&mut self, hostname: &str, port: u16) -> io::Result<()> {
        if self.faults.fail_connect {
            return Err(io::Error::from_raw_os_error(libc::ENETUNREACH));
        }
        self.inner.connect(hostname, port)
    }

    fn send(&mut self, buf: &[u8]) -> IoOutcome {
        if self.severed() {
            return IoOutcome::Failed(io::Error::from_raw_os_error(libc::EPIPE));
        }
        if self.should_block() {
            return IoOutcome::WouldBlock;
        }
        self.inner.send(buf)
    }

    fn recv(&mut self, buf: &mut [u8]) -> IoOutcome {
        if self.severed() {
            return IoOutcome::Failed(io::Error::from_raw_os_error(libc::ECONNRESET));
        }
        if self.should_block() {
            return IoOutcome::WouldBlock;
        }
        self.inner.recv(buf)
    }

    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> io::Result<bool> {
        self.counters.polls.fetch_add(1, Ordering::SeqCst);
        self.inner.poll(events, timeout)
    }

    fn close(&mut self) -> io::Result<()> {
        if !self.closed {
            self.closed = true;
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.close()
    }
}
