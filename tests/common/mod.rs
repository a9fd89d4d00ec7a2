//! Shared helpers for integration tests
//!
//! Generates a throwaway PKI, starts a source on an ephemeral port and
//! provides TLS clients.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use openssl::x509::extension::{BasicConstraints, KeyUsage};
use openssl::x509::{X509Builder, X509NameBuilder, X509};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_openssl::SslStream;

use syslog_autodetect::config::{PeerVerify, SourceConfig, TlsConfig, TransportKind};
use syslog_autodetect::output::FileSink;
use syslog_autodetect::server::StatsSnapshot;
use syslog_autodetect::{create_tls_acceptor, SourceHandle, SyslogSource};

/// Sample message in the shape of a BSD syslog line
pub fn sample_message(i: usize) -> String {
    format!("<2>Oct 11 22:14:15 myhostname sshd[1234]: message {}", i)
}

/// What the output holds for `sample_message(i)`
pub fn expected_line(i: usize) -> String {
    format!("Oct 11 22:14:15 myhostname sshd[1234]: message {}", i)
}

/// Octet-counted frame for `msg`
pub fn counted(msg: &str) -> String {
    format!("{} {}", msg.len(), msg)
}

/// PROXY v2 header for 1.1.1.1:33333 -> 2.2.2.2:44444
pub const PROXY_V2_HEADER: [u8; 28] = [
    0x0D, 0x0A, 0x0D, 0x0A, 0x00, 0x0D, 0x0A, 0x51, 0x55, 0x49, 0x54, 0x0A, // signature
    0x21, 0x11, 0x00, 0x0C, // v2 PROXY, TCP over IPv4, 12 bytes
    0x01, 0x01, 0x01, 0x01, 0x02, 0x02, 0x02, 0x02, // addresses
    0x82, 0x35, 0xAD, 0x9C, // ports
];

pub const PROXY_V1_HEADER: &str = "PROXY TCP4 1.1.1.1 2.2.2.2 3333 4444\r\n";

/// Certificate and key
pub struct Identity {
    pub cert: X509,
    pub key: PKey<Private>,
}

/// CA, server and client credentials written to a temporary directory
pub struct TestPki {
    pub dir: TempDir,
    pub ca_file: PathBuf,
    pub server_cert_file: PathBuf,
    pub server_key_file: PathBuf,
    /// Signed by the test CA
    pub client: Identity,
    /// Self-signed, unknown to the CA
    pub rogue: Identity,
}

fn ec_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

fn build_cert(common_name: &str, key: &PKey<Private>, issuer: Option<&Identity>, serial: u32, is_ca: bool) -> X509 {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, common_name).unwrap();
    name.append_entry_by_nid(Nid::ORGANIZATIONNAME, "Syslog Test").unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(serial).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    match issuer {
        Some(issuer) => builder.set_issuer_name(issuer.cert.subject_name()).unwrap(),
        None => builder.set_issuer_name(&name).unwrap(),
    }
    builder.set_pubkey(key).unwrap();
    builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
    builder.set_not_after(&Asn1Time::days_from_now(30).unwrap()).unwrap();

    if is_ca {
        builder
            .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
            .unwrap();
        builder
            .append_extension(KeyUsage::new().critical().key_cert_sign().crl_sign().build().unwrap())
            .unwrap();
    } else {
        builder.append_extension(BasicConstraints::new().build().unwrap()).unwrap();
    }

    let signer = issuer.map(|issuer| &issuer.key).unwrap_or(key);
    builder.sign(signer, MessageDigest::sha256()).unwrap();
    builder.build()
}

fn identity(common_name: &str, issuer: Option<&Identity>, serial: u32, is_ca: bool) -> Identity {
    let key = ec_key();
    let cert = build_cert(common_name, &key, issuer, serial, is_ca);
    Identity { cert, key }
}

fn write_pem(path: &Path, pem: Vec<u8>) {
    std::fs::write(path, pem).unwrap();
}

impl TestPki {
    pub fn generate() -> Self {
        let dir = tempfile::tempdir().unwrap();

        let ca = identity("Syslog Test CA", None, 1, true);
        let server = identity("localhost", Some(&ca), 2, false);
        let client = identity("client.example", Some(&ca), 3, false);
        let rogue = identity("rogue.example", None, 4, false);

        let ca_file = dir.path().join("ca.crt");
        let server_cert_file = dir.path().join("server.crt");
        let server_key_file = dir.path().join("server.key");
        write_pem(&ca_file, ca.cert.to_pem().unwrap());
        write_pem(&server_cert_file, server.cert.to_pem().unwrap());
        write_pem(&server_key_file, server.key.private_key_to_pem_pkcs8().unwrap());

        Self {
            dir,
            ca_file,
            server_cert_file,
            server_key_file,
            client,
            rogue,
        }
    }

    /// Server TLS settings with the given peer policy; trusted policies get the CA
    pub fn tls_config(&self, peer_verify: PeerVerify) -> TlsConfig {
        let tls = TlsConfig::new(&self.server_key_file, &self.server_cert_file).with_peer_verify(peer_verify);
        if peer_verify == PeerVerify::None {
            tls
        } else {
            tls.with_ca_file(&self.ca_file)
        }
    }
}

/// Client TLS handshake over an existing stream
pub async fn try_tls_over<S>(stream: S, identity: Option<&Identity>) -> Result<Pin<Box<SslStream<S>>>, openssl::ssl::Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut builder = SslConnector::builder(SslMethod::tls()).unwrap();
    builder.set_verify(SslVerifyMode::NONE);
    if let Some(identity) = identity {
        builder.set_certificate(&identity.cert).unwrap();
        builder.set_private_key(&identity.key).unwrap();
    }

    let ssl = builder.build().configure().unwrap().into_ssl("localhost").unwrap();
    let mut stream = Box::pin(SslStream::new(ssl, stream).unwrap());
    stream.as_mut().connect().await?;
    Ok(stream)
}

pub async fn tls_over<S>(stream: S, identity: Option<&Identity>) -> Pin<Box<SslStream<S>>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    try_tls_over(stream, identity).await.unwrap()
}

/// Write `data` and close the sending side
pub async fn send_and_close<W: AsyncWrite + Unpin>(mut writer: W, data: &[u8]) {
    let _ = writer.write_all(data).await;
    let _ = writer.shutdown().await;
}

/// A running source writing to a temporary file
pub struct TestSource {
    pub handle: SourceHandle,
    pub addr: SocketAddr,
    pub output: PathBuf,
    writer: JoinHandle<syslog_autodetect::Result<()>>,
    _dir: TempDir,
}

impl TestSource {
    pub async fn start(mut config: SourceConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        config.listen = "127.0.0.1:0".parse().unwrap();
        config.output = dir.path().join("messages.log");

        let uses_tls = config.transport.requires_tls() || config.transport == TransportKind::Auto;
        let acceptor = match config.tls {
            Some(ref tls) if uses_tls => Some(create_tls_acceptor(tls).unwrap()),
            _ => None,
        };

        let output = config.output.clone();
        let (sink, writer) = FileSink::open(&output, 64).await.unwrap();
        let source = SyslogSource::bind(config, acceptor, sink).await.unwrap();
        let addr = source.local_addr();

        Self {
            handle: source.start(),
            addr,
            output,
            writer,
            _dir: dir,
        }
    }

    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }

    /// Wait until `closed` connections have finished
    pub async fn wait_for_closed(&self, closed: u64) -> StatsSnapshot {
        for _ in 0..200 {
            let stats = self.handle.stats();
            if stats.connections_closed >= closed {
                return stats;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("timed out waiting for {} closed connections: {:?}", closed, self.handle.stats());
    }

    pub fn lines(&self) -> Vec<String> {
        std::fs::read_to_string(&self.output)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Wait until the output has at least `count` lines
    pub async fn wait_for_lines(&self, count: usize) -> Vec<String> {
        for _ in 0..200 {
            let lines = self.lines();
            if lines.len() >= count {
                return lines;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("timed out waiting for {} lines, have {:?}", count, self.lines());
    }

    /// Shut the source down and return everything written
    pub async fn stop(self) -> Vec<String> {
        self.handle.shutdown().await.unwrap();
        drop(self.handle);
        self.writer.await.unwrap().unwrap();

        std::fs::read_to_string(&self.output)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}
