//! TLS acceptor creation

use log::{debug, info};
use openssl::ssl::{SslAcceptor, SslFiletype, SslMethod, SslVerifyMode};

use crate::common::{Result, SyslogError};
use crate::config::{PeerVerify, TlsConfig};

/// Session id context; OpenSSL requires one once client certificates are requested
const SESSION_ID_CONTEXT: &[u8] = b"syslog-autodetect";

/// Create a TLS acceptor from the source's TLS settings
///
/// The acceptor is built once at startup and shared read-only by every
/// connection.
///
/// # Example
///
/// ```no_run
/// # use syslog_autodetect::tls::create_tls_acceptor;
/// # use syslog_autodetect::config::{PeerVerify, TlsConfig};
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let tls = TlsConfig::new("certs/server.key", "certs/server.crt")
///     .with_ca_file("certs/ca.crt")
///     .with_peer_verify(PeerVerify::RequiredTrusted);
/// let acceptor = create_tls_acceptor(&tls)?;
/// # Ok(())
/// # }
/// ```
pub fn create_tls_acceptor(tls: &TlsConfig) -> Result<SslAcceptor> {
    let mut acceptor = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls())?;

    acceptor
        .set_certificate_chain_file(&tls.cert_file)
        .map_err(|e| SyslogError::Certificate(format!(
            "Failed to load certificate {}: {}", tls.cert_file.display(), e
        )))?;
    acceptor
        .set_private_key_file(&tls.key_file, SslFiletype::PEM)
        .map_err(|e| SyslogError::Certificate(format!(
            "Failed to load private key {}: {}", tls.key_file.display(), e
        )))?;
    acceptor
        .check_private_key()
        .map_err(|e| SyslogError::Certificate(format!("Private key does not match certificate: {}", e)))?;

    if let Some(ref ca_file) = tls.ca_file {
        acceptor
            .set_ca_file(ca_file)
            .map_err(|e| SyslogError::Certificate(format!(
                "Failed to load CA bundle {}: {}", ca_file.display(), e
            )))?;
    }

    acceptor.set_session_id_context(SESSION_ID_CONTEXT)?;

    // Untrusted modes still request the certificate but accept any chain;
    // the verify result is kept for PeerInfo::verified
    match tls.peer_verify {
        PeerVerify::None => {
            acceptor.set_verify(SslVerifyMode::NONE);
        }
        PeerVerify::OptionalUntrusted => {
            acceptor.set_verify_callback(SslVerifyMode::PEER, |_, _| true);
        }
        PeerVerify::OptionalTrusted => {
            acceptor.set_verify(SslVerifyMode::PEER);
        }
        PeerVerify::RequiredUntrusted => {
            acceptor.set_verify_callback(
                SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT,
                |_, _| true,
            );
        }
        PeerVerify::RequiredTrusted => {
            acceptor.set_verify(SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT);
        }
    }

    info!("TLS enabled, peer verification: {}", tls.peer_verify);
    debug!("TLS certificate {}, key {}", tls.cert_file.display(), tls.key_file.display());

    Ok(acceptor.build())
}
