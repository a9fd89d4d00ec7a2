//! Server-side TLS handshake
//!
//! Runs the handshake over the raw connection, including any bytes earlier
//! stages buffered, and enforces the peer verification policy.

use std::pin::Pin;
use std::time::Duration;

use log::{debug, trace};
use openssl::ssl::{Ssl, SslAcceptor};
use openssl::x509::X509VerifyResult;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_openssl::SslStream;

use super::cert::PeerInfo;
use crate::common::{Result, SyslogError};
use crate::config::PeerVerify;
use crate::transport::Lookahead;

/// An established TLS session
pub type TlsStream<S> = Pin<Box<SslStream<Lookahead<S>>>>;

/// Accept a TLS session
///
/// # Parameters
///
/// * `acceptor` - Shared acceptor built from the source's TLS settings
/// * `stream` - Raw connection; buffered bytes are fed to the handshake first
/// * `peer_verify` - Policy the acceptor was built with
/// * `handshake_timeout` - Upper bound for the whole handshake
///
/// # Returns
///
/// The session and the peer's certificate details, if it sent one
pub async fn accept_tls<S>(
    acceptor: &SslAcceptor,
    stream: Lookahead<S>,
    peer_verify: PeerVerify,
    handshake_timeout: Duration,
) -> Result<(TlsStream<S>, Option<PeerInfo>)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ssl = Ssl::new(acceptor.context())?;
    let mut stream = Box::pin(SslStream::new(ssl, stream)?);

    match timeout(handshake_timeout, stream.as_mut().accept()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(SyslogError::HandshakeFailed(e.to_string())),
        Err(_) => return Err(SyslogError::Timeout("during TLS handshake".to_string())),
    }

    let ssl = stream.ssl();
    trace!("TLS handshake complete: {}", ssl.version_str());

    let verified = ssl.verify_result() == X509VerifyResult::OK;
    let peer = match ssl.peer_certificate() {
        Some(cert) => Some(PeerInfo::from_cert(&cert, verified)?),
        None => None,
    };

    check_peer(peer_verify, peer.as_ref(), ssl.verify_result())?;

    if let Some(ref info) = peer {
        debug!(
            "TLS peer CN={} verified={}",
            info.common_name.as_deref().unwrap_or("-"),
            info.verified
        );
    }

    Ok((stream, peer))
}

/// Enforce the peer verification policy after the handshake
fn check_peer(policy: PeerVerify, peer: Option<&PeerInfo>, result: X509VerifyResult) -> Result<()> {
    match peer {
        None if policy.requires_certificate() => Err(SyslogError::HandshakeFailed(
            "peer did not present a certificate".to_string(),
        )),
        Some(info) if policy.requires_trust() && !info.verified => Err(SyslogError::HandshakeFailed(
            format!("peer certificate not trusted: {}", result.error_string()),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(verified: bool) -> PeerInfo {
        PeerInfo {
            common_name: Some("client".to_string()),
            organization: None,
            organizational_unit: None,
            fingerprint: String::new(),
            verified,
        }
    }

    #[test]
    fn test_check_peer_policies() {
        let ok = X509VerifyResult::OK;

        assert!(check_peer(PeerVerify::None, None, ok).is_ok());
        assert!(check_peer(PeerVerify::OptionalUntrusted, None, ok).is_ok());
        assert!(check_peer(PeerVerify::OptionalUntrusted, Some(&peer(false)), ok).is_ok());
        assert!(check_peer(PeerVerify::OptionalTrusted, None, ok).is_ok());
        assert!(check_peer(PeerVerify::OptionalTrusted, Some(&peer(false)), ok).is_err());
        assert!(check_peer(PeerVerify::RequiredUntrusted, None, ok).is_err());
        assert!(check_peer(PeerVerify::RequiredUntrusted, Some(&peer(false)), ok).is_ok());
        assert!(check_peer(PeerVerify::RequiredTrusted, Some(&peer(false)), ok).is_err());
        assert!(check_peer(PeerVerify::RequiredTrusted, Some(&peer(true)), ok).is_ok());
    }
}
