//! Staged detection pipeline
//!
//! Runs on every accepted connection, in order:
//! PROXY header on the raw socket, TLS, PROXY header inside TLS, then hands
//! the decoded stream to the framing reader. Bytes a stage reads but does not
//! consume are passed on to the next stage untouched.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace};
use openssl::ssl::SslAcceptor;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;

use super::state::{ConnectionInfo, DetectionPlan, DetectionState, StagePolicy};
use crate::common::{Result, SyslogError};
use crate::config::{FramingPolicy, PeerVerify, SourceConfig};
use crate::protocol::proxy_header::{self, ParseOutcome};
use crate::protocol::{sniff, DetectionResult, FrameReader, ProtocolDetector, ProxyHeader, TlsDetector};
use crate::tls::accept_tls;
use crate::transport::{ByteSource, Lookahead};

/// Per-source detection settings, shared by all connections
pub struct Detector {
    plan: DetectionPlan,
    acceptor: Option<Arc<SslAcceptor>>,
    peer_verify: PeerVerify,
    framing: FramingPolicy,
    max_message_size: usize,
    initial_data_timeout: Duration,
    handshake_timeout: Duration,
    tls_detector: TlsDetector,
}

impl std::fmt::Debug for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector")
            .field("plan", &self.plan)
            .field("acceptor", &self.acceptor.as_ref().map(|_| "<SslAcceptor>"))
            .field("peer_verify", &self.peer_verify)
            .field("framing", &self.framing)
            .field("max_message_size", &self.max_message_size)
            .finish()
    }
}

impl Detector {
    /// Create a detector for a source
    ///
    /// # Parameters
    ///
    /// * `config` - Source configuration
    /// * `acceptor` - TLS acceptor, when the source has TLS settings
    ///
    /// # Returns
    ///
    /// An error if the transport needs TLS and no acceptor was given
    pub fn new(config: &SourceConfig, acceptor: Option<Arc<SslAcceptor>>) -> Result<Self> {
        if config.transport.requires_tls() && acceptor.is_none() {
            return Err(SyslogError::Config(format!(
                "transport '{}' requires TLS settings",
                config.transport
            )));
        }

        let peer_verify = config
            .tls
            .as_ref()
            .map(|tls| tls.peer_verify)
            .unwrap_or(PeerVerify::None);

        Ok(Self {
            plan: DetectionPlan::for_transport(config.transport, acceptor.is_some()),
            acceptor,
            peer_verify,
            framing: config.framing,
            max_message_size: config.max_message_size,
            initial_data_timeout: Duration::from_secs(config.initial_data_timeout),
            handshake_timeout: Duration::from_secs(config.handshake_timeout),
            tls_detector: TlsDetector::new(),
        })
    }

    /// Stages this detector runs
    pub fn plan(&self) -> DetectionPlan {
        self.plan
    }

    /// Time allowed for the bytes each detection stage waits for
    pub fn initial_data_timeout(&self) -> Duration {
        self.initial_data_timeout
    }

    /// Run the detection stages on a new connection
    ///
    /// On success `conn` holds the PROXY header and TLS peer details and is in
    /// `AwaitingFramingSniff`; the returned reader yields decoded messages.
    /// On error `conn.state()` is the stage that failed.
    pub async fn detect<S>(&self, stream: S, conn: &mut ConnectionInfo) -> Result<FrameReader<ByteSource<S>>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut raw = Lookahead::new(stream);

        conn.advance(DetectionState::AwaitingProxyHeader);
        conn.proxy = self.peel_proxy(&mut raw, self.plan.outer_proxy).await?;

        conn.advance(DetectionState::AwaitingTlsHandshake);
        let source = self.negotiate_tls(raw, conn).await?;

        let look_inside = source.is_tls() && conn.proxy.is_none();
        let mut decoded = Lookahead::new(source);
        if look_inside {
            conn.proxy = self.peel_proxy(&mut decoded, self.plan.inner_proxy).await?;
        }

        if let Some(ref header) = conn.proxy {
            debug!(
                "Connection {} from {}: PROXY {:?} source={:?} destination={:?}",
                conn.id,
                conn.peer_addr,
                header.version,
                header.source(),
                header.destination()
            );
        }

        conn.advance(DetectionState::AwaitingFramingSniff);
        Ok(FrameReader::new(decoded, self.framing, self.max_message_size))
    }

    /// Parse a PROXY header at the start of `stream`, consuming exactly its bytes
    ///
    /// The whole header must arrive within the initial data timeout.
    async fn peel_proxy<R>(&self, stream: &mut Lookahead<R>, policy: StagePolicy) -> Result<Option<ProxyHeader>>
    where
        R: AsyncRead + Unpin,
    {
        if !policy.is_enabled() {
            return Ok(None);
        }

        match timeout(self.initial_data_timeout, read_proxy(stream, policy)).await {
            Ok(result) => result,
            Err(_) => Err(SyslogError::Timeout("waiting for PROXY header".to_string())),
        }
    }

    /// TLS stage: sniff the first record and run the handshake when it is TLS
    async fn negotiate_tls<S>(&self, mut raw: Lookahead<S>, conn: &mut ConnectionInfo) -> Result<ByteSource<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let acceptor = match self.acceptor {
            Some(ref acceptor) if self.plan.tls.is_enabled() => acceptor,
            _ => return Ok(ByteSource::Plain(raw)),
        };

        let detection = match timeout(self.initial_data_timeout, sniff(&mut raw, &self.tls_detector)).await {
            Ok(result) => result?,
            Err(_) => return Err(SyslogError::Timeout("waiting for TLS ClientHello".to_string())),
        };

        match detection {
            DetectionResult::Match => {}
            // Closed without sending anything
            DetectionResult::NeedMoreData if raw.is_eof() && raw.buffered().is_empty() => {
                return Ok(ByteSource::Plain(raw));
            }
            result if self.plan.tls == StagePolicy::Required => {
                let reason = match result {
                    DetectionResult::NoMatch(reason) => reason,
                    _ => "stream ended inside the first record".to_string(),
                };
                return Err(SyslogError::HandshakeFailed(format!(
                    "client did not start a TLS handshake: {}",
                    reason
                )));
            }
            _ => return Ok(ByteSource::Plain(raw)),
        }

        if let Some(info) = self.tls_detector.get_protocol_info(raw.buffered()) {
            debug!(
                "Connection {} from {}: {} record version {}",
                conn.id,
                conn.peer_addr,
                info.name,
                info.version.as_deref().unwrap_or("unknown")
            );
        }

        let (stream, peer) = accept_tls(acceptor, raw, self.peer_verify, self.handshake_timeout).await?;
        conn.tls = true;
        conn.tls_peer = peer;
        Ok(ByteSource::Tls(stream))
    }
}

/// Read until the buffered bytes are a complete header, plain data or EOF
async fn read_proxy<R>(stream: &mut Lookahead<R>, policy: StagePolicy) -> Result<Option<ProxyHeader>>
where
    R: AsyncRead + Unpin,
{
    loop {
        match proxy_header::parse(stream.buffered())? {
            ParseOutcome::Complete(header, len) => {
                stream.consume(len);
                return Ok(Some(header));
            }
            ParseOutcome::Absent => {
                if policy == StagePolicy::Required {
                    return Err(SyslogError::MalformedProxyHeader(
                        "connection did not start with a PROXY header".to_string(),
                    ));
                }
                return Ok(None);
            }
            ParseOutcome::Incomplete(needed) => {
                trace!("PROXY header undecided, {} of at least {} bytes", stream.buffered().len(), needed);
                if stream.fill_more().await? == 0 {
                    return resolve_at_eof(stream.buffered(), policy);
                }
            }
        }
    }
}

/// Decide what a partial header at end of stream means
fn resolve_at_eof(buffered: &[u8], policy: StagePolicy) -> Result<Option<ProxyHeader>> {
    if buffered.is_empty() {
        // Connect-and-close, e.g. a load balancer health check
        return Ok(None);
    }
    if buffered.len() >= proxy_header::signature_len(buffered) {
        return Err(SyslogError::MalformedProxyHeader(format!(
            "truncated header, stream ended after {} bytes",
            buffered.len()
        )));
    }
    if policy == StagePolicy::Required {
        return Err(SyslogError::MalformedProxyHeader(
            "stream ended before a PROXY header".to_string(),
        ));
    }
    Ok(None)
}
