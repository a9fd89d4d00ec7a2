//! Per-connection detection state

use std::fmt;
use std::net::SocketAddr;

use log::trace;

use crate::config::TransportKind;
use crate::protocol::{FramingMode, ProxyHeader};
use crate::tls::PeerInfo;

/// Where a connection is in the detection pipeline
///
/// Transitions only move forward; `Failed` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DetectionState {
    AwaitingProxyHeader,
    AwaitingTlsHandshake,
    AwaitingFramingSniff,
    Streaming,
    Failed,
}

impl fmt::Display for DetectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingProxyHeader => write!(f, "awaiting-proxy-header"),
            Self::AwaitingTlsHandshake => write!(f, "awaiting-tls-handshake"),
            Self::AwaitingFramingSniff => write!(f, "awaiting-framing-sniff"),
            Self::Streaming => write!(f, "streaming"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Whether a detection stage runs, and whether it must succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePolicy {
    /// Never looked for
    Disabled,
    /// Used when the peer's bytes match, skipped otherwise
    Optional,
    /// The connection fails unless the peer's bytes match
    Required,
}

impl StagePolicy {
    pub fn is_enabled(&self) -> bool {
        *self != Self::Disabled
    }
}

/// Stages a transport runs on each connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionPlan {
    /// PROXY header on the raw socket
    pub outer_proxy: StagePolicy,
    /// TLS handshake
    pub tls: StagePolicy,
    /// PROXY header as the first bytes inside TLS; skipped when an outer header was seen
    pub inner_proxy: StagePolicy,
}

impl DetectionPlan {
    /// Plan for a transport
    ///
    /// # Parameters
    ///
    /// * `transport` - Configured transport
    /// * `tls_available` - Whether the source has TLS credentials; `auto`
    ///   only sniffs for TLS when it does
    pub fn for_transport(transport: TransportKind, tls_available: bool) -> Self {
        use StagePolicy::*;

        let (outer_proxy, tls, inner_proxy) = match transport {
            TransportKind::Tcp => (Disabled, Disabled, Disabled),
            TransportKind::Tls => (Disabled, Required, Disabled),
            TransportKind::Auto if tls_available => (Optional, Optional, Optional),
            TransportKind::Auto => (Optional, Disabled, Disabled),
            TransportKind::ProxiedTcp => (Required, Disabled, Disabled),
            TransportKind::ProxiedTls => (Disabled, Required, Required),
            TransportKind::ProxiedTlsPassthrough => (Required, Required, Disabled),
        };

        Self {
            outer_proxy,
            tls,
            inner_proxy,
        }
    }
}

/// One accepted connection and what detection learned about it
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Listener-assigned id
    pub id: u64,
    /// Socket peer address
    pub peer_addr: SocketAddr,
    /// Local address the connection was accepted on
    pub local_addr: SocketAddr,
    state: DetectionState,
    /// Parsed PROXY header, if any
    pub proxy: Option<ProxyHeader>,
    /// Whether the payload is decrypted from TLS
    pub tls: bool,
    /// TLS peer certificate details
    pub tls_peer: Option<PeerInfo>,
    /// Framing of the most recent message
    pub framing: Option<FramingMode>,
}

impl ConnectionInfo {
    pub fn new(id: u64, peer_addr: SocketAddr, local_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            local_addr,
            state: DetectionState::AwaitingProxyHeader,
            proxy: None,
            tls: false,
            tls_peer: None,
            framing: None,
        }
    }

    pub fn state(&self) -> DetectionState {
        self.state
    }

    /// Move forward to `next`; backward moves and moves out of `Failed` are ignored
    pub fn advance(&mut self, next: DetectionState) {
        if self.state == DetectionState::Failed || next <= self.state {
            return;
        }
        trace!("Connection {} {}: {} -> {}", self.id, self.peer_addr, self.state, next);
        self.state = next;
    }

    /// Enter `Failed`, returning the state the failure happened in
    pub fn fail(&mut self) -> DetectionState {
        let stage = self.state;
        self.state = DetectionState::Failed;
        stage
    }

    /// Original client address: PROXY source if conveyed, else the socket peer
    pub fn effective_source(&self) -> SocketAddr {
        self.proxy
            .as_ref()
            .and_then(|header| header.source())
            .unwrap_or(self.peer_addr)
    }

    /// Original destination: PROXY destination if conveyed, else the local address
    pub fn effective_destination(&self) -> SocketAddr {
        self.proxy
            .as_ref()
            .and_then(|header| header.destination())
            .unwrap_or(self.local_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::proxy_header::{self, ParseOutcome};

    fn conn() -> ConnectionInfo {
        ConnectionInfo::new(1, "10.0.0.1:5000".parse().unwrap(), "10.0.0.2:601".parse().unwrap())
    }

    #[test]
    fn test_transitions_only_move_forward() {
        let mut conn = conn();
        conn.advance(DetectionState::AwaitingFramingSniff);
        conn.advance(DetectionState::AwaitingTlsHandshake);
        assert_eq!(conn.state(), DetectionState::AwaitingFramingSniff);

        assert_eq!(conn.fail(), DetectionState::AwaitingFramingSniff);
        conn.advance(DetectionState::Streaming);
        assert_eq!(conn.state(), DetectionState::Failed);
    }

    #[test]
    fn test_plans() {
        use StagePolicy::*;

        let plan = DetectionPlan::for_transport(TransportKind::Auto, true);
        assert_eq!((plan.outer_proxy, plan.tls, plan.inner_proxy), (Optional, Optional, Optional));

        let plan = DetectionPlan::for_transport(TransportKind::Auto, false);
        assert_eq!((plan.outer_proxy, plan.tls, plan.inner_proxy), (Optional, Disabled, Disabled));

        let plan = DetectionPlan::for_transport(TransportKind::ProxiedTlsPassthrough, true);
        assert_eq!((plan.outer_proxy, plan.tls, plan.inner_proxy), (Required, Required, Disabled));

        let plan = DetectionPlan::for_transport(TransportKind::ProxiedTls, true);
        assert_eq!((plan.outer_proxy, plan.tls, plan.inner_proxy), (Disabled, Required, Required));

        let plan = DetectionPlan::for_transport(TransportKind::Tcp, true);
        assert!(!plan.tls.is_enabled());
    }

    #[test]
    fn test_effective_addresses() {
        let mut conn = conn();
        assert_eq!(conn.effective_source(), conn.peer_addr);

        let header = match proxy_header::parse(b"PROXY TCP4 1.1.1.1 2.2.2.2 3333 4444\r\n").unwrap() {
            ParseOutcome::Complete(header, _) => header,
            other => panic!("unexpected {:?}", other),
        };
        conn.proxy = Some(header);
        assert_eq!(conn.effective_source(), "1.1.1.1:3333".parse().unwrap());
        assert_eq!(conn.effective_destination(), "2.2.2.2:4444".parse().unwrap());
    }
}
