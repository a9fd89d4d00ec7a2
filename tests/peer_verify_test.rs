//! TLS peer verification policies
//!
//! Client certificates: none, one signed by the configured CA, or a
//! self-signed one the CA does not know.

mod common;

use common::*;
use syslog_autodetect::config::{PeerVerify, SourceConfig, TransportKind};

#[derive(Clone, Copy, Debug)]
enum Client {
    Anonymous,
    Trusted,
    Rogue,
}

async fn run(peer_verify: PeerVerify, client: Client) -> bool {
    let pki = TestPki::generate();
    let config = SourceConfig {
        transport: TransportKind::Tls,
        tls: Some(pki.tls_config(peer_verify)),
        ..Default::default()
    };
    let source = TestSource::start(config).await;

    let identity = match client {
        Client::Anonymous => None,
        Client::Trusted => Some(&pki.client),
        Client::Rogue => Some(&pki.rogue),
    };

    // With TLS 1.3 a rejected client may still finish its side of the handshake
    if let Ok(tls) = try_tls_over(source.connect().await, identity).await {
        send_and_close(tls, format!("{}\n", sample_message(0)).as_bytes()).await;
    }

    let stats = source.wait_for_closed(1).await;
    let lines = source.stop().await;
    let accepted = lines == vec![expected_line(0)];
    assert_eq!(accepted, stats.connections_failed == 0, "{:?} {:?}", peer_verify, client);
    accepted
}

#[tokio::test]
async fn test_none_accepts_everyone() {
    assert!(run(PeerVerify::None, Client::Anonymous).await);
    assert!(run(PeerVerify::None, Client::Rogue).await);
}

#[tokio::test]
async fn test_optional_untrusted() {
    assert!(run(PeerVerify::OptionalUntrusted, Client::Anonymous).await);
    assert!(run(PeerVerify::OptionalUntrusted, Client::Trusted).await);
    assert!(run(PeerVerify::OptionalUntrusted, Client::Rogue).await);
}

#[tokio::test]
async fn test_optional_trusted() {
    assert!(run(PeerVerify::OptionalTrusted, Client::Anonymous).await);
    assert!(run(PeerVerify::OptionalTrusted, Client::Trusted).await);
    assert!(!run(PeerVerify::OptionalTrusted, Client::Rogue).await);
}

#[tokio::test]
async fn test_required_untrusted() {
    assert!(!run(PeerVerify::RequiredUntrusted, Client::Anonymous).await);
    assert!(run(PeerVerify::RequiredUntrusted, Client::Trusted).await);
    assert!(run(PeerVerify::RequiredUntrusted, Client::Rogue).await);
}

#[tokio::test]
async fn test_required_trusted() {
    assert!(!run(PeerVerify::RequiredTrusted, Client::Anonymous).await);
    assert!(run(PeerVerify::RequiredTrusted, Client::Trusted).await);
    assert!(!run(PeerVerify::RequiredTrusted, Client::Rogue).await);
}
