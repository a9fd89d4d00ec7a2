//! TLS handling module
//!
//! This module builds the shared acceptor, runs server handshakes and
//! describes TLS peers.

mod acceptor;
mod cert;
mod handshake;

pub use acceptor::create_tls_acceptor;
pub use cert::{fingerprint, get_cert_fingerprint, get_cert_subject, load_cert, PeerInfo};
pub use handshake::{accept_tls, TlsStream};
