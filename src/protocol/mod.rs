//! Protocol detection module
//!
//! This module recognizes what the peer is sending by examining buffered
//! bytes: a TLS ClientHello, a PROXY protocol header, and the framing of
//! each syslog message.

mod detector;
pub mod framing;
pub mod proxy_header;

pub use detector::{sniff, DetectionResult, ProtocolDetector, ProtocolInfo, TlsDetector};
pub use framing::{FrameReader, FrameRecord, FramingMode};
pub use proxy_header::{ParseOutcome, ProxiedAddress, ProxyHeader, ProxyVersion};
