//! Protocol sniffing
//!
//! Detectors classify the start of a stream from buffered bytes only; the
//! bytes stay in the `Lookahead` buffer for whichever stage handles them.

use std::io;

use log::{debug, trace};
use tokio::io::AsyncRead;

use crate::transport::Lookahead;

/// Protocol detection result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionResult {
    /// The protocol was recognized
    Match,
    /// The bytes belong to something else
    NoMatch(String),
    /// Need more data to determine protocol
    NeedMoreData,
}

/// Protocol information
#[derive(Debug, Clone)]
pub struct ProtocolInfo {
    /// Protocol name
    pub name: String,
    /// Protocol version (if available)
    pub version: Option<String>,
}

/// Protocol detector trait
///
/// This trait defines the interface for protocol detection over a byte prefix.
pub trait ProtocolDetector: Send + Sync {
    /// Decide whether `data`, the start of a stream, belongs to this protocol
    ///
    /// # Parameters
    ///
    /// * `data` - Bytes buffered so far
    ///
    /// # Returns
    ///
    /// `NeedMoreData` only while the prefix is still ambiguous
    fn check_protocol(&self, data: &[u8]) -> DetectionResult;

    /// Get protocol information
    ///
    /// This method returns detailed information about the detected protocol.
    /// It should be called after `check_protocol` returns `DetectionResult::Match`.
    fn get_protocol_info(&self, data: &[u8]) -> Option<ProtocolInfo>;
}

/// Read from `stream` until `detector` reaches a decision
///
/// Returns `NeedMoreData` only if the stream ended while the prefix was
/// still ambiguous. Nothing is consumed from the buffer.
pub async fn sniff<S, D>(stream: &mut Lookahead<S>, detector: &D) -> io::Result<DetectionResult>
where
    S: AsyncRead + Unpin,
    D: ProtocolDetector + ?Sized,
{
    loop {
        match detector.check_protocol(stream.buffered()) {
            DetectionResult::NeedMoreData => {
                if stream.fill_more().await? == 0 {
                    trace!("Stream ended after {} bytes, protocol undecided", stream.buffered().len());
                    return Ok(DetectionResult::NeedMoreData);
                }
            }
            result => return Ok(result),
        }
    }
}

/// Recognizes a TLS ClientHello record header
///
/// A syslog stream starts with a digit, `<` or printable text, never with the
/// handshake content type 0x16, so one byte is enough to rule TLS out.
#[derive(Debug, Clone, Default)]
pub struct TlsDetector;

/// Content type of a TLS handshake record
const HANDSHAKE: u8 = 0x16;

/// Content type, version and length
const RECORD_HEADER_LEN: usize = 5;

/// Largest plaintext TLS record
const MAX_RECORD_LEN: usize = 16384;

impl TlsDetector {
    pub fn new() -> Self {
        Self
    }
}

fn record_version(major: u8, minor: u8) -> String {
    match (major, minor) {
        (0x03, 0x00) => "SSLv3".to_string(),
        (0x03, 0x01) => "TLSv1.0".to_string(),
        (0x03, 0x02) => "TLSv1.1".to_string(),
        (0x03, 0x03) => "TLSv1.2".to_string(),
        (0x03, 0x04) => "TLSv1.3".to_string(),
        _ => format!("unknown ({}.{})", major, minor),
    }
}

impl ProtocolDetector for TlsDetector {
    fn check_protocol(&self, data: &[u8]) -> DetectionResult {
        let first = match data.first() {
            Some(&b) => b,
            None => return DetectionResult::NeedMoreData,
        };

        if first != HANDSHAKE {
            return DetectionResult::NoMatch(format!("first byte is {:#04x}, not a TLS handshake", first));
        }

        if data.len() < RECORD_HEADER_LEN {
            trace!("TLS record header incomplete: {} of {} bytes", data.len(), RECORD_HEADER_LEN);
            return DetectionResult::NeedMoreData;
        }

        let (major, minor) = (data[1], data[2]);
        if major != 0x03 || minor > 0x04 {
            return DetectionResult::NoMatch(format!("record version {}.{} is not SSLv3..TLSv1.3", major, minor));
        }

        let record_len = u16::from_be_bytes([data[3], data[4]]) as usize;
        if !(4..=MAX_RECORD_LEN).contains(&record_len) {
            return DetectionResult::NoMatch(format!("record length {} out of range", record_len));
        }

        debug!("TLS ClientHello record detected");
        DetectionResult::Match
    }

    fn get_protocol_info(&self, data: &[u8]) -> Option<ProtocolInfo> {
        if data.len() < RECORD_HEADER_LEN || data[0] != HANDSHAKE {
            return None;
        }

        Some(ProtocolInfo {
            name: "TLS".to_string(),
            version: Some(record_version(data[1], data[2])),
        })
    }
}
