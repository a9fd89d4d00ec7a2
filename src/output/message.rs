//! Decoded log records

use std::net::SocketAddr;
use std::time::SystemTime;

use bytes::Bytes;

use crate::detect::ConnectionInfo;
use crate::protocol::{FrameRecord, FramingMode};

/// Priority used when a message carries no `<PRI>` (user.notice)
pub const DEFAULT_PRIORITY: u8 = 13;

/// Largest valid priority (local7.debug)
const MAX_PRIORITY: u16 = 191;

/// One message ready for the output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Syslog facility (priority / 8)
    pub facility: u8,
    /// Syslog severity (priority % 8)
    pub severity: u8,
    /// Message without the priority prefix and trailing newline
    pub body: Bytes,
    /// Original client: PROXY source when conveyed, else the socket peer
    pub source: SocketAddr,
    /// Original destination: PROXY destination when conveyed, else the local address
    pub destination: SocketAddr,
    /// Common name of the TLS peer certificate
    pub peer_cn: Option<String>,
    /// Wire framing the message arrived in
    pub framing: FramingMode,
    /// When the record was decoded
    pub received: SystemTime,
}

impl LogRecord {
    /// Build a record from a decoded frame and its connection
    pub fn from_frame(frame: &FrameRecord, conn: &ConnectionInfo) -> Self {
        let (priority, rest) = split_priority(&frame.payload);
        let body = frame.payload.slice_ref(trim_newline(rest));

        Self {
            facility: priority / 8,
            severity: priority % 8,
            body,
            source: conn.effective_source(),
            destination: conn.effective_destination(),
            peer_cn: conn.tls_peer.as_ref().and_then(|peer| peer.common_name.clone()),
            framing: frame.mode(),
            received: SystemTime::now(),
        }
    }

    /// Combined facility and severity
    pub fn priority(&self) -> u8 {
        self.facility * 8 + self.severity
    }
}

/// Split a leading `<PRI>`; anything that is not a valid priority stays in the body
fn split_priority(payload: &[u8]) -> (u8, &[u8]) {
    if payload.first() != Some(&b'<') {
        return (DEFAULT_PRIORITY, payload);
    }

    let digits = payload[1..]
        .iter()
        .take(4)
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 || digits > 3 || payload.get(1 + digits) != Some(&b'>') {
        return (DEFAULT_PRIORITY, payload);
    }

    let value = payload[1..1 + digits]
        .iter()
        .fold(0u16, |acc, b| acc * 10 + u16::from(b - b'0'));
    if value > MAX_PRIORITY {
        return (DEFAULT_PRIORITY, payload);
    }

    (value as u8, &payload[digits + 2..])
}

fn trim_newline(body: &[u8]) -> &[u8] {
    let body = body.strip_suffix(b"\n").unwrap_or(body);
    body.strip_suffix(b"\r").unwrap_or(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> ConnectionInfo {
        ConnectionInfo::new(1, "192.0.2.1:5000".parse().unwrap(), "192.0.2.2:601".parse().unwrap())
    }

    fn frame(payload: &'static [u8]) -> FrameRecord {
        FrameRecord {
            declared_len: Some(payload.len()),
            payload: Bytes::from_static(payload),
        }
    }

    #[test]
    fn test_priority_split() {
        let record = LogRecord::from_frame(&frame(b"<34>Oct 11 22:14:15 host su: failed\n"), &conn());
        assert_eq!(record.facility, 4);
        assert_eq!(record.severity, 2);
        assert_eq!(record.priority(), 34);
        assert_eq!(&record.body[..], b"Oct 11 22:14:15 host su: failed");
        assert_eq!(record.framing, FramingMode::OctetCounted);
    }

    #[test]
    fn test_missing_or_invalid_priority() {
        for payload in [
            &b"plain text"[..],
            &b"<>x"[..],
            &b"<192>x"[..],
            &b"<1234>x"[..],
            &b"<12x"[..],
        ] {
            let (priority, rest) = split_priority(payload);
            assert_eq!(priority, DEFAULT_PRIORITY, "{:?}", payload);
            assert_eq!(rest, payload);
        }
        assert_eq!(split_priority(b"<0>kern"), (0, &b"kern"[..]));
        assert_eq!(split_priority(b"<191>x"), (191, &b"x"[..]));
    }

    #[test]
    fn test_strips_one_line_ending() {
        assert_eq!(trim_newline(b"msg\r\n"), b"msg");
        assert_eq!(trim_newline(b"msg\n\n"), b"msg\n");
        assert_eq!(trim_newline(b"msg\r"), b"msg");
        assert_eq!(trim_newline(b"msg"), b"msg");
    }

    #[test]
    fn test_addresses_without_proxy() {
        let record = LogRecord::from_frame(&frame(b"<13>x"), &conn());
        assert_eq!(record.source, "192.0.2.1:5000".parse().unwrap());
        assert_eq!(record.destination, "192.0.2.2:601".parse().unwrap());
        assert!(record.peer_cn.is_none());
    }
}
