//! Syslog framing detection and frame reading
//!
//! Two framings share the port:
//!
//! - octet-counted (RFC 6587 §3.4.1): `"<decimal-length> <message>"`, the
//!   payload is exactly `length` bytes and may contain newlines;
//! - non-transparent (legacy): one message per `\n`-terminated line.
//!
//! A message boundary starting with a run of digits followed by a single
//! space is octet-counted; anything else is read as a legacy line.

use std::fmt;

use bytes::Bytes;
use log::{trace, warn};
use tokio::io::AsyncRead;

use crate::common::{Result, SyslogError};
use crate::config::FramingPolicy;
use crate::transport::Lookahead;

/// Longest accepted length prefix (`u32::MAX` has 10 digits)
pub const MAX_LENGTH_DIGITS: usize = 10;

/// Framing of one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingMode {
    /// Length-prefixed
    OctetCounted,
    /// Newline-terminated
    NonTransparent,
}

impl fmt::Display for FramingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OctetCounted => write!(f, "octet-counted"),
            Self::NonTransparent => write!(f, "non-transparent"),
        }
    }
}

/// One decoded message boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    /// Declared length for octet-counted frames
    pub declared_len: Option<usize>,
    /// Message bytes, without length prefix or line terminator
    pub payload: Bytes,
}

impl FrameRecord {
    /// Framing the record was read with
    pub fn mode(&self) -> FramingMode {
        match self.declared_len {
            Some(_) => FramingMode::OctetCounted,
            None => FramingMode::NonTransparent,
        }
    }
}

/// What the bytes at a message boundary look like
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStart {
    /// Length prefix of `header_len` bytes (digits and the space)
    Counted { length: usize, header_len: usize },
    /// Anything that is not a complete length prefix
    Legacy,
    /// Only digits so far
    NeedMoreData,
}

/// Classify the bytes at a message boundary
///
/// Commits to octet-counted framing only once the space after the digit
/// run has been seen, so message text that starts with digits stays legacy.
pub fn sniff_frame(buf: &[u8]) -> FrameStart {
    let digits = buf.iter().take_while(|b| b.is_ascii_digit()).count();

    if digits == 0 {
        return if buf.is_empty() { FrameStart::NeedMoreData } else { FrameStart::Legacy };
    }
    if digits > MAX_LENGTH_DIGITS {
        return FrameStart::Legacy;
    }
    if digits == buf.len() {
        return FrameStart::NeedMoreData;
    }
    if buf[digits] != b' ' {
        return FrameStart::Legacy;
    }

    // At most 10 ASCII digits
    let length = std::str::from_utf8(&buf[..digits])
        .ok()
        .and_then(|s| s.parse::<usize>().ok());

    match length {
        Some(length) => FrameStart::Counted { length, header_len: digits + 1 },
        None => FrameStart::Legacy,
    }
}

/// Reads `FrameRecord`s from a decoded byte stream
#[derive(Debug)]
pub struct FrameReader<R> {
    stream: Lookahead<R>,
    policy: FramingPolicy,
    locked: Option<FramingMode>,
    last_mode: Option<FramingMode>,
    max_message_size: usize,
    /// Discarding the rest of an oversized legacy line
    discarding: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a frame reader
    ///
    /// # Parameters
    ///
    /// * `stream` - Decoded bytes, possibly with bytes already buffered
    /// * `policy` - Framing policy of the source
    /// * `max_message_size` - Largest accepted payload
    pub fn new(stream: Lookahead<R>, policy: FramingPolicy, max_message_size: usize) -> Self {
        let locked = match policy {
            FramingPolicy::OctetCounted => Some(FramingMode::OctetCounted),
            FramingPolicy::NonTransparent => Some(FramingMode::NonTransparent),
            FramingPolicy::Auto | FramingPolicy::AutoOnce => None,
        };

        Self {
            stream,
            policy,
            locked,
            last_mode: None,
            max_message_size,
            discarding: false,
        }
    }

    /// Framing of the most recent message
    pub fn mode(&self) -> Option<FramingMode> {
        self.last_mode
    }

    /// Read the next message
    ///
    /// Returns `Ok(None)` on a clean end of stream between messages.
    pub async fn next_frame(&mut self) -> Result<Option<FrameRecord>> {
        loop {
            let start = match self.locked {
                Some(FramingMode::NonTransparent) => FrameStart::Legacy,
                Some(FramingMode::OctetCounted) => match self.counted_start().await? {
                    Some(start) => start,
                    None => return Ok(None),
                },
                None => match self.sniff().await? {
                    Some(start) => start,
                    None => return Ok(None),
                },
            };

            let record = match start {
                FrameStart::Counted { length, header_len } => {
                    self.note_mode(FramingMode::OctetCounted);
                    self.read_counted(length, header_len).await?
                }
                _ => {
                    self.note_mode(FramingMode::NonTransparent);
                    match self.read_line().await? {
                        LineRead::Line(record) => Some(record),
                        LineRead::Skipped => None,
                        LineRead::Eof => return Ok(None),
                    }
                }
            };

            if let Some(record) = record {
                trace!(
                    "Frame decoded: mode={}, {} bytes",
                    record.mode(),
                    record.payload.len()
                );
                return Ok(Some(record));
            }
        }
    }

    fn note_mode(&mut self, mode: FramingMode) {
        if self.policy == FramingPolicy::AutoOnce && self.locked.is_none() {
            trace!("Framing locked to {} for this connection", mode);
            self.locked = Some(mode);
        }
        self.last_mode = Some(mode);
    }

    /// Buffer enough bytes to classify the next message; `None` at clean EOF
    async fn sniff(&mut self) -> Result<Option<FrameStart>> {
        loop {
            match sniff_frame(self.stream.buffered()) {
                FrameStart::NeedMoreData => {
                    if self.stream.fill_more().await? == 0 {
                        if self.stream.buffered().is_empty() {
                            return Ok(None);
                        }
                        // A bare digit run at end of stream is a final legacy message
                        return Ok(Some(FrameStart::Legacy));
                    }
                }
                start => return Ok(Some(start)),
            }
        }
    }

    /// Next length prefix when locked to octet counting
    async fn counted_start(&mut self) -> Result<Option<FrameStart>> {
        loop {
            // Stray line terminators between frames
            let stray = self
                .stream
                .buffered()
                .iter()
                .take_while(|&&b| b == b'\n' || b == b'\r')
                .count();
            self.stream.consume(stray);

            match sniff_frame(self.stream.buffered()) {
                FrameStart::NeedMoreData => {
                    if self.stream.fill_more().await? == 0 {
                        if self.stream.buffered().is_empty() {
                            return Ok(None);
                        }
                        return Err(SyslogError::InvalidFrameHeader(
                            "stream ended inside a length prefix".to_string(),
                        ));
                    }
                }
                FrameStart::Legacy => {
                    let head = &self.stream.buffered()[..self.stream.buffered().len().min(16)];
                    return Err(SyslogError::InvalidFrameHeader(format!(
                        "expected '<length> ', got {:?}",
                        String::from_utf8_lossy(head)
                    )));
                }
                start => return Ok(Some(start)),
            }
        }
    }

    async fn read_counted(&mut self, length: usize, header_len: usize) -> Result<Option<FrameRecord>> {
        if length > self.max_message_size {
            return Err(SyslogError::OversizedFrame {
                length,
                max: self.max_message_size,
            });
        }

        self.stream.consume(header_len);
        if !self.stream.fill(length).await? {
            return Err(SyslogError::TruncatedFrame {
                expected: length,
                received: self.stream.buffered().len(),
            });
        }

        let payload = self.stream.split_buffered(length);
        if payload.is_empty() {
            return Ok(None);
        }

        Ok(Some(FrameRecord {
            declared_len: Some(length),
            payload,
        }))
    }

    async fn read_line(&mut self) -> Result<LineRead> {
        loop {
            if let Some(pos) = self.stream.buffered().iter().position(|&b| b == b'\n') {
                let line = self.stream.split_buffered(pos + 1);

                if self.discarding {
                    self.discarding = false;
                    return Ok(LineRead::Skipped);
                }

                let payload = line.slice(..pos);
                if payload.is_empty() || payload.as_ref() == b"\r" {
                    return Ok(LineRead::Skipped);
                }
                if payload.len() > self.max_message_size {
                    warn!(
                        "Dropping {} byte line, max_message_size is {}",
                        payload.len(),
                        self.max_message_size
                    );
                    return Ok(LineRead::Skipped);
                }

                return Ok(LineRead::Line(FrameRecord {
                    declared_len: None,
                    payload,
                }));
            }

            if self.stream.buffered().len() > self.max_message_size {
                if !self.discarding {
                    warn!(
                        "Dropping line longer than max_message_size ({} bytes)",
                        self.max_message_size
                    );
                }
                let len = self.stream.buffered().len();
                self.stream.consume(len);
                self.discarding = true;
            }

            if self.stream.fill_more().await? == 0 {
                let len = self.stream.buffered().len();
                if self.discarding || len == 0 {
                    self.discarding = false;
                    self.stream.consume(len);
                    return Ok(LineRead::Eof);
                }

                // Unterminated tail at end of stream is the final message
                let payload = self.stream.split_buffered(len);
                return Ok(LineRead::Line(FrameRecord {
                    declared_len: None,
                    payload,
                }));
            }
        }
    }
}

enum LineRead {
    Line(FrameRecord),
    Skipped,
    Eof,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    const COUNTED: &[u8] = b"52 <2>Oct 11 22:14:15 myhostname sshd[1234]: message 0\n";
    const LEGACY: &[u8] = b"<2>Oct 11 22:14:15 myhostname sshd[1234]: message 0\n";

    async fn read_all(input: &[u8], policy: FramingPolicy, max: usize) -> Result<Vec<FrameRecord>> {
        let (mut client, server) = tokio::io::duplex(input.len().max(1) + 1);
        client.write_all(input).await.unwrap();
        drop(client);

        let mut reader = FrameReader::new(Lookahead::new(server), policy, max);
        let mut records = Vec::new();
        while let Some(record) = reader.next_frame().await? {
            records.push(record);
        }
        Ok(records)
    }

    #[test]
    fn test_sniff_frame() {
        assert_eq!(sniff_frame(b"52 <2>"), FrameStart::Counted { length: 52, header_len: 3 });
        assert_eq!(sniff_frame(b"52"), FrameStart::NeedMoreData);
        assert_eq!(sniff_frame(b""), FrameStart::NeedMoreData);
        assert_eq!(sniff_frame(b"<2>Oct"), FrameStart::Legacy);
        assert_eq!(sniff_frame(b"2024-01-01 boot"), FrameStart::Legacy);
        assert_eq!(sniff_frame(b"12345678901 x"), FrameStart::Legacy);
        assert_eq!(sniff_frame(b" 52 x"), FrameStart::Legacy);
    }

    #[tokio::test]
    async fn test_counted_payload_is_exact() {
        let records = read_all(COUNTED, FramingPolicy::Auto, 65536).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].declared_len, Some(52));
        assert_eq!(records[0].payload.len(), 52);
        assert_eq!(&records[0].payload[..], &COUNTED[3..]);
    }

    #[tokio::test]
    async fn test_counted_repeated() {
        let input = COUNTED.repeat(10);
        let records = read_all(&input, FramingPolicy::Auto, 65536).await.unwrap();
        assert_eq!(records.len(), 10);
        assert!(records.iter().all(|r| r.mode() == FramingMode::OctetCounted));
    }

    #[tokio::test]
    async fn test_counted_payload_with_newlines() {
        // The byte after the declared length starts the next message
        let records = read_all(b"11 first\nsecond", FramingPolicy::Auto, 65536).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0].payload[..], b"first\nsecon");
        assert_eq!(&records[1].payload[..], b"d");

        let records = read_all(b"12 first\nsecond", FramingPolicy::Auto, 65536).await.unwrap();
        assert_eq!(&records[0].payload[..], b"first\nsecond");
    }

    #[tokio::test]
    async fn test_legacy_strips_newline() {
        let input = LEGACY.repeat(10);
        let records = read_all(&input, FramingPolicy::Auto, 65536).await.unwrap();
        assert_eq!(records.len(), 10);
        assert_eq!(&records[0].payload[..], &LEGACY[..LEGACY.len() - 1]);
        assert_eq!(records[0].declared_len, None);
    }

    #[tokio::test]
    async fn test_digits_without_space_are_legacy() {
        let records = read_all(b"123abc\n42\n", FramingPolicy::Auto, 65536).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0].payload[..], b"123abc");
        assert_eq!(&records[1].payload[..], b"42");
    }

    #[tokio::test]
    async fn test_mixed_framing_resniffed_per_message() {
        let records = read_all(b"5 hello<13>legacy\n3 abc", FramingPolicy::Auto, 65536).await.unwrap();
        let payloads: Vec<&[u8]> = records.iter().map(|r| &r.payload[..]).collect();
        assert_eq!(payloads, vec![&b"hello"[..], b"<13>legacy", b"abc"]);
    }

    #[tokio::test]
    async fn test_auto_once_locks_first_mode() {
        let records = read_all(b"<13>first\n5 hello\n", FramingPolicy::AutoOnce, 65536).await.unwrap();
        let payloads: Vec<&[u8]> = records.iter().map(|r| &r.payload[..]).collect();
        assert_eq!(payloads, vec![&b"<13>first"[..], b"5 hello"]);
    }

    #[tokio::test]
    async fn test_truncated_counted_frame() {
        let err = read_all(b"52 <2>Oct 11", FramingPolicy::Auto, 65536).await.unwrap_err();
        match err {
            SyslogError::TruncatedFrame { expected, received } => {
                assert_eq!(expected, 52);
                assert_eq!(received, 9);
            }
            other => panic!("Expected TruncatedFrame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_oversized_counted_frame() {
        let err = read_all(b"100 short", FramingPolicy::Auto, 64).await.unwrap_err();
        assert!(matches!(err, SyslogError::OversizedFrame { length: 100, max: 64 }));
    }

    #[tokio::test]
    async fn test_oversized_legacy_line_dropped() {
        let mut input = vec![b'x'; 200];
        input.extend_from_slice(b"\nok\n");
        let records = read_all(&input, FramingPolicy::Auto, 64).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(&records[0].payload[..], b"ok");
    }

    #[tokio::test]
    async fn test_legacy_tail_at_eof() {
        let records = read_all(b"first\nlast", FramingPolicy::Auto, 65536).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[1].payload[..], b"last");

        let records = read_all(b"12345", FramingPolicy::Auto, 65536).await.unwrap();
        assert_eq!(&records[0].payload[..], b"12345");
    }

    #[tokio::test]
    async fn test_empty_lines_skipped() {
        let records = read_all(b"\n\r\n3 abc\nnext\n", FramingPolicy::Auto, 65536).await.unwrap();
        let payloads: Vec<&[u8]> = records.iter().map(|r| &r.payload[..]).collect();
        assert_eq!(payloads, vec![&b"abc"[..], b"next"]);
    }

    #[tokio::test]
    async fn test_octet_counted_policy() {
        let records = read_all(b"3 abc\r\n3 def", FramingPolicy::OctetCounted, 65536).await.unwrap();
        assert_eq!(records.len(), 2);

        let err = read_all(b"3 abcjunk", FramingPolicy::OctetCounted, 65536).await.unwrap_err();
        assert!(matches!(err, SyslogError::InvalidFrameHeader(_)));
    }

    #[tokio::test]
    async fn test_non_transparent_policy() {
        let records = read_all(b"3 abc\n", FramingPolicy::NonTransparent, 65536).await.unwrap();
        assert_eq!(&records[0].payload[..], b"3 abc");
    }

    #[tokio::test]
    async fn test_clean_eof() {
        let records = read_all(b"", FramingPolicy::Auto, 65536).await.unwrap();
        assert!(records.is_empty());
    }
}
