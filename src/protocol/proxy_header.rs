//! PROXY protocol header parser
//!
//! Parses version 1 (text) and version 2 (binary) headers from the start of
//! a buffer. The parser is a pure function over the bytes buffered so far;
//! callers keep reading until the outcome is no longer `Incomplete`.
//!
//! Version 1 parsing is permissive the way HAProxy-compatible receivers are:
//! a bare `\n` terminates the line, runs of spaces between address fields are
//! tolerated, and unparseable addresses or ports are accepted with the
//! endpoints left out.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use log::debug;

use crate::common::{Result, SyslogError};

/// Text header prefix
pub const V1_PREFIX: &[u8] = b"PROXY";

/// Longest v1 header, terminator included
pub const V1_MAX_LEN: usize = 107;

/// Binary header signature
pub const V2_SIGNATURE: [u8; 12] = [
    0x0D, 0x0A, 0x0D, 0x0A, 0x00, 0x0D, 0x0A, 0x51, 0x55, 0x49, 0x54, 0x0A,
];

/// Signature, version/command, family/transport and address length
const V2_HEADER_LEN: usize = 16;

const V2_CMD_LOCAL: u8 = 0x0;
const V2_CMD_PROXY: u8 = 0x1;

const AF_UNSPEC: u8 = 0x0;
const AF_INET: u8 = 0x1;
const AF_INET6: u8 = 0x2;
const AF_UNIX: u8 = 0x3;

const IPV4_ADDR_LEN: usize = 12;
const IPV6_ADDR_LEN: usize = 36;
const UNIX_ADDR_LEN: usize = 216;

const PP2_TYPE_AUTHORITY: u8 = 0x02;
const PP2_TYPE_UNIQUE_ID: u8 = 0x05;
const UNIQUE_ID_MAX_LEN: usize = 128;

/// PROXY protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyVersion {
    /// Text header
    V1,
    /// Binary header
    V2,
}

/// Original connection endpoints conveyed by the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProxiedAddress {
    /// Address of the actual client
    pub source: SocketAddr,
    /// Address the client connected to
    pub destination: SocketAddr,
}

/// A parsed PROXY protocol header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyHeader {
    /// Wire version the header was sent with
    pub version: ProxyVersion,
    /// Endpoints; `None` for `UNKNOWN`, `LOCAL` and unparseable v1 fields
    pub address: Option<ProxiedAddress>,
    /// v2 authority TLV (usually the SNI host name)
    pub authority: Option<String>,
    /// v2 unique connection id TLV
    pub unique_id: Option<Vec<u8>>,
}

impl ProxyHeader {
    fn new(version: ProxyVersion, address: Option<ProxiedAddress>) -> Self {
        Self {
            version,
            address,
            authority: None,
            unique_id: None,
        }
    }

    /// Original client address, if conveyed
    pub fn source(&self) -> Option<SocketAddr> {
        self.address.map(|a| a.source)
    }

    /// Original destination address, if conveyed
    pub fn destination(&self) -> Option<SocketAddr> {
        self.address.map(|a| a.destination)
    }
}

/// Result of looking for a header at the start of a buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// The buffer does not start with a PROXY signature
    Absent,
    /// At least this many bytes are needed to decide
    Incomplete(usize),
    /// A complete header occupying the first `usize` bytes
    Complete(ProxyHeader, usize),
}

/// Bytes needed to tell a signature prefix from other data
pub fn signature_len(buf: &[u8]) -> usize {
    if !buf.is_empty() && buf[0] == V2_SIGNATURE[0] {
        V2_SIGNATURE.len()
    } else {
        V1_PREFIX.len()
    }
}

/// Whether `buf` can still turn into one of the signatures
fn is_signature_prefix(buf: &[u8]) -> bool {
    V1_PREFIX.starts_with(buf) || V2_SIGNATURE.starts_with(buf)
}

/// Parse a PROXY header at the start of `buf`
///
/// # Parameters
///
/// * `buf` - Bytes received so far, starting at the first byte of the stream
///
/// # Returns
///
/// `Absent` when no signature is present, `Incomplete` while more bytes are
/// needed, otherwise the header and its length. Malformed headers return
/// `MalformedProxyHeader`; a v2 signature with another version returns
/// `UnsupportedProxyVersion`.
pub fn parse(buf: &[u8]) -> Result<ParseOutcome> {
    if buf.starts_with(&V2_SIGNATURE) {
        return parse_v2(buf);
    }
    if buf.starts_with(V1_PREFIX) {
        return parse_v1(buf);
    }
    if is_signature_prefix(buf) {
        return Ok(ParseOutcome::Incomplete(signature_len(buf)));
    }
    Ok(ParseOutcome::Absent)
}

fn malformed(msg: impl Into<String>) -> SyslogError {
    SyslogError::MalformedProxyHeader(msg.into())
}

fn parse_v1(buf: &[u8]) -> Result<ParseOutcome> {
    let window = &buf[..buf.len().min(V1_MAX_LEN)];

    let newline = match window.iter().position(|&b| b == b'\n') {
        Some(pos) => pos,
        None if buf.len() >= V1_MAX_LEN => {
            return Err(malformed(format!("v1 header longer than {} bytes", V1_MAX_LEN)));
        }
        None => return Ok(ParseOutcome::Incomplete(buf.len() + 1)),
    };

    let mut line = &buf[..newline];
    if let Some(stripped) = line.strip_suffix(b"\r") {
        line = stripped;
    }

    let line = std::str::from_utf8(line).map_err(|_| malformed("v1 header is not ASCII"))?;
    let rest = line[V1_PREFIX.len()..]
        .strip_prefix(' ')
        .ok_or_else(|| malformed("missing protocol in v1 header"))?;
    if rest.starts_with(' ') {
        return Err(malformed("extra whitespace after PROXY"));
    }

    let mut fields = rest.split(' ').filter(|f| !f.is_empty());
    let address = match fields.next() {
        Some("UNKNOWN") => None,
        Some(proto @ ("TCP4" | "TCP6")) => {
            let args: Vec<&str> = fields.take(4).collect();
            if args.len() < 4 {
                return Err(malformed(format!("{} header needs 4 address fields", proto)));
            }
            parse_v1_address(proto == "TCP6", &args)
        }
        Some(proto) => return Err(malformed(format!("unknown v1 protocol '{}'", proto))),
        None => return Err(malformed("missing protocol in v1 header")),
    };

    Ok(ParseOutcome::Complete(ProxyHeader::new(ProxyVersion::V1, address), newline + 1))
}

/// Endpoints of a TCP4/TCP6 line; `None` if any field does not parse
fn parse_v1_address(ipv6: bool, args: &[&str]) -> Option<ProxiedAddress> {
    let parse_ip = |s: &str| -> Option<IpAddr> {
        let ip: IpAddr = s.parse().ok()?;
        (ip.is_ipv6() == ipv6).then_some(ip)
    };

    let address = (|| {
        let src_ip = parse_ip(args[0])?;
        let dst_ip = parse_ip(args[1])?;
        let src_port: u16 = args[2].parse().ok()?;
        let dst_port: u16 = args[3].parse().ok()?;
        Some(ProxiedAddress {
            source: SocketAddr::new(src_ip, src_port),
            destination: SocketAddr::new(dst_ip, dst_port),
        })
    })();

    if address.is_none() {
        debug!("Ignoring unparseable PROXY v1 addresses: {}", args.join(" "));
    }
    address
}

fn parse_v2(buf: &[u8]) -> Result<ParseOutcome> {
    if buf.len() < V2_HEADER_LEN {
        return Ok(ParseOutcome::Incomplete(V2_HEADER_LEN));
    }

    let version = buf[12] >> 4;
    if version != 2 {
        return Err(SyslogError::UnsupportedProxyVersion(version));
    }

    let command = buf[12] & 0x0F;
    if command != V2_CMD_LOCAL && command != V2_CMD_PROXY {
        return Err(malformed(format!("unknown v2 command {:#x}", command)));
    }

    let family = buf[13] >> 4;
    let transport = buf[13] & 0x0F;
    if transport > 0x2 {
        return Err(malformed(format!("unknown v2 transport {:#x}", transport)));
    }

    let len = u16::from_be_bytes([buf[14], buf[15]]) as usize;
    let total = V2_HEADER_LEN + len;
    if buf.len() < total {
        return Ok(ParseOutcome::Incomplete(total));
    }

    let block = &buf[V2_HEADER_LEN..total];
    let addr_len = match family {
        AF_UNSPEC => 0,
        AF_INET => IPV4_ADDR_LEN,
        AF_INET6 => IPV6_ADDR_LEN,
        AF_UNIX => UNIX_ADDR_LEN,
        _ => return Err(malformed(format!("unknown v2 address family {:#x}", family))),
    };
    if block.len() < addr_len {
        return Err(malformed(format!(
            "v2 address block of {} bytes, family needs {}",
            block.len(),
            addr_len
        )));
    }

    // LOCAL connections carry no meaningful endpoints
    let address = if command == V2_CMD_PROXY {
        decode_v2_address(family, &block[..addr_len])
    } else {
        None
    };

    let mut header = ProxyHeader::new(ProxyVersion::V2, address);
    parse_tlvs(&block[addr_len..], &mut header)?;

    Ok(ParseOutcome::Complete(header, total))
}

fn decode_v2_address(family: u8, block: &[u8]) -> Option<ProxiedAddress> {
    let port = |at: usize| u16::from_be_bytes([block[at], block[at + 1]]);

    match family {
        AF_INET => {
            let src = Ipv4Addr::new(block[0], block[1], block[2], block[3]);
            let dst = Ipv4Addr::new(block[4], block[5], block[6], block[7]);
            Some(ProxiedAddress {
                source: SocketAddr::new(IpAddr::V4(src), port(8)),
                destination: SocketAddr::new(IpAddr::V4(dst), port(10)),
            })
        }
        AF_INET6 => {
            let mut src = [0u8; 16];
            let mut dst = [0u8; 16];
            src.copy_from_slice(&block[0..16]);
            dst.copy_from_slice(&block[16..32]);
            Some(ProxiedAddress {
                source: SocketAddr::new(IpAddr::V6(Ipv6Addr::from(src)), port(32)),
                destination: SocketAddr::new(IpAddr::V6(Ipv6Addr::from(dst)), port(34)),
            })
        }
        // UNIX socket paths are validated for length only
        _ => None,
    }
}

fn parse_tlvs(mut tlvs: &[u8], header: &mut ProxyHeader) -> Result<()> {
    while !tlvs.is_empty() {
        if tlvs.len() < 3 {
            return Err(malformed("truncated v2 TLV"));
        }
        let kind = tlvs[0];
        let len = u16::from_be_bytes([tlvs[1], tlvs[2]]) as usize;
        let value = tlvs
            .get(3..3 + len)
            .ok_or_else(|| malformed(format!("v2 TLV {:#04x} overruns the header", kind)))?;

        match kind {
            PP2_TYPE_AUTHORITY => {
                let authority = std::str::from_utf8(value)
                    .map_err(|_| malformed("v2 authority TLV is not UTF-8"))?;
                header.authority = Some(authority.to_string());
            }
            PP2_TYPE_UNIQUE_ID => {
                if value.len() > UNIQUE_ID_MAX_LEN {
                    return Err(malformed("v2 unique id TLV longer than 128 bytes"));
                }
                header.unique_id = Some(value.to_vec());
            }
            _ => {}
        }

        tlvs = &tlvs[3 + len..];
    }
    Ok(())
}
