//! Certificate handling module
//!
//! Helpers for reading X.509 certificates and describing TLS peers.

use std::fs;
use std::path::Path;

use openssl::asn1::Asn1StringRef;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::x509::{X509, X509NameRef, X509Ref};

use crate::common::{Result, SyslogError};

/// Identity of a TLS peer, taken from its certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    /// Subject common name
    pub common_name: Option<String>,
    /// Subject organization
    pub organization: Option<String>,
    /// Subject organizational unit
    pub organizational_unit: Option<String>,
    /// SHA-256 fingerprint, colon separated hex
    pub fingerprint: String,
    /// Whether the chain verified against the configured CA bundle
    pub verified: bool,
}

impl PeerInfo {
    /// Describe a peer certificate
    pub fn from_cert(cert: &X509Ref, verified: bool) -> Result<Self> {
        let subject = cert.subject_name();

        Ok(Self {
            common_name: name_entry(subject, Nid::COMMONNAME),
            organization: name_entry(subject, Nid::ORGANIZATIONNAME),
            organizational_unit: name_entry(subject, Nid::ORGANIZATIONALUNITNAME),
            fingerprint: fingerprint(cert)?,
            verified,
        })
    }
}

fn name_entry(name: &X509NameRef, nid: Nid) -> Option<String> {
    name.entries_by_nid(nid)
        .next()
        .and_then(|entry| entry_text(entry.data()))
}

/// Text of a name entry; entries with an embedded NUL are not trusted
fn entry_text(data: &Asn1StringRef) -> Option<String> {
    let bytes = data.as_slice();
    if bytes.contains(&0) {
        return None;
    }
    std::str::from_utf8(bytes).ok().map(str::to_string)
}

/// SHA-256 fingerprint of a certificate as colon separated hex
pub fn fingerprint(cert: &X509Ref) -> Result<String> {
    let digest = cert
        .digest(MessageDigest::sha256())
        .map_err(|e| SyslogError::Certificate(format!("Failed to calculate certificate fingerprint: {}", e)))?;

    Ok(digest
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<String>>()
        .join(":"))
}

/// Load certificate from PEM file
///
/// # Errors
///
/// Returns an error if the certificate cannot be read or parsed.
pub fn load_cert(cert_path: &Path) -> Result<X509> {
    let cert_data = fs::read(cert_path)
        .map_err(|e| SyslogError::Certificate(format!("Failed to read certificate file: {}", e)))?;

    X509::from_pem(&cert_data)
        .map_err(|e| SyslogError::Certificate(format!("Failed to parse certificate: {}", e)))
}

/// Get certificate subject as `CN=..., O=...`
pub fn get_cert_subject(cert_path: &Path) -> Result<String> {
    let cert = load_cert(cert_path)?;

    let parts: Vec<String> = cert
        .subject_name()
        .entries()
        .filter_map(|entry| {
            let key = entry.object().nid().short_name().ok()?;
            let value = entry_text(entry.data())?;
            Some(format!("{}={}", key, value))
        })
        .collect();

    Ok(parts.join(", "))
}

/// Get the SHA-256 fingerprint of a certificate file
pub fn get_cert_fingerprint(cert_path: &Path) -> Result<String> {
    let cert = load_cert(cert_path)?;
    fingerprint(&cert)
}
