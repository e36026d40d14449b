//! Reading back certificates that are already on disk.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

use rcgen::PublicKeyData;
use time::OffsetDateTime;
use time::macros::format_description;
use tokio::fs;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::pem::{Pem, parse_x509_pem};
use x509_parser::x509::X509Name;

use super::ca::CertificateAuthority;
use super::key::parse_private_key;
use super::leaf::LeafCertificateSpec;
use crate::error::{CredentialError, Result};

const CERTIFICATE_LABEL: &str = "CERTIFICATE";

/// The subject or issuer fields shown to operators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dn {
    pub organization: Vec<String>,
    pub common_name: String,
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields = Vec::new();
        if !self.organization.is_empty() {
            fields.push(format!("O={}", self.organization.join(", ")));
        }
        if !self.common_name.is_empty() {
            fields.push(format!("CN={}", self.common_name));
        }
        f.write_str(&fields.join(" "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub issuer: Dn,
    pub subject: Dn,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
}

impl fmt::Display for CertificateInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ips: Vec<String> = self.ip_addresses.iter().map(ToString::to_string).collect();
        writeln!(f, "Issuer: {}", self.issuer)?;
        writeln!(f, "Validity")?;
        writeln!(f, "    Not Before: {}", format_validity(self.not_before))?;
        writeln!(f, "    Not After : {}", format_validity(self.not_after))?;
        writeln!(f, "Subject: {}", self.subject)?;
        writeln!(f, "DNS Names: {}", self.dns_names.join(", "))?;
        write!(f, "IP Addresses: {}", ips.join(", "))
    }
}

// Mirrors `openssl x509 -text`, e.g. "Jan  2 15:04:05 2026 UTC".
fn format_validity(at: OffsetDateTime) -> String {
    let format = format_description!(
        "[month repr:short] [day padding:space] [hour]:[minute]:[second] [year] UTC"
    );
    at.format(format).unwrap_or_else(|_| at.to_string())
}

/// Whether the first PEM block in `data` is a certificate.
#[must_use]
pub fn is_certificate(data: &[u8]) -> bool {
    matches!(parse_x509_pem(data), Ok((_, pem)) if pem.label == CERTIFICATE_LABEL)
}

/// Parses every PEM block of `data`; all of them must be certificates.
///
/// # Errors
/// Returns a validation error if there is no block, a block is not a
/// certificate, or a certificate cannot be decoded.
pub fn parse_certificates(data: &[u8]) -> Result<Vec<CertificateInfo>> {
    let mut certificates = Vec::new();
    for pem in Pem::iter_from_buffer(data) {
        let pem = pem.map_err(|e| CredentialError::validation("certificate PEM", e.to_string()))?;
        if pem.label != CERTIFICATE_LABEL {
            return Err(CredentialError::validation(
                "certificate PEM",
                format!("failed to parse {}, only CERTIFICATE can be parsed", pem.label),
            ));
        }
        let cert = pem
            .parse_x509()
            .map_err(|e| CredentialError::validation("certificate", e.to_string()))?;
        certificates.push(describe(&cert));
    }
    if certificates.is_empty() {
        return Err(CredentialError::validation(
            "certificate PEM",
            "no certificate found",
        ));
    }
    Ok(certificates)
}

/// Lists the certificates of every `*.pem` file in `dir`, keyed by file name.
///
/// Files that do not start with a certificate block (private keys) are skipped.
///
/// # Errors
/// Returns a disk error if the directory or a file cannot be read and a
/// validation error if a certificate file is malformed.
pub async fn load_certificates(dir: &Path) -> Result<BTreeMap<String, Vec<CertificateInfo>>> {
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| CredentialError::disk_io("read assets dir", dir, e))?;
    let mut certificates = BTreeMap::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| CredentialError::disk_io("read assets dir", dir, e))?
    {
        let path = entry.path();
        if path.extension().is_none_or(|ext| ext != "pem") {
            continue;
        }
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| CredentialError::disk_io("stat", &path, e))?;
        if file_type.is_dir() {
            continue;
        }
        let data = fs::read(&path)
            .await
            .map_err(|e| CredentialError::disk_io("read", &path, e))?;
        if !is_certificate(&data) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        certificates.insert(name, parse_certificates(&data)?);
    }
    Ok(certificates)
}

/// Explains why an existing leaf pair cannot be kept, or `None` if it can.
///
/// A pair is kept only when the key belongs to the certificate, the
/// certificate was signed by `ca`, is currently valid, and names exactly the
/// subject and SANs `spec` asks for.
#[must_use]
pub fn stale_reason(
    ca: &CertificateAuthority,
    spec: &LeafCertificateSpec,
    cert_pem: &[u8],
    key_pem: &[u8],
) -> Option<String> {
    let (_, ca_pem) = match parse_x509_pem(ca.cert_pem().as_bytes()) {
        Ok(parsed) => parsed,
        Err(e) => return Some(format!("CA certificate is unreadable: {e}")),
    };
    let ca_cert = match ca_pem.parse_x509() {
        Ok(cert) => cert,
        Err(e) => return Some(format!("CA certificate is unreadable: {e}")),
    };
    let (_, pem) = match parse_x509_pem(cert_pem) {
        Ok(parsed) => parsed,
        Err(e) => return Some(format!("certificate is unreadable: {e}")),
    };
    let cert = match pem.parse_x509() {
        Ok(cert) => cert,
        Err(e) => return Some(format!("certificate is unreadable: {e}")),
    };

    let key = match std::str::from_utf8(key_pem)
        .map_err(|e| e.to_string())
        .and_then(|pem| parse_private_key(pem).map_err(|e| e.to_string()))
    {
        Ok(key) => key,
        Err(e) => return Some(format!("private key is unreadable: {e}")),
    };
    let cert_public_key: &[u8] = &cert.public_key().subject_public_key.data;
    if cert_public_key != key.der_bytes() {
        return Some("private key does not match the certificate".to_string());
    }

    if cert.verify_signature(Some(ca_cert.public_key())).is_err() {
        return Some("certificate was not signed by the current CA".to_string());
    }
    if !cert.validity().is_valid() {
        return Some("certificate is expired or not yet valid".to_string());
    }

    let info = describe(&cert);
    if info.subject.common_name != spec.common_name {
        return Some(format!("common name is {}", info.subject.common_name));
    }
    let expected_org: Vec<String> = spec.organization.iter().cloned().collect();
    if info.subject.organization != expected_org {
        return Some("organization changed".to_string());
    }
    let actual_dns: BTreeSet<&str> = info.dns_names.iter().map(String::as_str).collect();
    let expected_dns: BTreeSet<&str> = spec.dns_names.iter().map(String::as_str).collect();
    if actual_dns != expected_dns {
        return Some("DNS names changed".to_string());
    }
    let actual_ips: BTreeSet<IpAddr> = info.ip_addresses.iter().copied().collect();
    let expected_ips: BTreeSet<IpAddr> = spec.ip_addresses.iter().copied().collect();
    if actual_ips != expected_ips {
        return Some("IP addresses changed".to_string());
    }
    None
}

fn describe(cert: &X509Certificate<'_>) -> CertificateInfo {
    let mut dns_names = Vec::new();
    let mut ip_addresses = Vec::new();
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            match name {
                GeneralName::DNSName(dns) => dns_names.push((*dns).to_string()),
                GeneralName::IPAddress(bytes) => {
                    if let Some(ip) = ip_from_bytes(bytes) {
                        ip_addresses.push(ip);
                    }
                }
                _ => {}
            }
        }
    }
    CertificateInfo {
        issuer: dn(cert.issuer()),
        subject: dn(cert.subject()),
        not_before: cert.validity().not_before.to_datetime(),
        not_after: cert.validity().not_after.to_datetime(),
        dns_names,
        ip_addresses,
    }
}

fn dn(name: &X509Name<'_>) -> Dn {
    Dn {
        organization: name
            .iter_organization()
            .filter_map(|attr| attr.as_str().ok())
            .map(str::to_string)
            .collect(),
        common_name: name
            .iter_common_name()
            .next()
            .and_then(|attr| attr.as_str().ok())
            .unwrap_or_default()
            .to_string(),
    }
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    if let Ok(v4) = <[u8; 4]>::try_from(bytes) {
        return Some(IpAddr::V4(Ipv4Addr::from(v4)));
    }
    <[u8; 16]>::try_from(bytes)
        .ok()
        .map(|v6| IpAddr::V6(Ipv6Addr::from(v6)))
}
