//! Cluster PKI: the root CA, the fixed set of leaf certificates signed by
//! it, and inspection of certificates already on disk.

pub mod ca;
pub mod inspect;
pub mod key;
pub mod leaf;

pub use ca::CertificateAuthority;
pub use leaf::{
    CertificateRole, IssuedCertificate, LeafCertificateSpec, cluster_leaf_specs,
    issue_certificate, issue_certificates,
};

use rcgen::{DistinguishedName, DnType, SerialNumber};
use ring::rand::{SecureRandom, SystemRandom};
use time::{Duration, OffsetDateTime};

use crate::error::{CredentialError, Result};

const SERIAL_NUMBER_BYTES: usize = 16;

/// A random, positive 128-bit certificate serial number.
pub(crate) fn random_serial_number() -> Result<SerialNumber> {
    let mut bytes = [0u8; SERIAL_NUMBER_BYTES];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| CredentialError::crypto("generating a serial number", "random source failed"))?;
    bytes[0] &= 0x7f;
    Ok(SerialNumber::from_slice(&bytes))
}

/// `NotBefore = now`, `NotAfter = now + days`.
pub(crate) fn validity_window(days: u32) -> Result<(OffsetDateTime, OffsetDateTime)> {
    let not_before = OffsetDateTime::now_utc();
    let not_after = not_before
        .checked_add(Duration::days(i64::from(days)))
        .ok_or_else(|| {
            CredentialError::validation("certificate duration", format!("{days} days overflows"))
        })?;
    Ok((not_before, not_after))
}

pub(crate) fn distinguished_name(common_name: &str, organization: Option<&str>) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    if let Some(organization) = organization {
        dn.push(DnType::OrganizationName, organization);
    }
    dn.push(DnType::CommonName, common_name);
    dn
}
