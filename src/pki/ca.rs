use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair, KeyUsagePurpose, PublicKeyData};
use tracing::debug;

use super::key::{new_private_key, parse_private_key};
use super::{distinguished_name, random_serial_number, validity_window};
use crate::error::{CredentialError, Result};

pub const CA_COMMON_NAME: &str = "kube-ca";
pub const DEFAULT_CA_ORGANIZATION: &str = "kube-aws";
pub const DEFAULT_CA_DURATION_DAYS: u32 = 3650;

/// The cluster root of trust: a self-signed certificate and its signing key.
pub struct CertificateAuthority {
    cert_pem: String,
    key: KeyPair,
}

impl CertificateAuthority {
    /// Generates a new self-signed CA valid for `duration_days` from now.
    ///
    /// Nothing is persisted; writing `ca.pem` and `ca-key.pem` is up to the caller.
    ///
    /// # Errors
    /// Returns a crypto error if key generation or self-signing fails.
    pub fn generate(duration_days: u32, organization: &str) -> Result<Self> {
        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(CA_COMMON_NAME, Some(organization));
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        params.serial_number = Some(random_serial_number()?);
        (params.not_before, params.not_after) = validity_window(duration_days)?;

        let key = new_private_key()?;
        let cert = params
            .self_signed(&key)
            .map_err(|e| CredentialError::crypto("self-signing the CA certificate", e))?;
        debug!("Generated CA certificate valid for {duration_days} days");

        Ok(Self {
            cert_pem: cert.pem(),
            key,
        })
    }

    /// Loads an existing CA from its PEM certificate and private key.
    ///
    /// # Errors
    /// Returns an error if either PEM is malformed, the certificate is not a
    /// CA, or the key does not belong to the certificate.
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        let key = parse_private_key(key_pem)?;

        let (_, pem) = x509_parser::pem::parse_x509_pem(cert_pem.as_bytes())
            .map_err(|e| CredentialError::validation("CA certificate", e.to_string()))?;
        let cert = pem
            .parse_x509()
            .map_err(|e| CredentialError::validation("CA certificate", e.to_string()))?;
        if !cert.is_ca() {
            return Err(CredentialError::validation(
                "CA certificate",
                "certificate is not a certificate authority",
            ));
        }
        let cert_public_key: &[u8] = &cert.public_key().subject_public_key.data;
        if cert_public_key != key.der_bytes() {
            return Err(CredentialError::validation(
                "CA key",
                "private key does not match the CA certificate",
            ));
        }

        Ok(Self {
            cert_pem: cert_pem.to_string(),
            key,
        })
    }

    #[must_use]
    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    #[must_use]
    pub fn key_pem(&self) -> String {
        self.key.serialize_pem()
    }

    pub(crate) fn key_pair(&self) -> &KeyPair {
        &self.key
    }
}
