use url::{Host, Url};

use super::{MemberIdentityProvider, Settings};
use crate::error::{CredentialError, Result};
use crate::netutil::IpNetwork;
use crate::pki::leaf::ETCD_CERT_DURATION_DAYS;

pub(crate) fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.cluster_name.trim().is_empty() {
        return Err(CredentialError::validation("cluster_name", "must not be empty"));
    }
    if settings.region.trim().is_empty() {
        return Err(CredentialError::validation("region", "must not be empty"));
    }
    if settings.assets_dir.as_os_str().is_empty() {
        return Err(CredentialError::validation("assets_dir", "must not be empty"));
    }
    if settings.tls.ca_duration_days == 0 {
        return Err(CredentialError::validation(
            "tls.ca_duration_days",
            "must be greater than 0",
        ));
    }
    if settings.tls.cert_duration_days == 0 {
        return Err(CredentialError::validation(
            "tls.cert_duration_days",
            "must be greater than 0",
        ));
    }
    if settings.tls.cert_duration_days > settings.tls.ca_duration_days {
        return Err(CredentialError::validation(
            "tls.cert_duration_days",
            "must not exceed tls.ca_duration_days",
        ));
    }
    if ETCD_CERT_DURATION_DAYS > settings.tls.ca_duration_days {
        return Err(CredentialError::validation(
            "tls.ca_duration_days",
            format!("must be at least {ETCD_CERT_DURATION_DAYS} to cover the etcd certificate"),
        ));
    }
    if settings.tls.organization.trim().is_empty() {
        return Err(CredentialError::validation(
            "tls.organization",
            "must not be empty",
        ));
    }
    IpNetwork::parse("network.service_cidr", &settings.network.service_cidr)?;
    for endpoint in &settings.api_endpoints {
        validate_dns_name("api_endpoints.dns_name", &endpoint.dns_name)?;
    }
    if settings.etcd.member_identity_provider == MemberIdentityProvider::Eni {
        if let Some(domain) = &settings.etcd.internal_domain_name {
            validate_dns_name("etcd.internal_domain_name", domain)?;
        }
    }
    if settings.dex.enabled {
        if let Host::Domain(name) = url_host("dex.url", &settings.dex.url)? {
            validate_dns_name("dex.url", &name)?;
        }
    }
    Ok(())
}

/// Rejects names that cannot appear in a certificate's DNS SAN.
pub(crate) fn validate_dns_name(field: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(CredentialError::validation(field, "DNS name must not be empty"));
    }
    if !name.is_ascii() {
        return Err(CredentialError::validation(
            field,
            format!("DNS name must be ASCII: {name}"),
        ));
    }
    if name.chars().any(|c| c.is_ascii_whitespace() || c == '/') {
        return Err(CredentialError::validation(
            field,
            format!("not a DNS name: {name}"),
        ));
    }
    Ok(())
}

/// Host of an `http(s)` URL, either a domain name or an IP address.
pub(crate) fn url_host(field: &str, url: &str) -> Result<Host<String>> {
    let parsed = Url::parse(url)
        .map_err(|e| CredentialError::validation(field, format!("{url:?}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(CredentialError::validation(
            field,
            format!("expected an http(s) URL, got {url:?}"),
        ));
    }
    parsed
        .host()
        .map(|host| host.to_owned())
        .ok_or_else(|| CredentialError::validation(field, format!("URL has no host: {url:?}")))
}
