use std::collections::BTreeMap;
use std::net::IpAddr;

use rcgen::string::Ia5String;
use rcgen::{
    CertificateParams, ExtendedKeyUsagePurpose, IsCa, Issuer, KeyUsagePurpose, SanType,
};
use tracing::{debug, info};
use url::Host;

use super::ca::CertificateAuthority;
use super::key::new_private_key;
use super::{distinguished_name, random_serial_number, validity_window};
use crate::assets::{DEX_LEAF_NAME, RawCredential, cert_file_name, key_file_name};
use crate::config::validation::validate_dns_name;
use crate::config::{MemberIdentityProvider, Settings};
use crate::error::{CredentialError, Result};
use crate::netutil::kubernetes_service_ip;

/// etcd member certificates are not tied to the configurable duration.
pub const ETCD_CERT_DURATION_DAYS: u32 = 365;

pub const ADMIN_ORGANIZATION: &str = "system:masters";

const US_EAST_1: &str = "us-east-1";

const KUBERNETES_SERVICE_DNS_NAMES: [&str; 4] = [
    "kubernetes",
    "kubernetes.default",
    "kubernetes.default.svc",
    "kubernetes.default.svc.cluster.local",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateRole {
    Server,
    Client,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafCertificateSpec {
    pub name: String,
    pub common_name: String,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    pub organization: Option<String>,
    pub duration_days: u32,
    pub role: CertificateRole,
}

impl LeafCertificateSpec {
    fn new(name: &str, common_name: &str, duration_days: u32, role: CertificateRole) -> Self {
        Self {
            name: name.to_string(),
            common_name: common_name.to_string(),
            dns_names: Vec::new(),
            ip_addresses: Vec::new(),
            organization: None,
            duration_days,
            role,
        }
    }

    #[must_use]
    pub fn cert_file_name(&self) -> String {
        cert_file_name(&self.name)
    }

    #[must_use]
    pub fn key_file_name(&self) -> String {
        key_file_name(&self.name)
    }
}

#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub cert: RawCredential,
    pub key: RawCredential,
}

/// Derives the leaf certificates a cluster needs from its settings.
///
/// Everything that could make issuance fail on bad input is checked here,
/// before any key is generated.
///
/// # Errors
/// Returns a validation error for a malformed service CIDR, DNS name or dex URL.
pub fn cluster_leaf_specs(settings: &Settings) -> Result<Vec<LeafCertificateSpec>> {
    let duration = settings.tls.cert_duration_days;

    let mut apiserver =
        LeafCertificateSpec::new("apiserver", "kube-apiserver", duration, CertificateRole::Server);
    apiserver.dns_names = KUBERNETES_SERVICE_DNS_NAMES
        .iter()
        .map(ToString::to_string)
        .chain(settings.external_dns_names())
        .collect();
    apiserver.ip_addresses = vec![kubernetes_service_ip(&settings.network.service_cidr)?];

    let mut worker =
        LeafCertificateSpec::new("worker", "kube-worker", duration, CertificateRole::Client);
    worker.dns_names = worker_dns_names(&settings.region);

    let mut etcd = LeafCertificateSpec::new(
        "etcd",
        "kube-etcd",
        ETCD_CERT_DURATION_DAYS,
        CertificateRole::Server,
    );
    etcd.dns_names = etcd_dns_names(settings);

    let etcd_client = LeafCertificateSpec::new(
        "etcd-client",
        "kube-etcd-client",
        duration,
        CertificateRole::Client,
    );

    let mut admin =
        LeafCertificateSpec::new("admin", "kube-admin", duration, CertificateRole::Client);
    admin.organization = Some(ADMIN_ORGANIZATION.to_string());

    let mut specs = vec![apiserver, worker, admin, etcd, etcd_client];
    if let Some(host) = settings.dex_host()? {
        let mut dex =
            LeafCertificateSpec::new(DEX_LEAF_NAME, "dex", duration, CertificateRole::Server);
        match host {
            Host::Domain(name) => dex.dns_names.push(name),
            Host::Ipv4(ip) => dex.ip_addresses.push(IpAddr::V4(ip)),
            Host::Ipv6(ip) => dex.ip_addresses.push(IpAddr::V6(ip)),
        }
        specs.push(dex);
    }

    for spec in &specs {
        for dns_name in &spec.dns_names {
            validate_dns_name(&format!("{} DNS name", spec.name), dns_name)?;
        }
    }
    Ok(specs)
}

#[must_use]
pub fn worker_dns_names(region: &str) -> Vec<String> {
    vec![
        format!("*.{region}.compute.internal"),
        "*.ec2.internal".to_string(),
    ]
}

/// Wildcard covering the host names etcd members are reached under.
#[must_use]
pub fn etcd_dns_names(settings: &Settings) -> Vec<String> {
    let region = settings.region.as_str();
    let name = match settings.etcd.member_identity_provider {
        MemberIdentityProvider::Eni => match &settings.etcd.internal_domain_name {
            Some(domain) if !domain.trim().is_empty() => format!("*.{domain}"),
            _ if region == US_EAST_1 => "*.ec2.internal".to_string(),
            _ => format!("*.{region}.compute.internal"),
        },
        MemberIdentityProvider::Eip if region == US_EAST_1 => {
            "*.compute-1.amazonaws.com".to_string()
        }
        MemberIdentityProvider::Eip => format!("*.{region}.compute.amazonaws.com"),
    };
    vec![name]
}

/// Issues one leaf certificate with a fresh key, signed by `ca`.
///
/// # Errors
/// Returns a validation error for a SAN that cannot be encoded and a crypto
/// error if key generation or signing fails.
pub fn issue_certificate(
    ca: &CertificateAuthority,
    spec: &LeafCertificateSpec,
) -> Result<IssuedCertificate> {
    let issuer = Issuer::from_ca_cert_pem(ca.cert_pem(), ca.key_pair())
        .map_err(|e| CredentialError::crypto("loading the CA as issuer", e))?;

    let mut params = CertificateParams::default();
    params.distinguished_name =
        distinguished_name(&spec.common_name, spec.organization.as_deref());
    params.subject_alt_names = subject_alt_names(spec)?;
    params.is_ca = IsCa::ExplicitNoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = match spec.role {
        CertificateRole::Server => vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ],
        CertificateRole::Client => vec![ExtendedKeyUsagePurpose::ClientAuth],
    };
    params.use_authority_key_identifier_extension = true;
    params.serial_number = Some(random_serial_number()?);
    (params.not_before, params.not_after) = validity_window(spec.duration_days)?;

    let key = new_private_key()?;
    let cert = params.signed_by(&key, &issuer).map_err(|e| {
        CredentialError::crypto(format!("signing the {} certificate", spec.name), e)
    })?;
    debug!(
        "Issued {} certificate (CN={}, {} DNS, {} IP)",
        spec.name,
        spec.common_name,
        spec.dns_names.len(),
        spec.ip_addresses.len()
    );

    Ok(IssuedCertificate {
        cert: RawCredential::new(spec.cert_file_name(), cert.pem()),
        key: RawCredential::new(spec.key_file_name(), key.serialize_pem()),
    })
}

/// Issues every spec, stopping at the first failure.
///
/// # Errors
/// Returns the error of the first spec that could not be issued.
pub fn issue_certificates(
    ca: &CertificateAuthority,
    specs: &[LeafCertificateSpec],
) -> Result<BTreeMap<String, IssuedCertificate>> {
    let mut issued = BTreeMap::new();
    for spec in specs {
        issued.insert(spec.name.clone(), issue_certificate(ca, spec)?);
    }
    info!("Issued {} leaf certificates", issued.len());
    Ok(issued)
}

fn subject_alt_names(spec: &LeafCertificateSpec) -> Result<Vec<SanType>> {
    let mut sans = Vec::with_capacity(spec.dns_names.len() + spec.ip_addresses.len());
    for dns_name in &spec.dns_names {
        let name = Ia5String::try_from(dns_name.as_str()).map_err(|e| {
            CredentialError::validation(format!("{} DNS name", spec.name), e.to_string())
        })?;
        sans.push(SanType::DnsName(name));
    }
    sans.extend(spec.ip_addresses.iter().copied().map(SanType::IpAddress));
    Ok(sans)
}

#[cfg(test)]
mod tests {
    use time::{Duration, OffsetDateTime};
    use x509_parser::extensions::GeneralName;
    use x509_parser::pem::parse_x509_pem;

    use super::*;
    use crate::config::ApiEndpoint;

    fn settings() -> Settings {
        Settings::new(None).unwrap()
    }

    fn spec<'a>(specs: &'a [LeafCertificateSpec], name: &str) -> &'a LeafCertificateSpec {
        specs.iter().find(|spec| spec.name == name).unwrap()
    }

    #[test]
    fn test_apiserver_sans_are_complete() {
        let mut settings = settings();
        settings.api_endpoints.push(ApiEndpoint {
            name: "public".to_string(),
            dns_name: "k8s.example.com".to_string(),
        });

        let specs = cluster_leaf_specs(&settings).unwrap();
        let apiserver = spec(&specs, "apiserver");

        assert_eq!(
            apiserver.dns_names,
            vec![
                "kubernetes",
                "kubernetes.default",
                "kubernetes.default.svc",
                "kubernetes.default.svc.cluster.local",
                "k8s.example.com",
            ]
        );
        assert_eq!(
            apiserver.ip_addresses,
            vec!["10.3.0.1".parse::<IpAddr>().unwrap()]
        );
        assert_eq!(apiserver.role, CertificateRole::Server);
    }

    #[test]
    fn test_fixed_leaf_set() {
        let specs = cluster_leaf_specs(&settings()).unwrap();
        let names: Vec<_> = specs.iter().map(|spec| spec.name.as_str()).collect();
        assert_eq!(names, vec!["apiserver", "worker", "admin", "etcd", "etcd-client"]);

        let admin = spec(&specs, "admin");
        assert_eq!(admin.organization.as_deref(), Some("system:masters"));
        assert_eq!(spec(&specs, "etcd").duration_days, ETCD_CERT_DURATION_DAYS);
        assert!(spec(&specs, "etcd-client").dns_names.is_empty());
        assert_eq!(
            spec(&specs, "worker").dns_names,
            vec!["*.us-west-1.compute.internal", "*.ec2.internal"]
        );
    }

    #[test]
    fn test_dex_spec_only_when_enabled() {
        let mut settings = settings();
        settings.dex.enabled = true;
        settings.dex.url = "https://dex.example.com:5556".to_string();

        let specs = cluster_leaf_specs(&settings).unwrap();
        let dex = spec(&specs, "dex");
        assert_eq!(dex.dns_names, vec!["dex.example.com"]);
        assert_eq!(dex.role, CertificateRole::Server);
    }

    #[test]
    fn test_dex_ip_url_becomes_ip_san() {
        let mut settings = settings();
        settings.dex.enabled = true;
        settings.dex.url = "https://[fd00::10]:5556".to_string();
        settings.validate().unwrap();

        let specs = cluster_leaf_specs(&settings).unwrap();
        let dex = spec(&specs, "dex");
        assert!(dex.dns_names.is_empty());
        assert_eq!(dex.ip_addresses, vec!["fd00::10".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn test_malformed_cidr_fails_before_issuance() {
        let mut settings = settings();
        settings.network.service_cidr = "10.3.0.0".to_string();
        let err = cluster_leaf_specs(&settings).unwrap_err();
        assert!(matches!(err, CredentialError::Validation { .. }));
    }

    #[test]
    fn test_etcd_dns_names_by_identity_provider() {
        let mut settings = settings();
        settings.region = "us-east-1".to_string();
        assert_eq!(etcd_dns_names(&settings), vec!["*.compute-1.amazonaws.com"]);

        settings.region = "ap-northeast-1".to_string();
        assert_eq!(
            etcd_dns_names(&settings),
            vec!["*.ap-northeast-1.compute.amazonaws.com"]
        );

        settings.etcd.member_identity_provider = MemberIdentityProvider::Eni;
        assert_eq!(
            etcd_dns_names(&settings),
            vec!["*.ap-northeast-1.compute.internal"]
        );

        settings.region = "us-east-1".to_string();
        assert_eq!(etcd_dns_names(&settings), vec!["*.ec2.internal"]);

        settings.etcd.internal_domain_name = Some("etcd.example.internal".to_string());
        assert_eq!(etcd_dns_names(&settings), vec!["*.etcd.example.internal"]);
    }

    #[test]
    fn test_issued_certificate_verifies_against_ca() {
        let ca = CertificateAuthority::generate(3650, "kube-aws").unwrap();
        let specs = cluster_leaf_specs(&settings()).unwrap();
        let apiserver = spec(&specs, "apiserver");

        let issued = issue_certificate(&ca, apiserver).unwrap();
        assert_eq!(issued.cert.name(), "apiserver.pem");
        assert_eq!(issued.key.name(), "apiserver-key.pem");

        let (_, ca_pem) = parse_x509_pem(ca.cert_pem().as_bytes()).unwrap();
        let ca_cert = ca_pem.parse_x509().unwrap();
        let (_, leaf_pem) = parse_x509_pem(issued.cert.bytes()).unwrap();
        let leaf = leaf_pem.parse_x509().unwrap();

        leaf.verify_signature(Some(ca_cert.public_key())).unwrap();
        assert!(!leaf.is_ca());

        let now = OffsetDateTime::now_utc();
        let not_before = leaf.validity().not_before.to_datetime();
        let not_after = leaf.validity().not_after.to_datetime();
        assert!((not_before - now).abs() < Duration::minutes(1));
        assert!((not_after - (now + Duration::days(365))).abs() < Duration::minutes(1));

        let san = leaf.subject_alternative_name().unwrap().unwrap();
        let dns: Vec<_> = san
            .value
            .general_names
            .iter()
            .filter_map(|name| match name {
                GeneralName::DNSName(dns) => Some(*dns),
                _ => None,
            })
            .collect();
        assert!(dns.contains(&"kubernetes.default.svc.cluster.local"));
        let has_service_ip = san
            .value
            .general_names
            .iter()
            .any(|name| matches!(name, GeneralName::IPAddress(ip) if *ip == [10, 3, 0, 1]));
        assert!(has_service_ip);
    }

    #[test]
    fn test_issue_certificates_fails_fast() {
        let ca = CertificateAuthority::generate(30, "kube-aws").unwrap();
        let mut bad = LeafCertificateSpec::new("bad", "bad", 30, CertificateRole::Server);
        bad.dns_names = vec!["bücher.example".to_string()];
        let good = LeafCertificateSpec::new("good", "good", 30, CertificateRole::Client);

        let err = issue_certificates(&ca, &[bad, good]).unwrap_err();
        assert!(matches!(err, CredentialError::Validation { .. }));
    }
}
