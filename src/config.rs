use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use url::Host;

use crate::encrypt::KmsConfig;
use crate::error::Result;

mod defaults;
pub(crate) mod validation;

pub const DEFAULT_CONFIG_FILE: &str = "cluster.toml";
pub const ENV_PREFIX: &str = "KUBE_ASSETS";

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub cluster_name: String,
    pub region: String,
    pub assets_dir: PathBuf,
    /// When false, certificates are managed outside this tool and only
    /// tokens are handled.
    pub manage_certificates: bool,
    pub tls: TlsSettings,
    pub network: NetworkSettings,
    #[serde(default)]
    pub api_endpoints: Vec<ApiEndpoint>,
    pub etcd: EtcdSettings,
    pub kms: KmsSettings,
    pub dex: DexSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TlsSettings {
    pub ca_duration_days: u32,
    pub cert_duration_days: u32,
    pub organization: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NetworkSettings {
    pub service_cidr: String,
}

/// A name under which the API server is reachable from outside the cluster.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ApiEndpoint {
    pub name: String,
    pub dns_name: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemberIdentityProvider {
    /// Members keep a stable Elastic IP; certificates name the public EC2 host.
    Eip,
    /// Members keep a stable network interface; certificates name the private host.
    Eni,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EtcdSettings {
    pub member_identity_provider: MemberIdentityProvider,
    #[serde(default)]
    pub internal_domain_name: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KmsSettings {
    /// Empty disables encryption of keys and tokens.
    pub key_arn: String,
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DexSettings {
    pub enabled: bool,
    pub url: String,
}

impl Settings {
    /// Loads settings from defaults, then `config_path` (or `cluster.toml`
    /// when present), then `KUBE_ASSETS_*` environment variables.
    ///
    /// # Errors
    /// Returns error if configuration parsing fails (e.g. invalid format).
    pub fn new(config_path: Option<PathBuf>) -> std::result::Result<Self, ConfigError> {
        let builder = defaults::apply_defaults(Config::builder())?;

        let (path, required) = match config_path {
            Some(path) => (path, true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        let builder = builder.add_source(File::from(path).required(required));

        // e.g. KUBE_ASSETS_REGION, KUBE_ASSETS_TLS__CERT_DURATION_DAYS
        let builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Validates configuration values for correctness.
    ///
    /// # Errors
    /// Returns a validation error naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        validation::validate_settings(self)
    }

    /// Whether private keys and tokens are wrapped with KMS.
    #[must_use]
    pub fn encryption_enabled(&self) -> bool {
        !self.kms.key_arn.trim().is_empty()
    }

    #[must_use]
    pub fn kms_config(&self) -> Option<KmsConfig> {
        self.encryption_enabled().then(|| KmsConfig {
            region: self.region.clone(),
            key_arn: self.kms.key_arn.clone(),
            endpoint_url: self.kms.endpoint_url.clone(),
        })
    }

    /// DNS names of every API endpoint, deduplicated in declaration order.
    #[must_use]
    pub fn external_dns_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for endpoint in &self.api_endpoints {
            if !names.contains(&endpoint.dns_name) {
                names.push(endpoint.dns_name.clone());
            }
        }
        names
    }

    /// Host part of `dex.url`, when dex is enabled.
    ///
    /// # Errors
    /// Returns a validation error if the URL has no scheme or host.
    pub fn dex_host(&self) -> Result<Option<Host<String>>> {
        if !self.dex.enabled {
            return Ok(None);
        }
        validation::url_host("dex.url", &self.dex.url).map(Some)
    }
}
