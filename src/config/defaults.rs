use config::{ConfigBuilder, ConfigError, builder::DefaultState};

use crate::pki::ca::{DEFAULT_CA_DURATION_DAYS, DEFAULT_CA_ORGANIZATION};

const DEFAULT_CLUSTER_NAME: &str = "kubernetes";
const DEFAULT_REGION: &str = "us-west-1";
const DEFAULT_ASSETS_DIR: &str = "credentials";
const DEFAULT_MANAGE_CERTIFICATES: bool = true;
const DEFAULT_CERT_DURATION_DAYS: u32 = 365;
const DEFAULT_SERVICE_CIDR: &str = "10.3.0.0/24";
const DEFAULT_ETCD_MEMBER_IDENTITY_PROVIDER: &str = "eip";
const DEFAULT_KMS_KEY_ARN: &str = "";
const DEFAULT_DEX_ENABLED: bool = false;
const DEFAULT_DEX_URL: &str = "";

pub(crate) fn apply_defaults(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    builder
        .set_default("cluster_name", DEFAULT_CLUSTER_NAME)?
        .set_default("region", DEFAULT_REGION)?
        .set_default("assets_dir", DEFAULT_ASSETS_DIR)?
        .set_default("manage_certificates", DEFAULT_MANAGE_CERTIFICATES)?
        .set_default("tls.ca_duration_days", DEFAULT_CA_DURATION_DAYS)?
        .set_default("tls.cert_duration_days", DEFAULT_CERT_DURATION_DAYS)?
        .set_default("tls.organization", DEFAULT_CA_ORGANIZATION)?
        .set_default("network.service_cidr", DEFAULT_SERVICE_CIDR)?
        .set_default(
            "etcd.member_identity_provider",
            DEFAULT_ETCD_MEMBER_IDENTITY_PROVIDER,
        )?
        .set_default("kms.key_arn", DEFAULT_KMS_KEY_ARN)?
        .set_default("dex.enabled", DEFAULT_DEX_ENABLED)?
        .set_default("dex.url", DEFAULT_DEX_URL)
}
