use aws_sdk_kms::config::retry::RetryConfig;
use aws_sdk_kms::config::{BehaviorVersion, Credentials, Region};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use kube_assets::assets::CachedEncryptor;
use kube_assets::compact::decompact;
use kube_assets::config::Settings;
use kube_assets::encrypt::{EncryptService, KmsEncryptService};
use kube_assets::render::{CredentialsOptions, read_or_create_compact_assets, render_credentials};
use kube_assets::CredentialError;
use serde_json::json;
use tempfile::tempdir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY_ARN: &str = "arn:aws:kms:us-west-1:123456789012:key/11111111-2222-3333-4444-555555555555";
const AMZ_JSON: &str = "application/x-amz-json-1.1";

fn kms_service(server: &MockServer) -> KmsEncryptService {
    let config = aws_sdk_kms::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-west-1"))
        .credentials_provider(Credentials::new("AKIDEXAMPLE", "secret", None, None, "test"))
        .endpoint_url(server.uri())
        .retry_config(RetryConfig::disabled())
        .build();
    KmsEncryptService::from_client(aws_sdk_kms::Client::from_conf(config), KEY_ARN)
}

fn kms_response(body: &serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), AMZ_JSON)
}

#[tokio::test]
async fn encrypt_returns_ciphertext_blob() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(header("x-amz-target", "TrentService.Encrypt"))
        .respond_with(kms_response(&json!({
            "CiphertextBlob": STANDARD.encode(b"wrapped-secret"),
            "KeyId": KEY_ARN,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ciphertext = kms_service(&server)
        .encrypt(b"secret")
        .await
        .expect("encrypt should succeed");

    assert_eq!(ciphertext, b"wrapped-secret");
}

#[tokio::test]
async fn decrypt_returns_plaintext() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(header("x-amz-target", "TrentService.Decrypt"))
        .respond_with(kms_response(&json!({
            "Plaintext": STANDARD.encode(b"secret"),
            "KeyId": KEY_ARN,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let plaintext = kms_service(&server)
        .decrypt(b"wrapped-secret")
        .await
        .expect("decrypt should succeed");

    assert_eq!(plaintext, b"secret");
}

#[tokio::test]
async fn backend_error_carries_code_and_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(400).set_body_raw(
            json!({
                "__type": "NotFoundException",
                "message": "Key 'arn' does not exist",
            })
            .to_string(),
            AMZ_JSON,
        ))
        .mount(&server)
        .await;

    let err = kms_service(&server)
        .encrypt(b"secret")
        .await
        .expect_err("encrypt should fail");

    assert_eq!(err.operation, "Encrypt");
    assert_eq!(err.key_id, KEY_ARN);
    assert_eq!(err.code, "NotFoundException");
    assert!(err.message.contains("does not exist"));
}

#[tokio::test]
async fn render_encrypts_each_secret_once() {
    let server = MockServer::start().await;
    // Five leaf keys and the bootstrap token; the empty tokens.csv is skipped.
    Mock::given(method("POST"))
        .and(path("/"))
        .and(header("x-amz-target", "TrentService.Encrypt"))
        .respond_with(kms_response(&json!({
            "CiphertextBlob": STANDARD.encode(b"kms-ciphertext"),
            "KeyId": KEY_ARN,
        })))
        .expect(6)
        .mount(&server)
        .await;

    let root = tempdir().expect("tempdir");
    let mut settings = Settings::new(None).expect("default settings");
    settings.assets_dir = root.path().join("credentials");
    settings.kms.key_arn = KEY_ARN.to_string();
    let encryptor = CachedEncryptor::new(kms_service(&server));

    render_credentials(
        &settings,
        &CredentialsOptions {
            generate_ca: true,
            ..CredentialsOptions::default()
        },
    )
    .await
    .expect("render should succeed");
    let first = read_or_create_compact_assets(&settings.assets_dir, true, false, &encryptor)
        .await
        .expect("first compaction");
    let second = read_or_create_compact_assets(&settings.assets_dir, true, false, &encryptor)
        .await
        .expect("second compaction");

    assert_eq!(first, second);
    assert_eq!(
        decompact(&first.worker_key).expect("worker key"),
        b"kms-ciphertext"
    );
    assert_eq!(
        std::fs::read(settings.assets_dir.join("worker-key.pem.enc")).expect("enc file"),
        b"kms-ciphertext"
    );
    assert!(!settings.assets_dir.join("ca-key.pem.enc").exists());
}

#[tokio::test]
async fn render_failure_names_the_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(400).set_body_raw(
            json!({
                "__type": "AccessDeniedException",
                "message": "User is not authorized to perform kms:Encrypt",
            })
            .to_string(),
            AMZ_JSON,
        ))
        .mount(&server)
        .await;

    let root = tempdir().expect("tempdir");
    let mut settings = Settings::new(None).expect("default settings");
    settings.assets_dir = root.path().join("credentials");
    render_credentials(
        &settings,
        &CredentialsOptions {
            generate_ca: true,
            ..CredentialsOptions::default()
        },
    )
    .await
    .expect("render should succeed");

    let encryptor = CachedEncryptor::new(kms_service(&server));
    let err = read_or_create_compact_assets(&settings.assets_dir, true, false, &encryptor)
        .await
        .expect_err("compaction should fail");

    match err {
        CredentialError::Encryption { name, source } => {
            assert_eq!(name, "apiserver-key.pem");
            assert_eq!(source.code, "AccessDeniedException");
        }
        other => panic!("expected an encryption error, got {other}"),
    }
}
