use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use kube_assets::assets::CachedEncryptor;
use kube_assets::compact::decompact;
use kube_assets::config::Settings;
use kube_assets::encrypt::{DummyEncryptService, EncryptService};
use kube_assets::render::{
    CredentialsOptions, read_or_create_compact_assets, read_or_create_unencrypted_compact_assets,
    render_credentials,
};
use tempfile::tempdir;
use x509_parser::pem::parse_x509_pem;

const LEAVES: [&str; 5] = ["apiserver", "worker", "admin", "etcd", "etcd-client"];

fn settings(root: &Path) -> Settings {
    let mut settings = Settings::new(None).expect("default settings should load");
    settings.assets_dir = root.join("credentials");
    settings
}

fn generate_ca() -> CredentialsOptions {
    CredentialsOptions {
        generate_ca: true,
        ..CredentialsOptions::default()
    }
}

fn snapshot(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    std::fs::read_dir(dir)
        .expect("assets dir should be readable")
        .map(|entry| {
            let entry = entry.expect("entry should be readable");
            (
                entry.file_name().to_string_lossy().into_owned(),
                std::fs::read(entry.path()).expect("file should be readable"),
            )
        })
        .collect()
}

fn expected_files() -> Vec<String> {
    let mut files = vec![
        "ca.pem".to_string(),
        "ca-key.pem".to_string(),
        "tokens.csv".to_string(),
        "kubelet-tls-bootstrap-token".to_string(),
        "kubelet-tls-bootstrap-token.enc".to_string(),
    ];
    for leaf in LEAVES {
        files.push(format!("{leaf}.pem"));
        files.push(format!("{leaf}-key.pem"));
        files.push(format!("{leaf}-key.pem.enc"));
    }
    files.sort();
    files
}

#[tokio::test]
async fn fresh_directory_gets_complete_encrypted_asset_set() {
    let root = tempdir().expect("tempdir");
    let settings = settings(root.path());
    let dir = settings.assets_dir.clone();
    let encryptor = CachedEncryptor::new(DummyEncryptService::new().expect("dummy service"));

    render_credentials(&settings, &generate_ca())
        .await
        .expect("first render should succeed");
    let compact = read_or_create_compact_assets(&dir, true, false, &encryptor)
        .await
        .expect("compaction should succeed");

    let files = snapshot(&dir);
    assert_eq!(files.keys().cloned().collect::<Vec<_>>(), expected_files());
    for (name, contents) in &files {
        if name != "tokens.csv" {
            assert!(!contents.is_empty(), "{name} should not be empty");
        }
        let mode = std::fs::metadata(dir.join(name))
            .expect("metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600, "{name} should be owner-only");
    }
    let dir_mode = std::fs::metadata(&dir).expect("metadata").permissions().mode();
    assert_eq!(dir_mode & 0o777, 0o700);

    assert_eq!(
        decompact(&compact.ca_cert).expect("ca cert"),
        files["ca.pem"]
    );
    assert_eq!(
        decompact(&compact.apiserver_key).expect("apiserver key"),
        files["apiserver-key.pem.enc"]
    );
    let key = encryptor
        .service()
        .decrypt(&decompact(&compact.etcd_key).expect("etcd key"))
        .await
        .expect("decrypt");
    assert_eq!(key, files["etcd-key.pem"]);
    assert!(compact.auth_tokens.is_empty());
    assert!(compact.has_tls_bootstrap_token());
    assert!(compact.dex_cert.is_empty());
}

#[tokio::test]
async fn second_run_changes_nothing() {
    let root = tempdir().expect("tempdir");
    let settings = settings(root.path());
    let dir = settings.assets_dir.clone();
    let encryptor = CachedEncryptor::new(DummyEncryptService::new().expect("dummy service"));

    render_credentials(&settings, &generate_ca())
        .await
        .expect("first render should succeed");
    let first_compact = read_or_create_compact_assets(&dir, true, false, &encryptor)
        .await
        .expect("first compaction");
    let first = snapshot(&dir);

    let summary = render_credentials(&settings, &CredentialsOptions::default())
        .await
        .expect("second render should succeed");
    let second_compact = read_or_create_compact_assets(&dir, true, false, &encryptor)
        .await
        .expect("second compaction");

    assert!(summary.issued.is_empty());
    assert_eq!(snapshot(&dir), first);
    assert_eq!(second_compact, first_compact);
}

#[tokio::test]
async fn leaf_certificates_verify_against_generated_ca() {
    let root = tempdir().expect("tempdir");
    let settings = settings(root.path());
    let dir = settings.assets_dir.clone();

    render_credentials(&settings, &generate_ca())
        .await
        .expect("render should succeed");

    let ca_pem = std::fs::read(dir.join("ca.pem")).expect("ca.pem");
    let (_, ca_pem) = parse_x509_pem(&ca_pem).expect("ca pem");
    let ca = ca_pem.parse_x509().expect("ca cert");
    for leaf in LEAVES {
        let pem = std::fs::read(dir.join(format!("{leaf}.pem"))).expect("leaf pem");
        let (_, pem) = parse_x509_pem(&pem).expect("leaf pem");
        let cert = pem.parse_x509().expect("leaf cert");
        cert.verify_signature(Some(ca.public_key()))
            .unwrap_or_else(|e| panic!("{leaf} should verify against the CA: {e}"));
    }
}

#[tokio::test]
async fn regenerating_ca_reissues_every_leaf() {
    let root = tempdir().expect("tempdir");
    let settings = settings(root.path());
    let dir = settings.assets_dir.clone();
    let encryptor = CachedEncryptor::new(DummyEncryptService::new().expect("dummy service"));

    render_credentials(&settings, &generate_ca())
        .await
        .expect("first render");
    read_or_create_compact_assets(&dir, true, false, &encryptor)
        .await
        .expect("first compaction");
    let before = snapshot(&dir);

    let summary = render_credentials(&settings, &generate_ca())
        .await
        .expect("second render");

    assert!(summary.ca_generated);
    assert_eq!(summary.issued.len(), LEAVES.len());
    let after = snapshot(&dir);
    assert_ne!(after["ca.pem"], before["ca.pem"]);
    for leaf in LEAVES {
        assert_ne!(after[&format!("{leaf}.pem")], before[&format!("{leaf}.pem")]);
        assert!(!after.contains_key(&format!("{leaf}-key.pem.enc")));
    }
    assert_eq!(after["kubelet-tls-bootstrap-token"], before["kubelet-tls-bootstrap-token"]);
}

#[tokio::test]
async fn dex_credentials_are_rendered_when_enabled() {
    let root = tempdir().expect("tempdir");
    let mut settings = settings(root.path());
    settings.dex.enabled = true;
    settings.dex.url = "https://dex.example.com".to_string();

    render_credentials(&settings, &generate_ca())
        .await
        .expect("render should succeed");
    let compact = read_or_create_unencrypted_compact_assets(&settings.assets_dir, true, true)
        .await
        .expect("compaction");

    let dex_cert = decompact(&compact.dex_cert).expect("dex cert");
    let (_, pem) = parse_x509_pem(&dex_cert).expect("dex pem");
    let cert = pem.parse_x509().expect("dex cert");
    let san = cert
        .subject_alternative_name()
        .expect("san extension")
        .expect("san present");
    assert!(format!("{:?}", san.value.general_names).contains("dex.example.com"));
    assert_eq!(
        decompact(&compact.dex_key).expect("dex key"),
        std::fs::read(settings.assets_dir.join("dex-key.pem")).expect("dex key file")
    );
}
