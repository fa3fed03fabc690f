#![allow(clippy::missing_panics_doc)]

mod common;

use common::FakeApi;
use yotta::ssh::fingerprint;
use yotta::SshKeyProvisioner;

fn ssh_keygen_available() -> bool {
    let found = std::process::Command::new("ssh-keygen")
        .arg("-?")
        .output()
        .is_ok();
    if !found {
        eprintln!("ssh-keygen not found, skipping");
    }
    found
}

#[tokio::test]
async fn test_generates_missing_keypair() {
    if !ssh_keygen_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let key_dir = dir.path().join("home").join(".yotta");
    let provisioner = SshKeyProvisioner::new(key_dir.join("sky-key"));
    let api = FakeApi::new();

    let first = provisioner.ensure_key(&api).await.unwrap();

    assert!(first.private_key_path.is_file());
    assert!(first.public_key_path.is_file());
    assert!(first.public_key.starts_with("ssh-ed25519 "));
    assert!(first.record.registered);
    assert_eq!(
        first.record.public_key_fingerprint,
        fingerprint(&first.public_key).unwrap()
    );

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&key_dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    let second = provisioner.ensure_key(&api).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(api.registered_keys(), vec![first.public_key]);
}

#[tokio::test]
async fn test_recreates_missing_public_key() {
    if !ssh_keygen_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let provisioner = SshKeyProvisioner::new(dir.path().join("sky-key"));
    let api = FakeApi::new();

    let original = provisioner.ensure_key(&api).await.unwrap();
    let private_before = std::fs::read(&original.private_key_path).unwrap();
    std::fs::remove_file(&original.public_key_path).unwrap();

    let restored = provisioner.ensure_key(&api).await.unwrap();

    assert!(restored.public_key_path.is_file());
    assert_eq!(
        std::fs::read(&restored.private_key_path).unwrap(),
        private_before
    );
    assert_eq!(
        restored.record.public_key_fingerprint,
        original.record.public_key_fingerprint
    );
    assert_eq!(api.registered_keys().len(), 1);
}

#[tokio::test]
async fn test_unreadable_public_key_is_ssh_error() {
    let dir = tempfile::tempdir().unwrap();
    let key_path = dir.path().join("sky-key");
    std::fs::write(&key_path, "private").unwrap();
    std::fs::write(dir.path().join("sky-key.pub"), "ssh-ed25519 not*base64").unwrap();
    let api = FakeApi::new();

    let err = SshKeyProvisioner::new(&key_path)
        .ensure_key(&api)
        .await
        .unwrap_err();

    assert!(matches!(err, yotta::ProvisionerError::SshKey(_)));
    assert!(api.registered_keys().is_empty());
}
