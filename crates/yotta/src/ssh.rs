//! Local SSH keypair management and registration with the account.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::providers::traits::{PodApi, ProvisionerError};

/// Key file name under `~/.yotta`.
pub const DEFAULT_KEY_NAME: &str = "sky-key";

/// Comment written into generated keys.
const KEY_COMMENT: &str = "yotta-provisioner";

/// Registration state of a public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SshKeyRecord {
    /// OpenSSH style `SHA256:` fingerprint.
    pub public_key_fingerprint: String,
    /// Whether the account knows the key.
    pub registered: bool,
}

/// A keypair that exists locally and is registered remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshKey {
    /// Private key file.
    pub private_key_path: PathBuf,
    /// Public key file.
    pub public_key_path: PathBuf,
    /// Public key line.
    pub public_key: String,
    /// Fingerprint and registration state.
    pub record: SshKeyRecord,
}

/// Ensures a keypair exists and is known to the account before launch.
#[derive(Debug, Clone)]
pub struct SshKeyProvisioner {
    private_key_path: PathBuf,
}

impl SshKeyProvisioner {
    /// Use the keypair at `private_key_path` (public key at `<path>.pub`).
    #[must_use]
    pub fn new(private_key_path: impl Into<PathBuf>) -> Self {
        Self {
            private_key_path: private_key_path.into(),
        }
    }

    /// Use `~/.yotta/sky-key`.
    ///
    /// # Errors
    /// Returns [`ProvisionerError::Config`] if the home directory is unknown.
    pub fn default_location() -> Result<Self, ProvisionerError> {
        let home = dirs::home_dir()
            .ok_or_else(|| ProvisionerError::Config("cannot determine home directory".into()))?;
        Ok(Self::new(home.join(".yotta").join(DEFAULT_KEY_NAME)))
    }

    /// Private key file.
    #[must_use]
    pub fn private_key_path(&self) -> &Path {
        &self.private_key_path
    }

    /// Public key file.
    #[must_use]
    pub fn public_key_path(&self) -> PathBuf {
        let mut path = self.private_key_path.clone().into_os_string();
        path.push(".pub");
        PathBuf::from(path)
    }

    /// Make sure the keypair exists locally and is registered.
    ///
    /// Safe to call before every launch.
    ///
    /// # Errors
    /// Returns [`ProvisionerError::SshKey`] if the keypair cannot be created
    /// or read, or the registration error from the API.
    pub async fn ensure_key<A: PodApi + ?Sized>(
        &self,
        api: &A,
    ) -> Result<SshKey, ProvisionerError> {
        let public_key_path = self.public_key_path();

        if !file_exists(&self.private_key_path).await? {
            self.generate().await?;
        } else if !file_exists(&public_key_path).await? {
            self.derive_public_key(&public_key_path).await?;
        }

        let public_key = tokio::fs::read_to_string(&public_key_path)
            .await
            .map_err(|e| {
                ProvisionerError::SshKey(format!("cannot read {}: {e}", public_key_path.display()))
            })?
            .trim()
            .to_string();
        let public_key_fingerprint = fingerprint(&public_key)?;

        api.register_public_key(&public_key).await?;
        info!(fingerprint = %public_key_fingerprint, "SSH key registered");

        Ok(SshKey {
            private_key_path: self.private_key_path.clone(),
            public_key_path,
            public_key,
            record: SshKeyRecord {
                public_key_fingerprint,
                registered: true,
            },
        })
    }

    async fn generate(&self) -> Result<(), ProvisionerError> {
        if let Some(parent) = self.private_key_path.parent() {
            create_private_dir(parent).await?;
        }
        let public_key_path = self.public_key_path();
        if file_exists(&public_key_path).await? {
            tokio::fs::remove_file(&public_key_path).await.map_err(|e| {
                ProvisionerError::SshKey(format!(
                    "cannot remove stale {}: {e}",
                    public_key_path.display()
                ))
            })?;
        }

        info!(path = %self.private_key_path.display(), "Generating SSH keypair");
        let output = tokio::process::Command::new("ssh-keygen")
            .args(["-t", "ed25519", "-q", "-N", "", "-C", KEY_COMMENT, "-f"])
            .arg(&self.private_key_path)
            .output()
            .await
            .map_err(|e| ProvisionerError::SshKey(format!("failed to run ssh-keygen: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProvisionerError::SshKey(format!(
                "ssh-keygen failed: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }

    async fn derive_public_key(&self, public_key_path: &Path) -> Result<(), ProvisionerError> {
        debug!(path = %public_key_path.display(), "Recreating public key from private key");
        let output = tokio::process::Command::new("ssh-keygen")
            .arg("-y")
            .arg("-f")
            .arg(&self.private_key_path)
            .output()
            .await
            .map_err(|e| ProvisionerError::SshKey(format!("failed to run ssh-keygen: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProvisionerError::SshKey(format!(
                "cannot derive public key: {}",
                stderr.trim()
            )));
        }

        tokio::fs::write(public_key_path, &output.stdout)
            .await
            .map_err(|e| {
                ProvisionerError::SshKey(format!("cannot write {}: {e}", public_key_path.display()))
            })
    }
}

async fn file_exists(path: &Path) -> Result<bool, ProvisionerError> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| ProvisionerError::SshKey(format!("cannot access {}: {e}", path.display())))
}

async fn create_private_dir(dir: &Path) -> Result<(), ProvisionerError> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder
        .create(dir)
        .await
        .map_err(|e| ProvisionerError::SshKey(format!("cannot create {}: {e}", dir.display())))
}

/// OpenSSH `SHA256:` fingerprint of a public key line.
///
/// # Errors
/// Returns [`ProvisionerError::SshKey`] if the line has no base64 key blob.
pub fn fingerprint(public_key: &str) -> Result<String, ProvisionerError> {
    let blob = public_key
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| ProvisionerError::SshKey("public key has no key data".into()))?;
    let bytes = STANDARD
        .decode(blob)
        .map_err(|e| ProvisionerError::SshKey(format!("public key is not valid base64: {e}")))?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("SHA256:{}", STANDARD_NO_PAD.encode(digest)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIAABAgMEBQYHCAkKCwwNDg8QERITFBUWFxgZGhscHR4f test@host";

    #[test]
    fn test_fingerprint_matches_openssh_format() {
        assert_eq!(
            fingerprint(TEST_KEY).unwrap(),
            "SHA256:ZkAslGjFiUHdGf/WUL8rQvkib4PTvQatUV0OUQSncCA"
        );
    }

    #[test]
    fn test_fingerprint_ignores_comment() {
        let without_comment = TEST_KEY.rsplit_once(' ').unwrap().0;
        assert_eq!(
            fingerprint(without_comment).unwrap(),
            fingerprint(TEST_KEY).unwrap()
        );
    }

    #[test]
    fn test_fingerprint_rejects_malformed_keys() {
        assert!(matches!(fingerprint("ssh-ed25519"), Err(ProvisionerError::SshKey(_))));
        assert!(matches!(
            fingerprint("ssh-ed25519 not*base64"),
            Err(ProvisionerError::SshKey(_))
        ));
    }

    #[test]
    fn test_public_key_path() {
        let provisioner = SshKeyProvisioner::new("/home/u/.yotta/sky-key");
        assert_eq!(
            provisioner.public_key_path(),
            PathBuf::from("/home/u/.yotta/sky-key.pub")
        );
    }
}
