// src/core/keys.rs

//! Ephemeral SSH key pair generation for intra-cluster communication.

use tokio::process::Command;

use crate::core::cluster::KeyPair;
use crate::core::errors::FlintrockError;

/// Generates a 2048-bit RSA key pair by shelling out to the local
/// `ssh-keygen` with an empty passphrase. The key files only ever exist
/// inside a temporary directory that is removed when this function returns;
/// the caller receives the text blobs.
pub async fn generate_key_pair() -> Result<KeyPair, FlintrockError> {
    let scratch = tempfile::tempdir()?;
    let key_path = scratch.path().join("flintrock_rsa");

    let output = Command::new("ssh-keygen")
        .arg("-q")
        .arg("-t")
        .arg("rsa")
        .arg("-b")
        .arg("2048")
        .arg("-N")
        .arg("")
        .arg("-C")
        .arg("flintrock")
        .arg("-f")
        .arg(&key_path)
        .output()
        .await?;

    if !output.status.success() {
        return Err(FlintrockError::KeyGeneration(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    let private = tokio::fs::read_to_string(&key_path).await?;
    let public = tokio::fs::read_to_string(key_path.with_extension("pub")).await?;

    Ok(KeyPair { public, private })
}
