//! SSH key material for the machines of a self-managed cluster

use kubeforge_models::SshKeyPair;
use rand_core::OsRng;
use ssh_key::{Algorithm, LineEnding, PrivateKey};

use crate::error::{Error, Result};

/// Generate a fresh ed25519 key pair in OpenSSH encoding
pub fn generate_key_pair() -> Result<SshKeyPair> {
    let key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519)
        .map_err(|e| Error::Internal(format!("failed to generate ssh key: {}", e)))?;
    let private_key = key
        .to_openssh(LineEnding::LF)
        .map_err(|e| Error::Internal(format!("failed to encode ssh private key: {}", e)))?;
    let public_key = key
        .public_key()
        .to_openssh()
        .map_err(|e| Error::Internal(format!("failed to encode ssh public key: {}", e)))?;

    Ok(SshKeyPair {
        public_key,
        private_key: private_key.to_string(),
    })
}
