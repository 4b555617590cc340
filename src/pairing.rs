//! Service identity key handling. A deployment keeps its long-term
//! P-256 pair in two files side by side: the PKCS#8 DER private key and
//! the SubjectPublicKeyInfo DER public key.

use std::path::Path;

use crypto::{PublicKey, SecretKey};

#[derive(Debug, thiserror::Error)]
pub enum PairingError {
    #[error("crypto: {0}")]
    Crypto(#[from] crypto::CryptoError),
    #[error("stored public key does not belong to the stored private key")]
    KeyMismatch,
}

/// Loads the service identity from its two key files, or, when either
/// file is missing, generates a fresh pair and writes both. Pairing-time
/// setup goes through here so a first run on a clean machine just works.
pub fn load_or_generate_service_identity(
    private_path: &Path,
    public_path: &Path,
) -> Result<(SecretKey, PublicKey), PairingError> {
    if private_path.exists() && public_path.exists() {
        let secret = crypto::load_private_key(private_path)?;
        let public = crypto::load_public_key(public_path)?;
        if secret.public_key() != public {
            return Err(PairingError::KeyMismatch);
        }
        log::debug!("loaded service identity from {}", private_path.display());
        return Ok((secret, public));
    }

    let (secret, public) = crypto::generate_key_pair();
    crypto::store_private_key(&secret, private_path)?;
    crypto::store_public_key(&public, public_path)?;
    log::info!("generated new service identity at {}", private_path.display());
    Ok((secret, public))
}
