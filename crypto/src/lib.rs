#![forbid(unsafe_code)]

//! Thin wrapper over the cryptographic primitives the protocol is fixed
//! on: ECDH and ECDSA over NIST P-256, AES-128-GCM, HMAC-SHA-256 and
//! SHA-256. One algorithm per operation, no negotiation anywhere.
//!
//! Public keys travel as uncompressed-point SubjectPublicKeyInfo DER
//! (usually base-64 wrapped); private keys rest on disk as PKCS#8 DER.
//! The commitment of a public key is the SHA-256 of its DER encoding.

use std::fs;
use std::path::Path;

use aes_gcm::aead::generic_array::typenum::U16;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::Aead;
use aes_gcm::aes::Aes128;
use aes_gcm::{AesGcm, KeyInit};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rand::RngCore;
use sha2::{Digest, Sha256};

pub use p256::{PublicKey, SecretKey};

/// IV_SIZE is the length in bytes of the GCM initialisation vectors the
/// protocol exchanges alongside each ciphertext.
pub const IV_SIZE: usize = 16;

/// TAG_SIZE is the length in bytes of the GCM authentication tag appended
/// to every ciphertext.
pub const TAG_SIZE: usize = 16;

/// SHA256_SIZE is the length in bytes of a SHA-256 digest, and therefore
/// of a key commitment.
pub const SHA256_SIZE: usize = 32;

// The protocol fixes a 16-byte IV, so the cipher is instantiated with a
// non-default nonce length.
type Aes128Gcm16 = AesGcm<Aes128, U16>;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key encoding: {0}")]
    PrivateKeyEncoding(#[from] p256::pkcs8::Error),
    #[error("public key encoding: {0}")]
    PublicKeyEncoding(#[from] p256::pkcs8::spki::Error),
    #[error("signature encoding: {0}")]
    SignatureEncoding(#[from] p256::ecdsa::Error),
    #[error("base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("symmetric key must be {expected} bytes, got {actual}")]
    KeyLength { expected: usize, actual: usize },
    #[error("iv must be {IV_SIZE} bytes, got {0}")]
    IvLength(usize),
    #[error("authenticated decryption failed")]
    DecryptFailed,
    #[error("encryption failed")]
    EncryptFailed,
    #[error("malformed iv:ciphertext input")]
    MalformedIvCiphertext,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Generates a fresh P-256 key pair from the OS generator.
pub fn generate_key_pair() -> (SecretKey, PublicKey) {
    let secret = SecretKey::random(&mut rand::rngs::OsRng);
    let public = secret.public_key();
    (secret, public)
}

/// `len` random bytes from the OS generator; used for symmetric keys of
/// 16 or 32 bytes.
pub fn generate_symmetric_key(len: usize) -> Vec<u8> {
    let mut key = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

/// A fresh random 16-byte initialisation vector.
pub fn generate_iv() -> [u8; IV_SIZE] {
    let mut iv = [0u8; IV_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut iv);
    iv
}

// --- public key encoding ---------------------------------------------------

pub fn public_key_der(public: &PublicKey) -> Result<Vec<u8>, CryptoError> {
    Ok(public.to_public_key_der()?.as_bytes().to_vec())
}

pub fn public_key_from_der(der: &[u8]) -> Result<PublicKey, CryptoError> {
    Ok(PublicKey::from_public_key_der(der)?)
}

pub fn public_key_base64(public: &PublicKey) -> Result<String, CryptoError> {
    Ok(BASE64.encode(public_key_der(public)?))
}

pub fn public_key_from_base64(encoded: &str) -> Result<PublicKey, CryptoError> {
    public_key_from_der(&BASE64.decode(encoded)?)
}

// --- private key encoding --------------------------------------------------

pub fn private_key_der(secret: &SecretKey) -> Result<Vec<u8>, CryptoError> {
    Ok(secret.to_pkcs8_der()?.as_bytes().to_vec())
}

pub fn private_key_from_der(der: &[u8]) -> Result<SecretKey, CryptoError> {
    Ok(SecretKey::from_pkcs8_der(der)?)
}

pub fn load_private_key(path: &Path) -> Result<SecretKey, CryptoError> {
    private_key_from_der(&fs::read(path)?)
}

pub fn store_private_key(secret: &SecretKey, path: &Path) -> Result<(), CryptoError> {
    Ok(fs::write(path, private_key_der(secret)?)?)
}

pub fn load_public_key(path: &Path) -> Result<PublicKey, CryptoError> {
    public_key_from_der(&fs::read(path)?)
}

pub fn store_public_key(public: &PublicKey, path: &Path) -> Result<(), CryptoError> {
    Ok(fs::write(path, public_key_der(public)?)?)
}

// --- agreement, signing, hashing -------------------------------------------

/// The raw ECDH shared secret between a local private key and a peer's
/// public key. Both sides compute the same bytes.
pub fn ecdh_shared_secret(secret: &SecretKey, peer: &PublicKey) -> Vec<u8> {
    p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine())
        .raw_secret_bytes()
        .to_vec()
}

/// ECDSA over the SHA-256 digest of `data`; the signature is DER-encoded.
pub fn sign(secret: &SecretKey, data: &[u8]) -> Vec<u8> {
    let signing_key = SigningKey::from(secret);
    let signature: Signature = signing_key.sign(data);
    signature.to_der().as_bytes().to_vec()
}

/// Verifies a DER-encoded ECDSA signature. Malformed input verifies as
/// false rather than failing.
pub fn verify(public: &PublicKey, data: &[u8], signature: &[u8]) -> bool {
    let verifying_key = VerifyingKey::from(public);
    match Signature::from_der(signature) {
        Ok(signature) => verifying_key.verify(data, &signature).is_ok(),
        Err(_) => false,
    }
}

pub fn sha256(data: &[u8]) -> [u8; SHA256_SIZE] {
    Sha256::digest(data).into()
}

/// HMAC-SHA-256 of `data` under `key`.
pub fn generate_mac(key: &[u8], data: &[u8]) -> [u8; SHA256_SIZE] {
    // any key length is acceptable to HMAC
    let mut mac: HmacSha256 = Mac::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

// --- authenticated encryption ----------------------------------------------

fn cipher(key: &[u8]) -> Result<Aes128Gcm16, CryptoError> {
    Aes128Gcm16::new_from_slice(key).map_err(|_| CryptoError::KeyLength {
        expected: 16,
        actual: key.len(),
    })
}

fn check_iv(iv: &[u8]) -> Result<(), CryptoError> {
    if iv.len() == IV_SIZE {
        Ok(())
    } else {
        Err(CryptoError::IvLength(iv.len()))
    }
}

/// AES-128-GCM. The result is the ciphertext with the 16-byte
/// authentication tag appended.
pub fn encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    check_iv(iv)?;
    cipher(key)?
        .encrypt(GenericArray::from_slice(iv), plaintext)
        .map_err(|_| CryptoError::EncryptFailed)
}

/// Inverse of [`encrypt`]. Tag verification failure yields an error and
/// no plaintext at all.
pub fn decrypt(key: &[u8], iv: &[u8], input: &[u8]) -> Result<Vec<u8>, CryptoError> {
    check_iv(iv)?;
    cipher(key)?
        .decrypt(GenericArray::from_slice(iv), input)
        .map_err(|_| CryptoError::DecryptFailed)
}

/// Encrypts under a fresh IV and renders `"<base64 iv>:<base64 ct‖tag>"`.
pub fn encrypt_iv_base64(key: &[u8], plaintext: &[u8]) -> Result<String, CryptoError> {
    let iv = generate_iv();
    let ciphertext = encrypt(key, &iv, plaintext)?;
    Ok(format!("{}:{}", BASE64.encode(iv), BASE64.encode(ciphertext)))
}

/// Inverse of [`encrypt_iv_base64`]; splits at the first colon.
pub fn decrypt_iv_base64(key: &[u8], input: &str) -> Result<Vec<u8>, CryptoError> {
    let (iv, ciphertext) = input
        .split_once(':')
        .ok_or(CryptoError::MalformedIvCiphertext)?;
    decrypt(key, &BASE64.decode(iv)?, &BASE64.decode(ciphertext)?)
}

// --- commitments ------------------------------------------------------------

/// The commitment of a public key: SHA-256 over its DER encoding. Short,
/// stable, and safe to publish.
pub fn commitment(public: &PublicKey) -> Result<[u8; SHA256_SIZE], CryptoError> {
    Ok(sha256(&public_key_der(public)?))
}

pub fn commitment_base64(public: &PublicKey) -> Result<String, CryptoError> {
    Ok(BASE64.encode(commitment(public)?))
}
