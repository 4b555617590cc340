//! The six protocol messages. Each is a JSON envelope; the confidential
//! part travels in an `encryptedData` field holding the base-64 of an
//! AES-128-GCM ciphertext (tag appended) under one of the derived session
//! keys, with its fresh IV alongside in `iv`.
//!
//! Inner payloads are concatenations of 4-byte-length-prepended blocks,
//! so their field order is part of the wire format.

mod pico_auth;
mod reauth;
mod service_auth;
mod start;
mod status;

pub use self::pico_auth::PicoAuth;
pub use self::reauth::{PicoReAuth, PicoReAuthContent, ReauthState, ServiceReAuth, ServiceReAuthContent};
pub use self::service_auth::ServiceAuth;
pub use self::start::Start;
pub use self::status::{Status, StatusCode};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use byteorder::{BigEndian, ByteOrder};
use json::Json;

use super::SigmaError;

pub(crate) fn parse_envelope(data: &[u8]) -> Result<Json, SigmaError> {
    let text = std::str::from_utf8(data).map_err(|_| SigmaError::Malformed("not utf-8"))?;
    Ok(Json::deserialize(text)?)
}

pub(crate) fn require_string<'a>(
    envelope: &'a Json,
    field: &'static str,
) -> Result<&'a str, SigmaError> {
    envelope.get_string(field).ok_or(SigmaError::MissingField(field))
}

/// Encrypts an inner payload under `key` with a fresh IV; returns the
/// base-64 `iv` and `encryptedData` field values.
pub(crate) fn encrypt_payload(key: &[u8], plaintext: &[u8]) -> Result<(String, String), SigmaError> {
    let iv = crypto::generate_iv();
    let ciphertext = crypto::encrypt(key, &iv, plaintext)?;
    Ok((BASE64.encode(iv), BASE64.encode(ciphertext)))
}

/// Decrypts the `iv`/`encryptedData` pair of an envelope under `key`.
pub(crate) fn decrypt_payload(key: &[u8], envelope: &Json) -> Result<Vec<u8>, SigmaError> {
    let iv = BASE64.decode(require_string(envelope, "iv")?)?;
    let ciphertext = BASE64.decode(require_string(envelope, "encryptedData")?)?;
    Ok(crypto::decrypt(key, &iv, &ciphertext)?)
}

/// The 4-byte big-endian form of the session id bound into both
/// signatures.
pub(crate) fn session_id_bytes(session_id: u32) -> [u8; 4] {
    let mut bytes = [0u8; 4];
    BigEndian::write_u32(&mut bytes, session_id);
    bytes
}

pub(crate) fn check_session_id(envelope: &Json, expected: u32) -> Result<(), SigmaError> {
    let received = envelope.get_integer("sessionId") as u32;
    if received != expected {
        return Err(SigmaError::SessionIdMismatch { received, expected });
    }
    Ok(())
}
