//! The payloads rendered into the code a user scans to begin a session:
//! `KeyAuth` ("KA") bootstraps authentication against a known service,
//! `KeyPairing` ("KP") bootstraps pairing with a new one. Only the JSON
//! payload is produced here; turning it into pixels is the front-end's
//! business.
//!
//! Both carry a signature over the canonical concatenation
//! `td.serialize() ‖ ed ‖ sa ‖ sn ‖ DER(spk)`, absent fields contributing
//! empty strings.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crypto::{PublicKey, SecretKey};
use json::Json;

#[derive(Debug, thiserror::Error)]
pub enum QrError {
    #[error("json: {0}")]
    Json(#[from] json::JsonError),
    #[error("crypto: {0}")]
    Crypto(#[from] crypto::CryptoError),
    #[error("base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("payload is missing field {0:?}")]
    MissingField(&'static str),
    #[error("payload type {0:?} is not the expected one")]
    WrongType(String),
}

/// The authentication bootstrap payload: the channel to meet on, the
/// service identity key with its commitment, and the service's
/// signature.
#[derive(Debug, Clone)]
pub struct KeyAuth {
    pub service_address: String,
    pub service_public_key: PublicKey,
    pub commitment: Vec<u8>,
    pub extra_display_data: String,
    pub terminal_data: Option<Json>,
    signature: Vec<u8>,
}

impl KeyAuth {
    pub fn new(
        service_address: &str,
        service_identity: &SecretKey,
        extra_display_data: &str,
        terminal_data: Option<Json>,
    ) -> Result<KeyAuth, QrError> {
        let service_public_key = service_identity.public_key();
        let der = crypto::public_key_der(&service_public_key)?;
        let content = signed_content(
            terminal_data.as_ref(),
            extra_display_data,
            service_address,
            None,
            &der,
        );
        Ok(KeyAuth {
            service_address: service_address.to_owned(),
            commitment: crypto::commitment(&service_public_key)?.to_vec(),
            service_public_key,
            extra_display_data: extra_display_data.to_owned(),
            terminal_data,
            signature: crypto::sign(service_identity, &content),
        })
    }

    pub fn serialize(&self) -> Result<String, QrError> {
        let mut payload = Json::new();
        payload.set_string("t", "KA");
        payload.set_string("sa", &self.service_address);
        payload.set_string("spk", &crypto::public_key_base64(&self.service_public_key)?);
        payload.set_string("sc", &BASE64.encode(&self.commitment));
        payload.set_string("ed", &self.extra_display_data);
        if let Some(terminal_data) = &self.terminal_data {
            payload.set_object("td", terminal_data.clone());
        }
        payload.set_string("sig", &BASE64.encode(&self.signature));
        Ok(payload.serialize())
    }

    pub fn parse(text: &str) -> Result<KeyAuth, QrError> {
        let payload = Json::deserialize(text)?;
        expect_type(&payload, "KA")?;
        Ok(KeyAuth {
            service_address: require(&payload, "sa")?.to_owned(),
            service_public_key: crypto::public_key_from_base64(require(&payload, "spk")?)?,
            commitment: BASE64.decode(require(&payload, "sc")?)?,
            extra_display_data: payload.get_string("ed").unwrap_or_default().to_owned(),
            terminal_data: payload.get_object("td").cloned(),
            signature: BASE64.decode(require(&payload, "sig")?)?,
        })
    }

    /// Whether the signature verifies under the enclosed service key and
    /// the commitment matches it.
    pub fn verify(&self) -> bool {
        let Ok(der) = crypto::public_key_der(&self.service_public_key) else {
            return false;
        };
        if crypto::sha256(&der).as_slice() != self.commitment.as_slice() {
            return false;
        }
        let content = signed_content(
            self.terminal_data.as_ref(),
            &self.extra_display_data,
            &self.service_address,
            None,
            &der,
        );
        crypto::verify(&self.service_public_key, &content, &self.signature)
    }
}

/// The pairing bootstrap payload: like [`KeyAuth`] but naming the
/// service instead of committing to it.
#[derive(Debug, Clone)]
pub struct KeyPairing {
    pub service_address: String,
    pub service_public_key: PublicKey,
    pub service_name: String,
    pub extra_display_data: String,
    pub terminal_data: Option<Json>,
    signature: Vec<u8>,
}

impl KeyPairing {
    pub fn new(
        service_address: &str,
        service_name: &str,
        service_identity: &SecretKey,
        extra_display_data: &str,
        terminal_data: Option<Json>,
    ) -> Result<KeyPairing, QrError> {
        let service_public_key = service_identity.public_key();
        let der = crypto::public_key_der(&service_public_key)?;
        let content = signed_content(
            terminal_data.as_ref(),
            extra_display_data,
            service_address,
            Some(service_name),
            &der,
        );
        Ok(KeyPairing {
            service_address: service_address.to_owned(),
            service_public_key,
            service_name: service_name.to_owned(),
            extra_display_data: extra_display_data.to_owned(),
            terminal_data,
            signature: crypto::sign(service_identity, &content),
        })
    }

    pub fn serialize(&self) -> Result<String, QrError> {
        let mut payload = Json::new();
        payload.set_string("t", "KP");
        payload.set_string("sa", &self.service_address);
        payload.set_string("spk", &crypto::public_key_base64(&self.service_public_key)?);
        payload.set_string("sn", &self.service_name);
        payload.set_string("ed", &self.extra_display_data);
        if let Some(terminal_data) = &self.terminal_data {
            payload.set_object("td", terminal_data.clone());
        }
        payload.set_string("sig", &BASE64.encode(&self.signature));
        Ok(payload.serialize())
    }

    pub fn parse(text: &str) -> Result<KeyPairing, QrError> {
        let payload = Json::deserialize(text)?;
        expect_type(&payload, "KP")?;
        Ok(KeyPairing {
            service_address: require(&payload, "sa")?.to_owned(),
            service_public_key: crypto::public_key_from_base64(require(&payload, "spk")?)?,
            service_name: require(&payload, "sn")?.to_owned(),
            extra_display_data: payload.get_string("ed").unwrap_or_default().to_owned(),
            terminal_data: payload.get_object("td").cloned(),
            signature: BASE64.decode(require(&payload, "sig")?)?,
        })
    }

    pub fn verify(&self) -> bool {
        let Ok(der) = crypto::public_key_der(&self.service_public_key) else {
            return false;
        };
        let content = signed_content(
            self.terminal_data.as_ref(),
            &self.extra_display_data,
            &self.service_address,
            Some(&self.service_name),
            &der,
        );
        crypto::verify(&self.service_public_key, &content, &self.signature)
    }
}

// td.serialize() ‖ ed ‖ sa ‖ sn ‖ DER(spk); absent fields are empty
fn signed_content(
    terminal_data: Option<&Json>,
    extra_display_data: &str,
    service_address: &str,
    service_name: Option<&str>,
    service_key_der: &[u8],
) -> Vec<u8> {
    let mut content = Vec::new();
    if let Some(terminal_data) = terminal_data {
        content.extend_from_slice(terminal_data.serialize().as_bytes());
    }
    content.extend_from_slice(extra_display_data.as_bytes());
    content.extend_from_slice(service_address.as_bytes());
    if let Some(service_name) = service_name {
        content.extend_from_slice(service_name.as_bytes());
    }
    content.extend_from_slice(service_key_der);
    content
}

fn require<'a>(payload: &'a Json, field: &'static str) -> Result<&'a str, QrError> {
    payload.get_string(field).ok_or(QrError::MissingField(field))
}

fn expect_type(payload: &Json, expected: &str) -> Result<(), QrError> {
    match payload.get_string("t") {
        Some(t) if t == expected => Ok(()),
        Some(t) => Err(QrError::WrongType(t.to_owned())),
        None => Err(QrError::MissingField("t")),
    }
}
