use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use common_types::{read_length_prepended, Buffer, Nonce};
use json::Json;

use super::{decrypt_payload, encrypt_payload, parse_envelope, require_string, session_id_bytes};
use crate::{SessionState, SigmaError};

/// The verifier's authentication message. The cleartext half carries the
/// service's ephemeral key, its nonce and the session id; the encrypted
/// half (under `vEncKey`) proves ownership of the service identity key:
///
/// `DER(service identity key) ‖ sig ‖ mac`, each length-prepended, with
/// `sig` over `Nₚ ‖ sessionId ‖ DER(pico ephemeral) ‖ DER(service
/// ephemeral)` and `mac = HMAC(vMacKey, DER(service identity key))`.
pub struct ServiceAuth;

impl ServiceAuth {
    pub fn encode(session: &SessionState) -> Result<Vec<u8>, SigmaError> {
        let keys = session.keys()?;
        let identity_secret = session
            .service_identity_secret
            .as_ref()
            .ok_or(SigmaError::Incomplete("service identity key"))?;
        let identity_public = session
            .service_identity_public
            .as_ref()
            .ok_or(SigmaError::Incomplete("service identity key"))?;
        let ephemeral_public = session
            .service_ephemeral_public
            .as_ref()
            .ok_or(SigmaError::Incomplete("service ephemeral key"))?;

        let identity_der = crypto::public_key_der(identity_public)?;
        let signature = crypto::sign(identity_secret, &signed_content(session)?);
        let mac = crypto::generate_mac(&keys.v_mac, &identity_der);

        let mut inner = Buffer::new(256);
        inner.append_length_prepended(&identity_der);
        inner.append_length_prepended(&signature);
        inner.append_length_prepended(&mac);
        let (iv, encrypted) = encrypt_payload(&keys.v_enc, inner.as_slice())?;

        let mut envelope = Json::new();
        envelope.set_string(
            "serviceEphemPublicKey",
            &crypto::public_key_base64(ephemeral_public)?,
        );
        envelope.set_string("serviceNonce", &BASE64.encode(session.service_nonce.as_bytes()));
        envelope.set_integer("sessionId", session.session_id as i64);
        envelope.set_string("iv", &iv);
        envelope.set_string("encryptedData", &encrypted);
        Ok(envelope.serialize().into_bytes())
    }

    /// Records the service halves into the prover's session, derives the
    /// session keys, and verifies the service's proof of identity. When
    /// the session carries an expected service key (learned from the
    /// displayed code), the proven key must match it.
    pub fn decode(data: &[u8], session: &mut SessionState) -> Result<(), SigmaError> {
        let envelope = parse_envelope(data)?;

        let ephemeral = crypto::public_key_from_base64(require_string(
            &envelope,
            "serviceEphemPublicKey",
        )?)?;
        let nonce = Nonce::from_bytes(&BASE64.decode(require_string(&envelope, "serviceNonce")?)?)?;

        session.service_ephemeral_public = Some(ephemeral);
        session.service_nonce = nonce;
        session.session_id = envelope.get_integer("sessionId") as u32;
        session.derive_keys()?;

        let keys = session.keys()?;
        let inner = decrypt_payload(&keys.v_enc, &envelope)?;
        let (identity_der, offset) = read_length_prepended(&inner, 0)?;
        let (signature, offset) = read_length_prepended(&inner, offset)?;
        let (mac, _) = read_length_prepended(&inner, offset)?;

        if crypto::generate_mac(&keys.v_mac, identity_der).as_slice() != mac {
            return Err(SigmaError::MacMismatch);
        }
        let identity = crypto::public_key_from_der(identity_der)?;
        if !crypto::verify(&identity, &signed_content(session)?, signature) {
            return Err(SigmaError::BadSignature);
        }
        if let Some(expected) = &session.service_identity_public {
            if expected != &identity {
                return Err(SigmaError::WrongServiceIdentity);
            }
        }

        session.service_identity_public = Some(identity);
        Ok(())
    }
}

// Nₚ ‖ sessionId ‖ DER(pico ephemeral) ‖ DER(service ephemeral); both
// sides can assemble this once Start and the cleartext half are in.
fn signed_content(session: &SessionState) -> Result<Vec<u8>, SigmaError> {
    let pico_nonce = session
        .pico_nonce
        .as_ref()
        .ok_or(SigmaError::Incomplete("pico nonce"))?;
    let pico_ephemeral = session
        .pico_ephemeral_public
        .as_ref()
        .ok_or(SigmaError::Incomplete("pico ephemeral key"))?;
    let service_ephemeral = session
        .service_ephemeral_public
        .as_ref()
        .ok_or(SigmaError::Incomplete("service ephemeral key"))?;

    let mut content = Buffer::new(256);
    content.append(pico_nonce.as_bytes());
    content.append(&session_id_bytes(session.session_id));
    content.append(&crypto::public_key_der(pico_ephemeral)?);
    content.append(&crypto::public_key_der(service_ephemeral)?);
    Ok(content.into_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Start;

    fn handshaken_pair() -> (SessionState, SessionState) {
        let (service_identity, _) = crypto::generate_key_pair();
        let (pico_identity, _) = crypto::generate_key_pair();
        let pico = SessionState::for_pico(pico_identity, None);
        let mut service = SessionState::for_service(service_identity);
        Start::decode(&Start::encode(&pico).unwrap(), &mut service).unwrap();
        service.derive_keys().unwrap();
        (service, pico)
    }

    #[test]
    fn round_trip_authenticates_the_service() {
        let (service, mut pico) = handshaken_pair();
        let encoded = ServiceAuth::encode(&service).unwrap();
        ServiceAuth::decode(&encoded, &mut pico).unwrap();

        assert_eq!(pico.service_identity_public, service.service_identity_public);
        assert_eq!(pico.session_id, service.session_id);
        assert_eq!(pico.service_nonce, service.service_nonce);
        // both sides now hold the same keys
        assert_eq!(
            pico.keys().unwrap().shared,
            service.keys().unwrap().shared
        );
    }

    #[test]
    fn pinned_identity_must_match() {
        let (service, pico) = handshaken_pair();
        let encoded = ServiceAuth::encode(&service).unwrap();

        // a prover expecting a different service refuses the proof
        let (other_identity, other_public) = crypto::generate_key_pair();
        drop(other_identity);
        let (pico_identity, _) = crypto::generate_key_pair();
        let mut suspicious = SessionState::for_pico(pico_identity, Some(other_public));
        suspicious.pico_ephemeral_public = pico.pico_ephemeral_public;
        suspicious.pico_ephemeral_secret = pico.pico_ephemeral_secret;
        suspicious.pico_nonce = pico.pico_nonce;

        assert!(matches!(
            ServiceAuth::decode(&encoded, &mut suspicious),
            Err(SigmaError::WrongServiceIdentity)
        ));
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let (service, mut pico) = handshaken_pair();
        let encoded = String::from_utf8(ServiceAuth::encode(&service).unwrap()).unwrap();
        let envelope = json::Json::deserialize(&encoded).unwrap();
        let data = envelope.get_string("encryptedData").unwrap();
        // flip one character somewhere inside the ciphertext
        let mut tampered_data = data.to_owned();
        let replacement = if data.as_bytes()[10] == b'A' { 'B' } else { 'A' };
        tampered_data.replace_range(10..11, &replacement.to_string());
        let tampered = encoded.replace(data, &tampered_data);

        assert!(ServiceAuth::decode(tampered.as_bytes(), &mut pico).is_err());
    }

    #[test]
    fn signature_binds_the_pico_nonce() {
        let (service, pico) = handshaken_pair();
        let encoded = ServiceAuth::encode(&service).unwrap();

        // a session with a different pico nonce fails signature checking
        let (pico_identity, _) = crypto::generate_key_pair();
        let mut other = SessionState::for_pico(pico_identity, None);
        other.pico_ephemeral_public = pico.pico_ephemeral_public;
        other.pico_ephemeral_secret = pico.pico_ephemeral_secret;

        let result = ServiceAuth::decode(&encoded, &mut other);
        assert!(result.is_err());
    }
}
