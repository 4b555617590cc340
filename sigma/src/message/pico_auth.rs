use common_types::{read_length_prepended, Buffer};
use json::Json;

use super::{check_session_id, decrypt_payload, encrypt_payload, parse_envelope, session_id_bytes};
use crate::{SessionState, SigmaError};

/// The prover's authentication message: everything travels encrypted
/// under `pEncKey`.
///
/// Inner payload, length-prepended:
/// `DER(pico identity key) ‖ sig ‖ mac ‖ extraData`, with `sig` over
/// `Nₛ ‖ sessionId ‖ DER(pico ephemeral)` and
/// `mac = HMAC(pMacKey, DER(pico identity key))`.
pub struct PicoAuth;

impl PicoAuth {
    pub fn encode(session: &SessionState, extra_data: &[u8]) -> Result<Vec<u8>, SigmaError> {
        let keys = session.keys()?;
        let identity_secret = session
            .pico_identity_secret
            .as_ref()
            .ok_or(SigmaError::Incomplete("pico identity key"))?;
        let identity_public = session
            .pico_identity_public
            .as_ref()
            .ok_or(SigmaError::Incomplete("pico identity key"))?;

        let identity_der = crypto::public_key_der(identity_public)?;
        let signature = crypto::sign(identity_secret, &signed_content(session)?);
        let mac = crypto::generate_mac(&keys.p_mac, &identity_der);

        let mut inner = Buffer::new(256);
        inner.append_length_prepended(&identity_der);
        inner.append_length_prepended(&signature);
        inner.append_length_prepended(&mac);
        inner.append_length_prepended(extra_data);
        let (iv, encrypted) = encrypt_payload(&keys.p_enc, inner.as_slice())?;

        let mut envelope = Json::new();
        envelope.set_integer("sessionId", session.session_id as i64);
        envelope.set_string("iv", &iv);
        envelope.set_string("encryptedData", &encrypted);
        Ok(envelope.serialize().into_bytes())
    }

    /// Verifies the pico's proof of identity, records the proven key into
    /// the verifier's session and hands back the enclosed extra data. The
    /// caller decides afterwards whether that identity is authorized.
    pub fn decode(data: &[u8], session: &mut SessionState) -> Result<Vec<u8>, SigmaError> {
        let envelope = parse_envelope(data)?;
        check_session_id(&envelope, session.session_id)?;

        let keys = session.keys()?;
        let inner = decrypt_payload(&keys.p_enc, &envelope)?;
        let (identity_der, offset) = read_length_prepended(&inner, 0)?;
        let (signature, offset) = read_length_prepended(&inner, offset)?;
        let (mac, offset) = read_length_prepended(&inner, offset)?;
        let (extra_data, _) = read_length_prepended(&inner, offset)?;

        if crypto::generate_mac(&keys.p_mac, identity_der).as_slice() != mac {
            return Err(SigmaError::MacMismatch);
        }
        let identity = crypto::public_key_from_der(identity_der)?;
        if !crypto::verify(&identity, &signed_content(session)?, signature) {
            return Err(SigmaError::BadSignature);
        }

        session.pico_identity_public = Some(identity);
        Ok(extra_data.to_vec())
    }
}

// Nₛ ‖ sessionId ‖ DER(pico ephemeral)
fn signed_content(session: &SessionState) -> Result<Vec<u8>, SigmaError> {
    let pico_ephemeral = session
        .pico_ephemeral_public
        .as_ref()
        .ok_or(SigmaError::Incomplete("pico ephemeral key"))?;

    let mut content = Buffer::new(128);
    content.append(session.service_nonce.as_bytes());
    content.append(&session_id_bytes(session.session_id));
    content.append(&crypto::public_key_der(pico_ephemeral)?);
    Ok(content.into_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ServiceAuth, Start};

    fn authenticated_pair() -> (SessionState, SessionState) {
        let (service_identity, _) = crypto::generate_key_pair();
        let (pico_identity, _) = crypto::generate_key_pair();
        let mut pico = SessionState::for_pico(pico_identity, None);
        let mut service = SessionState::for_service(service_identity);
        Start::decode(&Start::encode(&pico).unwrap(), &mut service).unwrap();
        service.derive_keys().unwrap();
        ServiceAuth::decode(&ServiceAuth::encode(&service).unwrap(), &mut pico).unwrap();
        (service, pico)
    }

    #[test]
    fn round_trip_authenticates_the_pico_and_carries_extra_data() {
        let (mut service, pico) = authenticated_pair();
        let encoded = PicoAuth::encode(&pico, b"Test data").unwrap();
        let extra = PicoAuth::decode(&encoded, &mut service).unwrap();

        assert_eq!(extra, b"Test data");
        assert_eq!(service.pico_identity_public, pico.pico_identity_public);
    }

    #[test]
    fn empty_extra_data_is_carried_as_empty() {
        let (mut service, pico) = authenticated_pair();
        let encoded = PicoAuth::encode(&pico, b"").unwrap();
        assert_eq!(PicoAuth::decode(&encoded, &mut service).unwrap(), b"");
    }

    #[test]
    fn session_id_must_echo() {
        let (mut service, pico) = authenticated_pair();
        let mut wrong = SessionState::for_pico(
            crypto::generate_key_pair().0,
            None,
        );
        wrong.pico_ephemeral_public = pico.pico_ephemeral_public;
        wrong.pico_ephemeral_secret = pico.pico_ephemeral_secret.clone();
        wrong.pico_identity_secret = pico.pico_identity_secret.clone();
        wrong.pico_identity_public = pico.pico_identity_public;
        wrong.pico_nonce = pico.pico_nonce;
        wrong.service_nonce = pico.service_nonce;
        wrong.service_ephemeral_public = pico.service_ephemeral_public;
        wrong.session_id = pico.session_id.wrapping_add(1);
        wrong.derive_keys().unwrap();

        let encoded = PicoAuth::encode(&wrong, b"").unwrap();
        assert!(matches!(
            PicoAuth::decode(&encoded, &mut service),
            Err(SigmaError::SessionIdMismatch { .. })
        ));
    }

    #[test]
    fn signature_from_the_wrong_identity_key_still_verifies_as_that_key() {
        // the mac and signature are self-consistent for whatever identity
        // the pico presents; authorization is the caller's separate step
        let (mut service, mut pico) = authenticated_pair();
        let (other_identity, other_public) = crypto::generate_key_pair();
        pico.pico_identity_secret = Some(other_identity);
        pico.pico_identity_public = Some(other_public);

        let encoded = PicoAuth::encode(&pico, b"").unwrap();
        PicoAuth::decode(&encoded, &mut service).unwrap();
        assert_eq!(service.pico_identity_public, Some(other_public));
    }

    #[test]
    fn truncated_inner_payload_is_rejected() {
        let (mut service, pico) = authenticated_pair();

        // re-encrypt a payload that stops after the identity block
        let identity_der =
            crypto::public_key_der(pico.pico_identity_public.as_ref().unwrap()).unwrap();
        let mut inner = Buffer::new(128);
        inner.append_length_prepended(&identity_der);
        let keys = pico.keys().unwrap();
        let (iv, encrypted) = encrypt_payload(&keys.p_enc, inner.as_slice()).unwrap();
        let mut envelope = Json::new();
        envelope.set_integer("sessionId", pico.session_id as i64);
        envelope.set_string("iv", &iv);
        envelope.set_string("encryptedData", &encrypted);

        assert!(matches!(
            PicoAuth::decode(envelope.serialize().as_bytes(), &mut service),
            Err(SigmaError::Buffer(_))
        ));
    }
}
