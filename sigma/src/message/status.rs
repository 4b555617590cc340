use common_types::{read_length_prepended, Buffer};
use json::Json;

use super::{check_session_id, decrypt_payload, encrypt_payload, parse_envelope};
use crate::{SessionState, SigmaError};

/// The verifier's verdict on the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// Authenticated; the session is complete.
    OkDone,
    /// Authenticated; the service expects the continuous loop next.
    OkContinue,
    /// The identity authenticated but is not authorized.
    Rejected,
}

impl StatusCode {
    pub fn to_byte(self) -> u8 {
        match self {
            StatusCode::OkDone => 0x00,
            StatusCode::OkContinue => 0x01,
            StatusCode::Rejected => 0x02,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, SigmaError> {
        match byte {
            0x00 => Ok(StatusCode::OkDone),
            0x01 => Ok(StatusCode::OkContinue),
            0x02 => Ok(StatusCode::Rejected),
            other => Err(SigmaError::InvalidStatus(other)),
        }
    }

    pub fn is_ok(self) -> bool {
        matches!(self, StatusCode::OkDone | StatusCode::OkContinue)
    }
}

/// The closing message of the initial run, verifier to prover: one status
/// byte and the service's extra data, encrypted under `vEncKey`.
pub struct Status;

impl Status {
    pub fn encode(
        session: &SessionState,
        code: StatusCode,
        extra_data: &[u8],
    ) -> Result<Vec<u8>, SigmaError> {
        let keys = session.keys()?;

        let mut inner = Buffer::new(64);
        inner.append(&[code.to_byte()]);
        inner.append_length_prepended(extra_data);
        let (iv, encrypted) = encrypt_payload(&keys.v_enc, inner.as_slice())?;

        let mut envelope = Json::new();
        envelope.set_integer("sessionId", session.session_id as i64);
        envelope.set_string("iv", &iv);
        envelope.set_string("encryptedData", &encrypted);
        Ok(envelope.serialize().into_bytes())
    }

    /// Records the status byte into the session and hands back the code
    /// and the enclosed extra data.
    pub fn decode(
        data: &[u8],
        session: &mut SessionState,
    ) -> Result<(StatusCode, Vec<u8>), SigmaError> {
        let envelope = parse_envelope(data)?;
        check_session_id(&envelope, session.session_id)?;

        let keys = session.keys()?;
        let inner = decrypt_payload(&keys.v_enc, &envelope)?;
        let (&code, rest_offset) = inner
            .split_first()
            .map(|(first, _)| (first, 1))
            .ok_or(SigmaError::Malformed("empty status payload"))?;
        let code = StatusCode::from_byte(code)?;
        let (extra_data, _) = read_length_prepended(&inner, rest_offset)?;

        session.status = Some(code);
        Ok((code, extra_data.to_vec()))
    }
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
    fn round_trip_records_the_status() {
        let (service, mut pico) = authenticated_pair();
        for code in [StatusCode::OkDone, StatusCode::OkContinue, StatusCode::Rejected] {
            let encoded = Status::encode(&service, code, b"123456").unwrap();
            let (decoded, extra) = Status::decode(&encoded, &mut pico).unwrap();
            assert_eq!(decoded, code);
            assert_eq!(extra, b"123456");
            assert_eq!(pico.status(), Some(code));
        }
    }

    #[test]
    fn unknown_status_byte_is_invalid() {
        assert!(matches!(
            StatusCode::from_byte(0x03),
            Err(SigmaError::InvalidStatus(0x03))
        ));
        assert!(StatusCode::from_byte(0x01).unwrap().is_ok());
        assert!(!StatusCode::from_byte(0x02).unwrap().is_ok());
    }

    #[test]
    fn status_under_the_wrong_key_is_rejected() {
        let (service, _) = authenticated_pair();
        let (other_service, mut other_pico) = authenticated_pair();
        let encoded = Status::encode(&service, StatusCode::OkDone, b"").unwrap();

        // make the session ids line up so only the keys differ
        let patched = String::from_utf8(encoded).unwrap().replace(
            &format!("\"sessionId\":{}", service.session_id()),
            &format!("\"sessionId\":{}", other_service.session_id()),
        );
        assert!(Status::decode(patched.as_bytes(), &mut other_pico).is_err());
    }
}
