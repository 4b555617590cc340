use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use common_types::Nonce;
use json::Json;

use super::{parse_envelope, require_string};
use crate::{SessionState, SigmaError};

// the only protocol revision this codec speaks
const PICO_VERSION: i64 = 2;

/// The opening message, prover to verifier, in the clear: the protocol
/// version, the pico's ephemeral public key and its nonce.
pub struct Start;

impl Start {
    pub fn encode(session: &SessionState) -> Result<Vec<u8>, SigmaError> {
        let ephemeral = session
            .pico_ephemeral_public
            .as_ref()
            .ok_or(SigmaError::Incomplete("pico ephemeral key"))?;
        let nonce = session
            .pico_nonce
            .as_ref()
            .ok_or(SigmaError::Incomplete("pico nonce"))?;

        let mut envelope = Json::new();
        envelope.set_integer("picoVersion", PICO_VERSION);
        envelope.set_string(
            "picoEphemeralPublicKey",
            &crypto::public_key_base64(ephemeral)?,
        );
        envelope.set_string("picoNonce", &BASE64.encode(nonce.as_bytes()));
        Ok(envelope.serialize().into_bytes())
    }

    /// Records the pico's ephemeral key and nonce into the verifier's
    /// session.
    pub fn decode(data: &[u8], session: &mut SessionState) -> Result<(), SigmaError> {
        let envelope = parse_envelope(data)?;

        let version = envelope.get_integer("picoVersion");
        if version != PICO_VERSION {
            return Err(SigmaError::UnsupportedVersion(version));
        }

        let ephemeral =
            crypto::public_key_from_base64(require_string(&envelope, "picoEphemeralPublicKey")?)?;
        let nonce = Nonce::from_bytes(&BASE64.decode(require_string(&envelope, "picoNonce")?)?)?;

        session.pico_ephemeral_public = Some(ephemeral);
        session.pico_nonce = Some(nonce);
        Ok(())
    }
}
