use common_types::Nonce;
use crypto::{PublicKey, SecretKey};
use rand::RngCore;

use super::kdf::KeyDerivation;
use super::message::StatusCode;
use super::SigmaError;

/// SHARED_KEY_SIZE is the length in bytes of the session key that
/// survives the initial run and protects the continuous loop.
pub const SHARED_KEY_SIZE: usize = 16;

/// The five keys both sides derive from the ephemeral ECDH secret and the
/// two nonces, in the extraction order fixed by the protocol.
#[derive(Clone)]
pub struct SessionKeys {
    pub p_mac: [u8; 32],
    pub p_enc: [u8; 16],
    pub v_mac: [u8; 32],
    pub v_enc: [u8; 16],
    pub shared: [u8; SHARED_KEY_SIZE],
}

/// The working set of one protocol run: identity and ephemeral key pairs
/// for both roles (a side holds the private half only of its own keys),
/// both nonces, the session id, the derived keys and the last status
/// byte.
///
/// Ephemeral keys are generated fresh per run. The state owns a long-term
/// private key, so it is deliberately not `Clone`; exactly one side of
/// the exchange owns an instance at a time.
pub struct SessionState {
    pub(crate) service_identity_secret: Option<SecretKey>,
    pub(crate) service_identity_public: Option<PublicKey>,
    pub(crate) pico_identity_secret: Option<SecretKey>,
    pub(crate) pico_identity_public: Option<PublicKey>,

    pub(crate) service_ephemeral_secret: Option<SecretKey>,
    pub(crate) service_ephemeral_public: Option<PublicKey>,
    pub(crate) pico_ephemeral_secret: Option<SecretKey>,
    pub(crate) pico_ephemeral_public: Option<PublicKey>,

    pub(crate) service_nonce: Nonce,
    pub(crate) pico_nonce: Option<Nonce>,
    pub(crate) session_id: u32,

    pub(crate) keys: Option<SessionKeys>,
    pub(crate) status: Option<StatusCode>,
}

impl SessionState {
    /// The verifier's working set: its identity key pair, a fresh
    /// ephemeral pair, a fresh nonce and a fresh session id. The pico
    /// halves fill in as its messages arrive.
    pub fn for_service(identity: SecretKey) -> SessionState {
        let identity_public = identity.public_key();
        let (ephemeral_secret, ephemeral_public) = crypto::generate_key_pair();
        SessionState {
            service_identity_secret: Some(identity),
            service_identity_public: Some(identity_public),
            pico_identity_secret: None,
            pico_identity_public: None,
            service_ephemeral_secret: Some(ephemeral_secret),
            service_ephemeral_public: Some(ephemeral_public),
            pico_ephemeral_secret: None,
            pico_ephemeral_public: None,
            service_nonce: Nonce::random(),
            pico_nonce: None,
            session_id: rand::rngs::OsRng.next_u32(),
            keys: None,
            status: None,
        }
    }

    /// The prover's working set. `expected_service_identity` is the
    /// service key learned out of band (from the displayed code); when
    /// present, the key the service proves ownership of must match it.
    pub fn for_pico(
        identity: SecretKey,
        expected_service_identity: Option<PublicKey>,
    ) -> SessionState {
        let identity_public = identity.public_key();
        let (ephemeral_secret, ephemeral_public) = crypto::generate_key_pair();
        SessionState {
            service_identity_secret: None,
            service_identity_public: expected_service_identity,
            pico_identity_secret: Some(identity),
            pico_identity_public: Some(identity_public),
            service_ephemeral_secret: None,
            service_ephemeral_public: None,
            pico_ephemeral_secret: Some(ephemeral_secret),
            pico_ephemeral_public: Some(ephemeral_public),
            // overwritten by the nonce the service announces
            service_nonce: Nonce::random(),
            pico_nonce: Some(Nonce::random()),
            session_id: 0,
            keys: None,
            status: None,
        }
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    /// The last status byte received, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// The identity key the pico proved ownership of; the verifier's
    /// authorization decision runs over this.
    pub fn pico_identity_public(&self) -> Option<&PublicKey> {
        self.pico_identity_public.as_ref()
    }

    pub fn service_identity_public(&self) -> Option<&PublicKey> {
        self.service_identity_public.as_ref()
    }

    /// The key that outlives the run and protects continuous
    /// re-authentication.
    pub fn shared_key(&self) -> Option<[u8; SHARED_KEY_SIZE]> {
        self.keys.as_ref().map(|keys| keys.shared)
    }

    pub(crate) fn keys(&self) -> Result<&SessionKeys, SigmaError> {
        self.keys.as_ref().ok_or(SigmaError::Incomplete("derived keys"))
    }

    /// Derives the five session keys. Legal exactly when both ephemeral
    /// public halves and both nonces are known; a second call is a no-op.
    pub fn derive_keys(&mut self) -> Result<(), SigmaError> {
        if self.keys.is_some() {
            return Ok(());
        }

        let shared_secret = match (
            &self.service_ephemeral_secret,
            &self.pico_ephemeral_public,
            &self.pico_ephemeral_secret,
            &self.service_ephemeral_public,
        ) {
            (Some(secret), Some(peer), _, _) => crypto::ecdh_shared_secret(secret, peer),
            (_, _, Some(secret), Some(peer)) => crypto::ecdh_shared_secret(secret, peer),
            _ => return Err(SigmaError::Incomplete("ephemeral keys")),
        };
        let pico_nonce = self
            .pico_nonce
            .as_ref()
            .ok_or(SigmaError::Incomplete("pico nonce"))?;

        let mut kdf = KeyDerivation::new(&shared_secret, pico_nonce, &self.service_nonce);
        self.keys = Some(SessionKeys {
            p_mac: kdf.next_key_256(),
            p_enc: kdf.next_key_128(),
            v_mac: kdf.next_key_256(),
            v_enc: kdf.next_key_128(),
            shared: kdf.next_key_128(),
        });
        log::debug!("session {:08x}: derived session keys", self.session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_sides_derive_the_same_keys() {
        let (service_identity, _) = crypto::generate_key_pair();
        let (pico_identity, _) = crypto::generate_key_pair();

        let mut service = SessionState::for_service(service_identity);
        let mut pico = SessionState::for_pico(pico_identity, None);

        // exchange the ephemeral halves and nonces as the messages would
        service.pico_ephemeral_public = pico.pico_ephemeral_public;
        service.pico_nonce = pico.pico_nonce;
        pico.service_ephemeral_public = service.service_ephemeral_public;
        pico.service_nonce = service.service_nonce;

        service.derive_keys().unwrap();
        pico.derive_keys().unwrap();

        let left = service.keys().unwrap();
        let right = pico.keys().unwrap();
        assert_eq!(left.p_mac, right.p_mac);
        assert_eq!(left.p_enc, right.p_enc);
        assert_eq!(left.v_mac, right.v_mac);
        assert_eq!(left.v_enc, right.v_enc);
        assert_eq!(left.shared, right.shared);
    }

    #[test]
    fn derivation_requires_the_peer_half() {
        let (identity, _) = crypto::generate_key_pair();
        let mut service = SessionState::for_service(identity);
        assert!(service.derive_keys().is_err());
        assert!(service.keys().is_err());
    }

    #[test]
    fn ephemeral_keys_are_fresh_per_run() {
        let (identity, _) = crypto::generate_key_pair();
        let first = SessionState::for_service(identity.clone());
        let second = SessionState::for_service(identity);
        assert_ne!(
            first.service_ephemeral_public,
            second.service_ephemeral_public
        );
        assert_ne!(first.service_nonce, second.service_nonce);
    }
}
