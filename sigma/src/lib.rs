#![forbid(unsafe_code)]

//! The SIGMA-I protocol core: the per-run session state, the key
//! derivation both sides perform, the six message codecs, the
//! event-driven prover and verifier state machines, the blocking drivers
//! layered on them, and the continuous re-authentication loop that keeps
//! a session alive after the initial run.

mod continuous;
mod fsm;
mod kdf;
pub mod message;
mod session;
mod sync;

pub use self::continuous::{Continuous, ContinuousConfig};
pub use self::fsm::{FsmPico, FsmService, PicoHost, PicoState, ServiceHost, ServiceState};
pub use self::kdf::KeyDerivation;
pub use self::message::{ReauthState, StatusCode};
pub use self::session::{SessionKeys, SessionState, SHARED_KEY_SIZE};
pub use self::sync::{prove, verify, ProverOutcome, VerifierOutcome};

use common_types::{BufferError, WrongLength};
use crypto::CryptoError;
use json::JsonError;

#[derive(Debug, thiserror::Error)]
pub enum SigmaError {
    #[error("buffer: {0}")]
    Buffer(#[from] BufferError),
    #[error("json: {0}")]
    Json(#[from] JsonError),
    #[error("crypto: {0}")]
    Crypto(#[from] CryptoError),
    #[error("channel: {0}")]
    Channel(#[from] channel::ChannelError),
    #[error("field length: {0}")]
    Length(#[from] WrongLength),
    #[error("base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("message is missing field {0:?}")]
    MissingField(&'static str),
    #[error("malformed message: {0}")]
    Malformed(&'static str),
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(i64),
    #[error("session id {received} does not match {expected}")]
    SessionIdMismatch { received: u32, expected: u32 },
    #[error("session state is missing {0}")]
    Incomplete(&'static str),
    #[error("mac verification failed")]
    MacMismatch,
    #[error("signature verification failed")]
    BadSignature,
    #[error("service identity key does not match the expected key")]
    WrongServiceIdentity,
    #[error("status byte {0:#04x} is not valid")]
    InvalidStatus(u8),
    #[error("reauth state byte {0:#04x} is not valid")]
    InvalidReauthState(u8),
    #[error("sequence number mismatch")]
    SequenceMismatch,
    #[error("the continuous session has ended")]
    SessionEnded,
    #[error("unexpected message in the current state")]
    UnexpectedMessage,
}
