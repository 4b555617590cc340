#![forbid(unsafe_code)]

//! Server-side core of the Pico authentication and pairing system.
//!
//! The protocol machinery lives in the member crates, re-exported here:
//! [`sigma`] holds the SIGMA-I exchange, its event-driven state machines
//! and the continuous re-authentication loop; [`channel`] the transport
//! abstraction; [`users`] the authorized-user store; [`crypto`], [`json`]
//! and [`common_types`] the primitives underneath. This crate adds the
//! pieces a deployment needs around them: the QR payloads displayed at
//! session bootstrap and the service identity key handling.

pub mod pairing;
pub mod qr;

pub use channel;
pub use common_types;
pub use crypto;
pub use json;
pub use sigma;
pub use users;

pub use self::pairing::{load_or_generate_service_identity, PairingError};
pub use self::qr::{KeyAuth, KeyPairing, QrError};
