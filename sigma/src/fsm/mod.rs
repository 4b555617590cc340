//! The protocol as two event-driven state machines, one per role. Hosts
//! supply the transport and timer through a callback trait and feed
//! events in (`read`, `connected`, `disconnected`, `timeout`); the
//! machines never block and never spawn.
//!
//! At most one timer is outstanding per machine; every `set_timeout`
//! call replaces the previous request, and a stale firing is ignored by
//! the state checks.

mod pico;
mod service;

pub use self::pico::{FsmPico, PicoHost, PicoState};
pub use self::service::{FsmService, ServiceHost, ServiceState};

use std::time::Duration;

// MESSAGE_TIMEOUT is how long either machine waits for the peer's next
// handshake message before treating the run as failed.
pub(crate) const MESSAGE_TIMEOUT: Duration = Duration::from_secs(30);
