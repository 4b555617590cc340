//! Blocking, straight-line drivers for the two state machines. A host
//! recorder gathers the callbacks; the drivers replay them against a
//! channel, feed channel reads and timeouts back in as events, and block
//! until the run settles.

use std::time::Duration;

use channel::{Channel, ChannelError};
use crypto::{PublicKey, SecretKey};
use users::UserStore;

use super::fsm::{FsmPico, FsmService, PicoHost, PicoState, ServiceHost, ServiceState};
use super::message::StatusCode;
use super::session::SHARED_KEY_SIZE;
use super::SigmaError;

/// Records the machine's callbacks between events.
#[derive(Default)]
struct SyncHost {
    outbox: Vec<Vec<u8>>,
    timeout: Option<Duration>,
    want_open: bool,
    want_close: bool,
    status: Option<StatusCode>,
    errored: bool,
}

impl SyncHost {
    /// Replays the recorded transport requests onto the channel.
    fn flush<C: Channel>(&mut self, channel: &mut C) -> Result<(), SigmaError> {
        if std::mem::take(&mut self.want_open) {
            channel.open()?;
        }
        for message in self.outbox.drain(..) {
            channel.write(&message)?;
        }
        if std::mem::take(&mut self.want_close) {
            channel.close()?;
        }
        Ok(())
    }
}

impl PicoHost for SyncHost {
    fn write(&mut self, message: &[u8]) {
        self.outbox.push(message.to_vec());
    }
    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }
    fn reconnect(&mut self) {
        self.want_open = true;
    }
    fn disconnect(&mut self) {
        self.want_close = true;
    }
    fn authenticated(&mut self, status: StatusCode) {
        self.status = Some(status);
    }
    fn session_ended(&mut self) {}
    fn status_update(&mut self, state: PicoState) {
        log::trace!("prover -> {:?}", state);
    }
    fn error(&mut self) {
        self.errored = true;
    }
}

impl ServiceHost for SyncHost {
    fn write(&mut self, message: &[u8]) {
        self.outbox.push(message.to_vec());
    }
    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }
    fn listen(&mut self) {
        self.want_open = true;
    }
    fn disconnect(&mut self) {
        self.want_close = true;
    }
    fn authenticated(&mut self, status: StatusCode) {
        self.status = Some(status);
    }
    fn session_ended(&mut self) {}
    fn status_update(&mut self, state: ServiceState) {
        log::trace!("verifier -> {:?}", state);
    }
    fn error(&mut self) {
        self.errored = true;
    }
}

/// What a completed prover run yielded.
pub struct ProverOutcome {
    /// The verifier's verdict.
    pub status: StatusCode,
    /// Extra data enclosed with the Status message.
    pub extra_data: Vec<u8>,
    /// The key protecting a continuous session, when the verdict allows
    /// one.
    pub shared_key: Option<[u8; SHARED_KEY_SIZE]>,
    pub session_id: u32,
}

/// What a completed verifier run yielded.
pub struct VerifierOutcome {
    /// Whether the identity authenticated *and* was authorized.
    pub authenticated: bool,
    /// The matched store entry, when a store was consulted.
    pub user: Option<String>,
    /// Extra data enclosed with the authentication message.
    pub extra_data: Vec<u8>,
    pub shared_key: Option<[u8; SHARED_KEY_SIZE]>,
    pub session_id: u32,
}

/// Runs the prover side of one authentication over `channel`, blocking
/// until the Status verdict arrives. On OK_CONTINUE the channel is left
/// open and the shared key returned, ready for a
/// [`Continuous`](crate::Continuous) session.
pub fn prove<C: Channel>(
    channel: &mut C,
    identity: &SecretKey,
    expected_service: Option<&PublicKey>,
    extra_data: &[u8],
) -> Result<ProverOutcome, SigmaError> {
    let mut fsm = FsmPico::new(
        SyncHost::default(),
        identity.clone(),
        expected_service.copied(),
        false,
    );
    fsm.set_outbound_extra_data(extra_data.to_vec());

    fsm.start();
    fsm.host_mut().flush(channel)?;
    fsm.connected();

    while !fsm.is_finished() {
        fsm.host_mut().flush(channel)?;
        if fsm.is_finished() {
            break;
        }
        if let Some(timeout) = fsm.host_mut().timeout.take() {
            channel.set_timeout(timeout);
        }
        match channel.read() {
            Ok(message) => fsm.read(&message),
            Err(ChannelError::Timeout) => fsm.timeout(),
            Err(error) => return Err(error.into()),
        }
    }
    fsm.host_mut().flush(channel)?;

    if fsm.state() == PicoState::Error || fsm.host().errored {
        return Err(fsm.take_error().unwrap_or(SigmaError::UnexpectedMessage));
    }
    let status = fsm
        .host()
        .status
        .ok_or(SigmaError::UnexpectedMessage)?;
    Ok(ProverOutcome {
        status,
        extra_data: fsm.received_extra_data().to_vec(),
        shared_key: if status == StatusCode::OkContinue {
            fsm.shared_key()
        } else {
            None
        },
        session_id: fsm.session().session_id(),
    })
}

/// Runs the verifier side of one authentication over `channel`, blocking
/// until the Status verdict has been sent.
///
/// `authorized_users` of `None` admits any identity that completes the
/// protocol (pairing mode); an empty store admits none. On an
/// unauthorized identity the REJECTED verdict is still sent and the
/// outcome reports `authenticated: false`. With `continuous` the verdict
/// is OK_CONTINUE and the channel is left open for a
/// [`Continuous`](crate::Continuous) session under the returned shared
/// key.
pub fn verify<C: Channel>(
    channel: &mut C,
    identity: &SecretKey,
    authorized_users: Option<&UserStore>,
    extra_data: &[u8],
    continuous: bool,
) -> Result<VerifierOutcome, SigmaError> {
    let mut fsm = FsmService::new(
        SyncHost::default(),
        identity.clone(),
        authorized_users,
        continuous,
    );
    fsm.set_outbound_extra_data(extra_data.to_vec());

    fsm.start();
    fsm.host_mut().flush(channel)?;
    fsm.connected();

    // the blocking verifier hands a continuing session off to the
    // caller, so ContStartPico is a settled state here
    let settled = |state: ServiceState| {
        matches!(
            state,
            ServiceState::Fin | ServiceState::Error | ServiceState::ContStartPico
        )
    };

    while !settled(fsm.state()) {
        fsm.host_mut().flush(channel)?;
        if settled(fsm.state()) {
            break;
        }
        if let Some(timeout) = fsm.host_mut().timeout.take() {
            channel.set_timeout(timeout);
        }
        match channel.read() {
            Ok(message) => fsm.read(&message),
            Err(ChannelError::Timeout) => fsm.timeout(),
            Err(error) => return Err(error.into()),
        }
        if fsm.state() == ServiceState::Connect {
            // the machine re-armed the listen socket
            fsm.host_mut().flush(channel)?;
            fsm.connected();
        }
    }
    fsm.host_mut().flush(channel)?;

    if fsm.state() == ServiceState::Error || fsm.host().errored {
        return Err(fsm.take_error().unwrap_or(SigmaError::UnexpectedMessage));
    }
    let status = fsm
        .host()
        .status
        .ok_or(SigmaError::UnexpectedMessage)?;
    let authenticated = status.is_ok();
    Ok(VerifierOutcome {
        authenticated,
        user: fsm.authenticated_user().map(str::to_owned),
        extra_data: fsm.received_extra_data().to_vec(),
        shared_key: if authenticated && continuous {
            fsm.shared_key()
        } else {
            None
        },
        session_id: fsm.session().session_id(),
    })
}
