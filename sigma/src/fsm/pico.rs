use std::time::Duration;

use channel::ChannelError;
use common_types::SequenceNumber;
use crypto::{PublicKey, SecretKey};

use super::MESSAGE_TIMEOUT;
use crate::continuous::ContinuousConfig;
use crate::message::{
    PicoAuth, PicoReAuth, ReauthState, ServiceAuth, ServiceReAuth, Start, Status, StatusCode,
};
use crate::session::{SessionState, SHARED_KEY_SIZE};
use crate::SigmaError;

/// The callbacks a host supplies to [`FsmPico`]. All run synchronously on
/// the host's task; none may re-enter the machine except through the
/// documented event entry points.
pub trait PicoHost {
    /// Queue one whole message on the transport.
    fn write(&mut self, message: &[u8]);
    /// Request the single outstanding timer; replaces any pending one.
    fn set_timeout(&mut self, timeout: Duration);
    /// Arm the transport for the next connection attempt.
    fn reconnect(&mut self);
    /// Tear the transport down.
    fn disconnect(&mut self);
    /// One-shot verdict after the Status message.
    fn authenticated(&mut self, status: StatusCode);
    /// The continuous loop terminated.
    fn session_ended(&mut self);
    /// Fired on every state transition.
    fn status_update(&mut self, state: PicoState);
    /// The machine hit an unrecoverable fault.
    fn error(&mut self);
}

/// Prover states. The name records how far the run has progressed: a
/// handshake state means that message has been sent (own) or is awaited
/// (peer's next).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PicoState {
    Start,
    ServiceAuth,
    PicoAuth,
    Status,
    Authenticated,
    ContStartPico,
    PicoReAuth,
    ServiceReAuth,
    Fin,
    Error,
}

/// The prover half of the protocol as an event-driven machine.
///
/// Timer use per state: `ServiceAuth`, `PicoAuth` and `PicoReAuth` wait
/// [`MESSAGE_TIMEOUT`] for the peer's reply; `ServiceReAuth` waits
/// `min(timeout, received - leeway)` — the verifier-announced round
/// window with the leeway off, clamped to the configured cadence —
/// before sending the next re-authentication message.
pub struct FsmPico<H: PicoHost> {
    host: H,
    state: PicoState,
    identity: SecretKey,
    expected_service: Option<PublicKey>,
    continuous: bool,
    config: ContinuousConfig,
    session: SessionState,
    extra_data_out: Vec<u8>,
    extra_data_in: Vec<u8>,
    local_sequence: SequenceNumber,
    remote_sequence: Option<SequenceNumber>,
    reauth_state: ReauthState,
    announced_timeout_ms: u32,
    error: Option<SigmaError>,
}

impl<H: PicoHost> FsmPico<H> {
    /// `continuous` asks the machine to run the re-authentication loop
    /// itself after an OK_CONTINUE status. Without it, a continuing
    /// session still ends in `Fin` but leaves the transport up for the
    /// host's own continuous driver.
    pub fn new(
        host: H,
        identity: SecretKey,
        expected_service: Option<PublicKey>,
        continuous: bool,
    ) -> Self {
        let config = ContinuousConfig::default();
        let session = SessionState::for_pico(identity.clone(), expected_service);
        FsmPico {
            host,
            state: PicoState::Start,
            identity,
            expected_service,
            continuous,
            config,
            session,
            extra_data_out: Vec::new(),
            extra_data_in: Vec::new(),
            local_sequence: SequenceNumber::random(),
            remote_sequence: None,
            reauth_state: ReauthState::Continue,
            announced_timeout_ms: config.active_timeout_ms,
            error: None,
        }
    }

    pub fn state(&self) -> PicoState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, PicoState::Fin | PicoState::Error)
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn shared_key(&self) -> Option<[u8; SHARED_KEY_SIZE]> {
        self.session.shared_key()
    }

    pub fn set_config(&mut self, config: ContinuousConfig) {
        self.config = config;
    }

    /// Attaches data to the next outbound message that can carry it (the
    /// authentication message, or the next re-authentication ping).
    pub fn set_outbound_extra_data(&mut self, data: Vec<u8>) {
        self.extra_data_out = data;
    }

    /// Data received with the last message that carried any.
    pub fn received_extra_data(&self) -> &[u8] {
        &self.extra_data_in
    }

    /// The state announced with subsequent re-authentication messages;
    /// lets the host pause and resume the session.
    pub fn set_reauth_state(&mut self, state: ReauthState) {
        self.reauth_state = state;
    }

    pub fn take_error(&mut self) -> Option<SigmaError> {
        self.error.take()
    }

    /// Kicks the machine off by asking the host to bring the transport
    /// up; the host answers with `connected`.
    pub fn start(&mut self) {
        log::debug!("pico fsm: starting");
        self.host.reconnect();
    }

    /// The transport is up. Sends the Start message of a fresh run.
    pub fn connected(&mut self) {
        if self.state != PicoState::Start {
            self.fail(SigmaError::UnexpectedMessage);
            return;
        }
        // ephemerals and nonce are per-run
        self.session = SessionState::for_pico(self.identity.clone(), self.expected_service);
        match Start::encode(&self.session) {
            Ok(message) => {
                self.host.write(&message);
                self.move_to(PicoState::ServiceAuth);
                self.host.set_timeout(MESSAGE_TIMEOUT);
            }
            Err(error) => self.fail(error),
        }
    }

    /// One whole message arrived from the transport.
    pub fn read(&mut self, message: &[u8]) {
        if let Err(error) = self.handle_read(message) {
            self.fail(error);
        }
    }

    fn handle_read(&mut self, message: &[u8]) -> Result<(), SigmaError> {
        match self.state {
            PicoState::ServiceAuth => {
                ServiceAuth::decode(message, &mut self.session)?;
                let extra = std::mem::take(&mut self.extra_data_out);
                let reply = PicoAuth::encode(&self.session, &extra)?;
                self.host.write(&reply);
                self.move_to(PicoState::PicoAuth);
                self.host.set_timeout(MESSAGE_TIMEOUT);
                Ok(())
            }
            PicoState::PicoAuth => {
                let (code, extra) = Status::decode(message, &mut self.session)?;
                self.extra_data_in = extra;
                self.move_to(PicoState::Status);
                self.deliver_status(code)
            }
            PicoState::PicoReAuth => {
                let shared_key = self
                    .session
                    .shared_key()
                    .ok_or(SigmaError::Incomplete("shared key"))?;
                let content = ServiceReAuth::decode(message, &shared_key)?;
                self.accept_remote_sequence(content.sequence)?;
                self.announced_timeout_ms = content.timeout_ms;
                self.extra_data_in = content.extra_data;
                self.move_to(PicoState::ServiceReAuth);
                match content.state {
                    ReauthState::Error => Err(SigmaError::SessionEnded),
                    ReauthState::Stop => {
                        self.end_session();
                        Ok(())
                    }
                    _ if self.reauth_state == ReauthState::Stop => {
                        self.end_session();
                        Ok(())
                    }
                    _ => {
                        // wait out the announced window, leeway deducted,
                        // never beyond the configured cadence
                        let ceiling = if content.state == ReauthState::Pause
                            || self.reauth_state == ReauthState::Pause
                        {
                            self.config.paused_timeout_ms
                        } else {
                            self.config.active_timeout_ms
                        };
                        let wait = ceiling.min(
                            self.announced_timeout_ms
                                .saturating_sub(self.config.timeout_leeway_ms),
                        );
                        self.host.set_timeout(Duration::from_millis(u64::from(wait)));
                        Ok(())
                    }
                }
            }
            _ => Err(SigmaError::UnexpectedMessage),
        }
    }

    fn deliver_status(&mut self, code: StatusCode) -> Result<(), SigmaError> {
        match code {
            StatusCode::Rejected => {
                self.host.authenticated(code);
                self.finish();
            }
            StatusCode::OkContinue if self.continuous => {
                self.move_to(PicoState::Authenticated);
                self.host.authenticated(code);
                self.move_to(PicoState::ContStartPico);
                self.send_reauth()?;
            }
            StatusCode::OkContinue => {
                // the host drives continuation itself; leave the
                // transport up for it
                self.move_to(PicoState::Authenticated);
                self.host.authenticated(code);
                self.move_to(PicoState::Fin);
            }
            StatusCode::OkDone => {
                self.move_to(PicoState::Authenticated);
                self.host.authenticated(code);
                self.finish();
            }
        }
        Ok(())
    }

    fn send_reauth(&mut self) -> Result<(), SigmaError> {
        let shared_key = self
            .session
            .shared_key()
            .ok_or(SigmaError::Incomplete("shared key"))?;
        let extra = std::mem::take(&mut self.extra_data_out);
        let ping = PicoReAuth::encode(
            &shared_key,
            self.session.session_id(),
            self.reauth_state,
            &self.local_sequence,
            &extra,
        )?;
        self.host.write(&ping);
        self.local_sequence.increment();
        self.move_to(PicoState::PicoReAuth);
        self.host.set_timeout(MESSAGE_TIMEOUT);
        Ok(())
    }

    /// The host's timer fired.
    pub fn timeout(&mut self) {
        match self.state {
            PicoState::ServiceAuth | PicoState::PicoAuth | PicoState::PicoReAuth => {
                log::warn!("pico fsm: timed out in {:?}", self.state);
                self.fail(SigmaError::Channel(ChannelError::Timeout));
            }
            PicoState::ServiceReAuth => {
                // the inter-round wait elapsed; drive the next round
                if let Err(error) = self.send_reauth() {
                    self.fail(error);
                }
            }
            // a stale timer
            _ => {}
        }
    }

    /// The transport dropped.
    pub fn disconnected(&mut self) {
        match self.state {
            PicoState::Fin | PicoState::Error => {}
            PicoState::ContStartPico | PicoState::PicoReAuth | PicoState::ServiceReAuth => {
                self.host.session_ended();
                self.move_to(PicoState::Fin);
            }
            _ => self.fail(SigmaError::Channel(ChannelError::Closed)),
        }
    }

    /// Drives the machine to `Fin`, sending the final STOP
    /// re-authentication message when a continuous session is live.
    pub fn stop(&mut self) {
        match self.state {
            PicoState::Fin | PicoState::Error => {}
            PicoState::ContStartPico | PicoState::PicoReAuth | PicoState::ServiceReAuth => {
                self.reauth_state = ReauthState::Stop;
                if let Some(shared_key) = self.session.shared_key() {
                    let extra = std::mem::take(&mut self.extra_data_out);
                    if let Ok(message) = PicoReAuth::encode(
                        &shared_key,
                        self.session.session_id(),
                        ReauthState::Stop,
                        &self.local_sequence,
                        &extra,
                    ) {
                        self.host.write(&message);
                        self.local_sequence.increment();
                    }
                }
                self.host.session_ended();
                self.finish();
            }
            _ => self.finish(),
        }
    }

    fn accept_remote_sequence(&mut self, received: SequenceNumber) -> Result<(), SigmaError> {
        if let Some(expected) = &self.remote_sequence {
            if &received != expected {
                return Err(SigmaError::SequenceMismatch);
            }
        }
        self.remote_sequence = Some(received.next_expected());
        Ok(())
    }

    fn end_session(&mut self) {
        self.host.session_ended();
        self.finish();
    }

    fn finish(&mut self) {
        self.move_to(PicoState::Fin);
        self.host.disconnect();
    }

    fn fail(&mut self, error: SigmaError) {
        log::warn!("pico fsm: {}", error);
        self.error = Some(error);
        self.move_to(PicoState::Error);
        self.host.error();
        self.host.disconnect();
    }

    fn move_to(&mut self, state: PicoState) {
        if self.state != state {
            log::trace!("pico fsm: {:?} -> {:?}", self.state, state);
            self.state = state;
            self.host.status_update(state);
        }
    }
}
