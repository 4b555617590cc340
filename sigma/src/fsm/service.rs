use std::time::Duration;

use channel::ChannelError;
use common_types::SequenceNumber;
use crypto::SecretKey;
use users::UserStore;

use super::MESSAGE_TIMEOUT;
use crate::continuous::ContinuousConfig;
use crate::message::{PicoAuth, PicoReAuth, ReauthState, ServiceAuth, ServiceReAuth, Start, Status, StatusCode};
use crate::session::{SessionState, SHARED_KEY_SIZE};
use crate::SigmaError;

/// The callbacks a host supplies to [`FsmService`]. The shape mirrors
/// [`PicoHost`](super::PicoHost), with `listen` in place of `reconnect`.
pub trait ServiceHost {
    fn write(&mut self, message: &[u8]);
    fn set_timeout(&mut self, timeout: Duration);
    /// Re-arm the transport for the next incoming connection.
    fn listen(&mut self);
    fn disconnect(&mut self);
    fn authenticated(&mut self, status: StatusCode);
    fn session_ended(&mut self);
    fn status_update(&mut self, state: ServiceState);
    fn error(&mut self);
}

/// Verifier states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Connect,
    Start,
    ServiceAuth,
    PicoAuth,
    Status,
    Authenticated,
    AuthFailed,
    ContStartPico,
    PicoReAuth,
    ServiceReAuth,
    Fin,
    Error,
}

/// The verifier half of the protocol as an event-driven machine.
///
/// Timer use per state: `Start` waits [`MESSAGE_TIMEOUT`] for a prover to
/// open, and on expiry re-arms the listen socket instead of failing;
/// `ServiceAuth` waits [`MESSAGE_TIMEOUT`] for the authentication
/// message; the continuous states wait out the announced round window
/// plus leeway, degrade once from the active to the paused cadence on a
/// missed round, and fail after that.
///
/// Authorization: a machine built with no user store admits every
/// identity that completes the protocol (pairing mode); an empty store
/// admits none.
pub struct FsmService<'u, H: ServiceHost> {
    host: H,
    state: ServiceState,
    identity: SecretKey,
    users: Option<&'u UserStore>,
    continuous: bool,
    config: ContinuousConfig,
    session: SessionState,
    extra_data_out: Vec<u8>,
    extra_data_in: Vec<u8>,
    authenticated_user: Option<String>,
    local_sequence: SequenceNumber,
    remote_sequence: Option<SequenceNumber>,
    reauth_state: ReauthState,
    error: Option<SigmaError>,
}

impl<'u, H: ServiceHost> FsmService<'u, H> {
    pub fn new(
        host: H,
        identity: SecretKey,
        users: Option<&'u UserStore>,
        continuous: bool,
    ) -> Self {
        let session = SessionState::for_service(identity.clone());
        FsmService {
            host,
            state: ServiceState::Connect,
            identity,
            users,
            continuous,
            config: ContinuousConfig::default(),
            session,
            extra_data_out: Vec::new(),
            extra_data_in: Vec::new(),
            authenticated_user: None,
            local_sequence: SequenceNumber::random(),
            remote_sequence: None,
            reauth_state: ReauthState::Continue,
            error: None,
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, ServiceState::Fin | ServiceState::Error)
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

    /// The store entry name the authenticated identity matched, when the
    /// machine was built with a store.
    pub fn authenticated_user(&self) -> Option<&str> {
        self.authenticated_user.as_deref()
    }

    pub fn set_config(&mut self, config: ContinuousConfig) {
        self.config = config;
    }

    /// Attaches data to the next outbound message that can carry it (the
    /// Status verdict, or the next re-authentication answer).
    pub fn set_outbound_extra_data(&mut self, data: Vec<u8>) {
        self.extra_data_out = data;
    }

    pub fn received_extra_data(&self) -> &[u8] {
        &self.extra_data_in
    }

    /// The state announced with subsequent re-authentication answers.
    pub fn set_reauth_state(&mut self, state: ReauthState) {
        self.reauth_state = state;
    }

    pub fn take_error(&mut self) -> Option<SigmaError> {
        self.error.take()
    }

    /// Kicks the machine off by asking the host to listen; the host
    /// answers with `connected` when a prover opens the channel.
    pub fn start(&mut self) {
        log::debug!("service fsm: listening");
        self.host.listen();
    }

    /// A prover connected. Starts a fresh run.
    pub fn connected(&mut self) {
        if self.state != ServiceState::Connect {
            self.fail(SigmaError::UnexpectedMessage);
            return;
        }
        self.session = SessionState::for_service(self.identity.clone());
        self.remote_sequence = None;
        self.move_to(ServiceState::Start);
        self.host.set_timeout(MESSAGE_TIMEOUT);
    }

    /// One whole message arrived from the transport.
    pub fn read(&mut self, message: &[u8]) {
        if let Err(error) = self.handle_read(message) {
            self.fail(error);
        }
    }

    fn handle_read(&mut self, message: &[u8]) -> Result<(), SigmaError> {
        match self.state {
            ServiceState::Start => {
                Start::decode(message, &mut self.session)?;
                self.session.derive_keys()?;
                let reply = ServiceAuth::encode(&self.session)?;
                self.host.write(&reply);
                self.move_to(ServiceState::ServiceAuth);
                self.host.set_timeout(MESSAGE_TIMEOUT);
                Ok(())
            }
            ServiceState::ServiceAuth => {
                let extra = PicoAuth::decode(message, &mut self.session)?;
                self.extra_data_in = extra;
                self.move_to(ServiceState::PicoAuth);
                self.deliver_verdict()
            }
            ServiceState::ContStartPico | ServiceState::ServiceReAuth => {
                let shared_key = self
                    .session
                    .shared_key()
                    .ok_or(SigmaError::Incomplete("shared key"))?;
                let content = PicoReAuth::decode(message, &shared_key)?;
                self.accept_remote_sequence(content.sequence)?;
                self.extra_data_in = content.extra_data;
                self.move_to(ServiceState::PicoReAuth);
                if content.state == ReauthState::Error {
                    return Err(SigmaError::SessionEnded);
                }

                let timeout = self.round_timeout_ms();
                let extra = std::mem::take(&mut self.extra_data_out);
                let reply = ServiceReAuth::encode(
                    &shared_key,
                    self.session.session_id(),
                    self.reauth_state,
                    timeout,
                    &self.local_sequence,
                    &extra,
                )?;
                self.host.write(&reply);
                self.local_sequence.increment();
                self.move_to(ServiceState::ServiceReAuth);

                if content.state == ReauthState::Stop || self.reauth_state == ReauthState::Stop {
                    self.end_session();
                } else {
                    let wait = timeout + self.config.timeout_leeway_ms;
                    self.host.set_timeout(Duration::from_millis(u64::from(wait)));
                }
                Ok(())
            }
            _ => Err(SigmaError::UnexpectedMessage),
        }
    }

    // the authorization decision and the Status verdict that announces it
    fn deliver_verdict(&mut self) -> Result<(), SigmaError> {
        let mut user_name = None;
        let admitted = match self.users {
            // no list at all: pairing mode, admit any proven identity
            None => true,
            Some(store) => {
                let identity = self
                    .session
                    .pico_identity_public()
                    .ok_or(SigmaError::Incomplete("pico identity"))?;
                match store.find_by_public_key(identity) {
                    Some(entry) => {
                        user_name = Some(entry.name().to_owned());
                        true
                    }
                    None => false,
                }
            }
        };

        let code = if admitted {
            if self.continuous {
                StatusCode::OkContinue
            } else {
                StatusCode::OkDone
            }
        } else {
            StatusCode::Rejected
        };

        let extra = std::mem::take(&mut self.extra_data_out);
        let reply = Status::encode(&self.session, code, &extra)?;
        self.host.write(&reply);
        self.move_to(ServiceState::Status);

        if admitted {
            log::info!(
                "session {:08x}: authenticated{}",
                self.session.session_id(),
                user_name.as_deref().map(|name| format!(" as {:?}", name)).unwrap_or_default()
            );
            self.authenticated_user = user_name;
            self.move_to(ServiceState::Authenticated);
            self.host.authenticated(code);
            if self.continuous {
                self.move_to(ServiceState::ContStartPico);
                // the first ping is due within one active window
                let wait = self.config.active_timeout_ms + self.config.timeout_leeway_ms;
                self.host.set_timeout(Duration::from_millis(u64::from(wait)));
            } else {
                self.finish();
            }
        } else {
            log::info!(
                "session {:08x}: identity not authorized",
                self.session.session_id()
            );
            self.move_to(ServiceState::AuthFailed);
            self.host.authenticated(StatusCode::Rejected);
            self.finish();
        }
        Ok(())
    }

    /// The host's timer fired.
    pub fn timeout(&mut self) {
        match self.state {
            ServiceState::Start => {
                // nobody turned up; go back to listening
                self.move_to(ServiceState::Connect);
                self.host.listen();
            }
            ServiceState::ServiceAuth => {
                log::warn!("service fsm: timed out waiting for authentication");
                self.fail(SigmaError::Channel(ChannelError::Timeout));
            }
            ServiceState::ContStartPico | ServiceState::ServiceReAuth => {
                if self.reauth_state == ReauthState::Continue {
                    // missed a round: degrade to the paused cadence once
                    log::debug!("service fsm: missed reauth round, pausing");
                    self.reauth_state = ReauthState::Pause;
                    let wait = self.config.paused_timeout_ms + self.config.timeout_leeway_ms;
                    self.host.set_timeout(Duration::from_millis(u64::from(wait)));
                } else {
                    self.fail(SigmaError::Channel(ChannelError::Timeout));
                }
            }
            _ => {}
        }
    }

    /// The transport dropped.
    pub fn disconnected(&mut self) {
        match self.state {
            ServiceState::Fin | ServiceState::Error => {}
            ServiceState::ContStartPico | ServiceState::PicoReAuth | ServiceState::ServiceReAuth => {
                self.host.session_ended();
                self.move_to(ServiceState::Fin);
            }
            _ => self.fail(SigmaError::Channel(ChannelError::Closed)),
        }
    }

    /// Drives the machine to `Fin`. A live continuous session is reported
    /// ended; no unsolicited message is sent, the loop being
    /// prover-driven.
    pub fn stop(&mut self) {
        match self.state {
            ServiceState::Fin | ServiceState::Error => {}
            ServiceState::ContStartPico | ServiceState::PicoReAuth | ServiceState::ServiceReAuth => {
                self.reauth_state = ReauthState::Stop;
                self.host.session_ended();
                self.finish();
            }
            _ => self.finish(),
        }
    }

    fn round_timeout_ms(&self) -> u32 {
        match self.reauth_state {
            ReauthState::Pause => self.config.paused_timeout_ms,
            _ => self.config.active_timeout_ms,
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
        self.move_to(ServiceState::Fin);
        self.host.disconnect();
    }

    fn fail(&mut self, error: SigmaError) {
        log::warn!("service fsm: {}", error);
        self.error = Some(error);
        self.move_to(ServiceState::Error);
        self.host.error();
        self.host.disconnect();
    }

    fn move_to(&mut self, state: ServiceState) {
        if self.state != state {
            log::trace!("service fsm: {:?} -> {:?}", self.state, state);
            self.state = state;
            self.host.status_update(state);
        }
    }
}
