use std::time::Duration;

use channel::Channel;
use common_types::SequenceNumber;

use super::message::{PicoReAuth, ReauthState, ServiceReAuth};
use super::session::SHARED_KEY_SIZE;
use super::SigmaError;

/// Timing of the continuous loop, in milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct ContinuousConfig {
    /// Inter-round wait while the session is in CONTINUE.
    pub active_timeout_ms: u32,
    /// Inter-round wait while the session is in PAUSE.
    pub paused_timeout_ms: u32,
    /// The prover-side wait is `min(timeout, received - leeway)`: this
    /// comes off the verifier-announced value, and the result is clamped
    /// to the configured cadence, so the next round lands inside the
    /// window.
    pub timeout_leeway_ms: u32,
}

impl Default for ContinuousConfig {
    fn default() -> Self {
        ContinuousConfig {
            active_timeout_ms: 10_000,
            paused_timeout_ms: 50_000,
            timeout_leeway_ms: 1_000,
        }
    }
}

/// A continuous re-authentication session over a channel that survived
/// the initial run. Both sides hold one, wrapped around the shared key
/// and their two sequence numbers, and ping-pong until either announces
/// STOP or an error ends the loop.
///
/// The prover drives rounds with [`continue_round`]; the verifier answers
/// them with [`serve_round`]. Each side's own sequence number increments
/// at send time; the stored copy of the peer's number is set from a
/// validated message and incremented once, becoming the value expected
/// next.
///
/// [`continue_round`]: Continuous::continue_round
/// [`serve_round`]: Continuous::serve_round
pub struct Continuous<C: Channel> {
    channel: C,
    shared_key: [u8; SHARED_KEY_SIZE],
    session_id: u32,
    config: ContinuousConfig,
    state: ReauthState,
    peer_state: ReauthState,
    local_sequence: SequenceNumber,
    remote_sequence: Option<SequenceNumber>,
    announced_timeout_ms: u32,
    received_extra_data: Vec<u8>,
    finished: bool,
}

impl<C: Channel> Continuous<C> {
    pub fn new(channel: C, shared_key: [u8; SHARED_KEY_SIZE]) -> Self {
        let config = ContinuousConfig::default();
        Continuous {
            channel,
            shared_key,
            session_id: 0,
            config,
            state: ReauthState::Continue,
            peer_state: ReauthState::Continue,
            local_sequence: SequenceNumber::random(),
            remote_sequence: None,
            announced_timeout_ms: config.active_timeout_ms,
            received_extra_data: Vec::new(),
            finished: false,
        }
    }

    pub fn set_session_id(&mut self, session_id: u32) {
        self.session_id = session_id;
    }

    pub fn set_config(&mut self, config: ContinuousConfig) {
        self.config = config;
    }

    /// Sets the state announced with this side's next message. Moving to
    /// [`ReauthState::Stop`] ends the session after the round that
    /// carries it.
    pub fn set_state(&mut self, state: ReauthState) {
        self.state = state;
    }

    pub fn state(&self) -> ReauthState {
        self.state
    }

    /// The peer's state as of the last completed round.
    pub fn peer_state(&self) -> ReauthState {
        self.peer_state
    }

    pub fn received_extra_data(&self) -> &[u8] {
        &self.received_extra_data
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn into_channel(self) -> C {
        self.channel
    }

    /// How long the prover should wait before driving the next round:
    /// `min(timeout, received - leeway)`, the verifier-announced value
    /// with the leeway taken off, never beyond the locally configured
    /// round timeout.
    pub fn next_round_wait(&self) -> Duration {
        let wait = self
            .configured_wait_ms()
            .min(self.announced_timeout_ms.saturating_sub(self.config.timeout_leeway_ms));
        Duration::from_millis(u64::from(wait))
    }

    /// The timeout this verifier announces, tracking its own state.
    fn round_timeout_ms(&self) -> u32 {
        match self.state {
            ReauthState::Pause => self.config.paused_timeout_ms,
            _ => self.config.active_timeout_ms,
        }
    }

    // the configured ceiling on the prover-side wait; a pause on either
    // side raises it to the paused cadence
    fn configured_wait_ms(&self) -> u32 {
        if self.state == ReauthState::Pause || self.peer_state == ReauthState::Pause {
            self.config.paused_timeout_ms
        } else {
            self.config.active_timeout_ms
        }
    }

    fn accept_remote_sequence(&mut self, received: SequenceNumber) -> Result<(), SigmaError> {
        if let Some(expected) = &self.remote_sequence {
            if &received != expected {
                log::warn!("session {:08x}: reauth sequence mismatch", self.session_id);
                return Err(SigmaError::SequenceMismatch);
            }
        }
        self.remote_sequence = Some(received.next_expected());
        Ok(())
    }

    /// One prover round: send a PicoReAuth carrying this side's state and
    /// sequence number, read the ServiceReAuth answer, adopt the
    /// announced timeout. `Ok(false)` means the session ended cleanly
    /// with this round (either side announced STOP).
    pub fn continue_round(&mut self, extra_data: &[u8]) -> Result<bool, SigmaError> {
        if self.finished {
            return Err(SigmaError::SessionEnded);
        }

        let ping = PicoReAuth::encode(
            &self.shared_key,
            self.session_id,
            self.state,
            &self.local_sequence,
            extra_data,
        )?;
        self.channel.write(&ping)?;
        self.local_sequence.increment();

        let reply = self.channel.read()?;
        let content = ServiceReAuth::decode(&reply, &self.shared_key)?;
        self.accept_remote_sequence(content.sequence)?;
        self.peer_state = content.state;
        self.announced_timeout_ms = content.timeout_ms;
        self.received_extra_data = content.extra_data;

        match content.state {
            ReauthState::Error => {
                self.finished = true;
                Err(SigmaError::SessionEnded)
            }
            ReauthState::Stop => {
                self.finished = true;
                Ok(false)
            }
            _ if self.state == ReauthState::Stop => {
                self.finished = true;
                Ok(false)
            }
            _ => Ok(true),
        }
    }

    /// One verifier round: wait for the prover's PicoReAuth (up to the
    /// current timeout plus leeway), answer it with this side's state,
    /// the next timeout hint and sequence number. `Ok(false)` means the
    /// session ended cleanly with this round.
    pub fn serve_round(&mut self, extra_data: &[u8]) -> Result<bool, SigmaError> {
        if self.finished {
            return Err(SigmaError::SessionEnded);
        }

        let wait = self.round_timeout_ms() + self.config.timeout_leeway_ms;
        self.channel.set_timeout(Duration::from_millis(u64::from(wait)));
        let ping = self.channel.read()?;
        let content = PicoReAuth::decode(&ping, &self.shared_key)?;
        self.accept_remote_sequence(content.sequence)?;
        self.peer_state = content.state;
        self.received_extra_data = content.extra_data;

        let timeout = self.round_timeout_ms();
        let pong = ServiceReAuth::encode(
            &self.shared_key,
            self.session_id,
            self.state,
            timeout,
            &self.local_sequence,
            extra_data,
        )?;
        self.channel.write(&pong)?;
        self.local_sequence.increment();
        self.announced_timeout_ms = timeout;

        match content.state {
            ReauthState::Error => {
                self.finished = true;
                Err(SigmaError::SessionEnded)
            }
            ReauthState::Stop => {
                self.finished = true;
                Ok(false)
            }
            _ if self.state == ReauthState::Stop => {
                self.finished = true;
                Ok(false)
            }
            _ => Ok(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use channel::LoopChannel;
    use std::thread;

    fn pair() -> (Continuous<LoopChannel>, Continuous<LoopChannel>) {
        let (service_end, pico_end) = LoopChannel::pair();
        let key: [u8; SHARED_KEY_SIZE] = crypto::generate_symmetric_key(SHARED_KEY_SIZE)
            .try_into()
            .unwrap();
        (
            Continuous::new(service_end, key),
            Continuous::new(pico_end, key),
        )
    }

    #[test]
    fn a_round_trips_extra_data_both_ways() {
        let (mut service, mut pico) = pair();

        let verifier = thread::spawn(move || {
            assert!(service.serve_round(b"from service").unwrap());
            assert_eq!(service.received_extra_data(), b"from pico");
            service
        });

        assert!(pico.continue_round(b"from pico").unwrap());
        assert_eq!(pico.received_extra_data(), b"from service");
        verifier.join().unwrap();
    }

    #[test]
    fn sequence_mismatch_ends_the_session() {
        let (mut service, mut pico) = pair();

        let verifier = thread::spawn(move || {
            assert!(service.serve_round(b"").unwrap());
            // the prover's counter is forced out of step below, so the
            // second round must fail validation
            assert!(matches!(
                service.serve_round(b""),
                Err(SigmaError::SequenceMismatch)
            ));
        });

        assert!(pico.continue_round(b"").unwrap());
        // skip a value: the verifier now expects the old counter + 1
        pico.local_sequence.increment();
        let _ = pico.continue_round(b"");
        verifier.join().unwrap();
    }

    #[test]
    fn finished_sessions_refuse_further_rounds() {
        let (mut service, mut pico) = pair();

        let verifier = thread::spawn(move || {
            service.set_state(ReauthState::Stop);
            assert!(!service.serve_round(b"").unwrap());
            assert!(matches!(
                service.serve_round(b""),
                Err(SigmaError::SessionEnded)
            ));
        });

        assert!(!pico.continue_round(b"").unwrap());
        assert!(pico.finished());
        assert!(matches!(
            pico.continue_round(b""),
            Err(SigmaError::SessionEnded)
        ));
        verifier.join().unwrap();
    }
}
