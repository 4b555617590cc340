//! Drives the two event-driven machines against each other in a single
//! thread, playing the host for both: queued writes are handed across as
//! `read` events, timers fire by explicit calls.

use std::time::Duration;

use sigma::{
    FsmPico, FsmService, PicoHost, PicoState, ServiceHost, ServiceState, StatusCode,
};
use users::UserStore;

#[derive(Default)]
struct TestHost {
    outbox: Vec<Vec<u8>>,
    timeout: Option<Duration>,
    opened: u32,
    closed: u32,
    status: Option<StatusCode>,
    ended: bool,
    errored: bool,
}

impl PicoHost for TestHost {
    fn write(&mut self, message: &[u8]) {
        self.outbox.push(message.to_vec());
    }
    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }
    fn reconnect(&mut self) {
        self.opened += 1;
    }
    fn disconnect(&mut self) {
        self.closed += 1;
    }
    fn authenticated(&mut self, status: StatusCode) {
        self.status = Some(status);
    }
    fn session_ended(&mut self) {
        self.ended = true;
    }
    fn status_update(&mut self, _state: PicoState) {}
    fn error(&mut self) {
        self.errored = true;
    }
}

impl ServiceHost for TestHost {
    fn write(&mut self, message: &[u8]) {
        self.outbox.push(message.to_vec());
    }
    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }
    fn listen(&mut self) {
        self.opened += 1;
    }
    fn disconnect(&mut self) {
        self.closed += 1;
    }
    fn authenticated(&mut self, status: StatusCode) {
        self.status = Some(status);
    }
    fn session_ended(&mut self) {
        self.ended = true;
    }
    fn status_update(&mut self, _state: ServiceState) {}
    fn error(&mut self) {
        self.errored = true;
    }
}

/// Ferries queued messages between the machines until both go quiet. A
/// finished machine stops receiving, as its transport would be down.
fn pump(pico: &mut FsmPico<TestHost>, service: &mut FsmService<TestHost>) {
    loop {
        let to_service = std::mem::take(&mut pico.host_mut().outbox);
        let to_pico = std::mem::take(&mut service.host_mut().outbox);
        if to_service.is_empty() && to_pico.is_empty() {
            break;
        }
        for message in to_service {
            if !service.is_finished() {
                service.read(&message);
            }
        }
        for message in to_pico {
            if !pico.is_finished() {
                pico.read(&message);
            }
        }
    }
}

fn identities() -> (crypto::SecretKey, crypto::SecretKey, crypto::PublicKey) {
    let (service_identity, _) = crypto::generate_key_pair();
    let (pico_identity, pico_public) = crypto::generate_key_pair();
    (service_identity, pico_identity, pico_public)
}

#[test]
fn one_shot_run_reaches_fin_on_both_sides() {
    let (service_identity, pico_identity, pico_public) = identities();
    let mut store = UserStore::new();
    store
        .add_user("alice", &pico_public, &crypto::generate_symmetric_key(16))
        .unwrap();

    let mut service = FsmService::new(TestHost::default(), service_identity, Some(&store), false);
    let mut pico = FsmPico::new(TestHost::default(), pico_identity, None, false);

    service.start();
    pico.start();
    assert_eq!(service.host().opened, 1);
    assert_eq!(pico.host().opened, 1);

    service.connected();
    pico.connected();
    pump(&mut pico, &mut service);

    assert_eq!(pico.state(), PicoState::Fin);
    assert_eq!(service.state(), ServiceState::Fin);
    assert_eq!(pico.host().status, Some(StatusCode::OkDone));
    assert_eq!(service.host().status, Some(StatusCode::OkDone));
    assert_eq!(service.authenticated_user(), Some("alice"));
    assert!(pico.host().closed >= 1);
    assert!(service.host().closed >= 1);
    assert!(!pico.host().errored);
    assert!(!service.host().errored);
}

#[test]
fn unknown_identity_fails_authentication() {
    let (service_identity, pico_identity, _) = identities();
    let store = UserStore::new();

    let mut service = FsmService::new(TestHost::default(), service_identity, Some(&store), false);
    let mut pico = FsmPico::new(TestHost::default(), pico_identity, None, false);

    service.start();
    pico.start();
    service.connected();
    pico.connected();
    pump(&mut pico, &mut service);

    assert_eq!(service.host().status, Some(StatusCode::Rejected));
    assert_eq!(pico.host().status, Some(StatusCode::Rejected));
    assert_eq!(service.state(), ServiceState::Fin);
    assert_eq!(pico.state(), PicoState::Fin);
}

#[test]
fn continuous_rounds_ride_the_timer_and_stop_cleanly() {
    let (service_identity, pico_identity, _) = identities();

    let mut service = FsmService::new(TestHost::default(), service_identity, None, true);
    let mut pico = FsmPico::new(TestHost::default(), pico_identity, None, true);

    service.start();
    pico.start();
    service.connected();
    pico.connected();
    pump(&mut pico, &mut service);

    // the handshake rolled straight into the first reauth round
    assert_eq!(pico.host().status, Some(StatusCode::OkContinue));
    assert_eq!(service.host().status, Some(StatusCode::OkContinue));
    assert_eq!(pico.state(), PicoState::ServiceReAuth);
    assert_eq!(service.state(), ServiceState::ServiceReAuth);

    // a few more rounds, each driven by the pico's round timer
    for _ in 0..3 {
        pico.timeout();
        pump(&mut pico, &mut service);
        assert_eq!(pico.state(), PicoState::ServiceReAuth);
        assert!(!pico.host().errored);
        assert!(!service.host().errored);
    }

    // extra data rides the next round in both directions
    pico.set_outbound_extra_data(b"battery low".to_vec());
    service.set_outbound_extra_data(b"ack".to_vec());
    pico.timeout();
    pump(&mut pico, &mut service);
    assert_eq!(service.received_extra_data(), b"battery low");
    assert_eq!(pico.received_extra_data(), b"ack");

    // the pico hangs up; its final STOP message ends the service side too
    pico.stop();
    assert_eq!(pico.state(), PicoState::Fin);
    assert!(pico.host().ended);
    pump(&mut pico, &mut service);
    assert_eq!(service.state(), ServiceState::Fin);
    assert!(service.host().ended);
}

#[test]
fn garbage_input_faults_the_machine() {
    let (service_identity, pico_identity, _) = identities();

    let mut service = FsmService::new(TestHost::default(), service_identity, None, false);
    service.start();
    service.connected();
    service.read(b"not a protocol message");
    assert_eq!(service.state(), ServiceState::Error);
    assert!(service.host().errored);
    assert!(service.take_error().is_some());

    let mut pico = FsmPico::new(TestHost::default(), pico_identity, None, false);
    pico.start();
    pico.connected();
    pico.read(b"{\"unexpected\":1}");
    assert_eq!(pico.state(), PicoState::Error);
    assert!(pico.host().errored);
}

#[test]
fn service_relists_when_nobody_turns_up() {
    let (service_identity, _, _) = identities();

    let mut service = FsmService::new(TestHost::default(), service_identity, None, false);
    service.start();
    assert_eq!(service.host().opened, 1);
    service.connected();
    assert_eq!(service.state(), ServiceState::Start);

    // the wait for a Start message expires: back to listening, no error
    service.timeout();
    assert_eq!(service.state(), ServiceState::Connect);
    assert_eq!(service.host().opened, 2);
    assert!(!service.host().errored);

    // a second visitor can then run the protocol
    service.connected();
    assert_eq!(service.state(), ServiceState::Start);
}

#[test]
fn reply_timeout_is_an_error_for_the_prover() {
    let (_, pico_identity, _) = identities();

    let mut pico = FsmPico::new(TestHost::default(), pico_identity, None, false);
    pico.start();
    pico.connected();
    assert_eq!(pico.state(), PicoState::ServiceAuth);

    pico.timeout();
    assert_eq!(pico.state(), PicoState::Error);
    assert!(pico.host().errored);
}
