//! End-to-end bootstrap: service keys come off disk, the displayed code
//! carries the identity to the prover, and the run is performed with the
//! key pinned from the code.

use std::fs;
use std::thread;

use pico::channel::LoopChannel;
use pico::sigma::{prove, verify, StatusCode};
use pico::users::UserStore;
use pico::{crypto, KeyAuth};

#[test]
fn scan_then_authenticate_with_the_pinned_key() {
    let dir = std::env::temp_dir();
    let stem = format!("pico-bootstrap-{}", std::process::id());
    let private_path = dir.join(format!("{}.priv.der", stem));
    let public_path = dir.join(format!("{}.pub.der", stem));

    let (service_identity, service_public) =
        pico::load_or_generate_service_identity(&private_path, &public_path).unwrap();

    // the code the service would display
    let displayed = KeyAuth::new("loop://a", &service_identity, "", None)
        .unwrap()
        .serialize()
        .unwrap();

    // the prover scans it and pins the advertised key
    let scanned = KeyAuth::parse(&displayed).unwrap();
    assert!(scanned.verify());
    assert_eq!(scanned.service_public_key, service_public);

    let (mut service_end, mut pico_end) = LoopChannel::pair();
    let (pico_identity, pico_public) = crypto::generate_key_pair();
    let mut store = UserStore::new();
    store
        .add_user("alice", &pico_public, &crypto::generate_symmetric_key(16))
        .unwrap();

    let verifier = thread::spawn(move || {
        verify(&mut service_end, &service_identity, Some(&store), b"", false).unwrap()
    });
    let outcome = prove(
        &mut pico_end,
        &pico_identity,
        Some(&scanned.service_public_key),
        b"",
    )
    .unwrap();

    assert_eq!(outcome.status, StatusCode::OkDone);
    assert!(verifier.join().unwrap().authenticated);

    let _ = fs::remove_file(&private_path);
    let _ = fs::remove_file(&public_path);
}
