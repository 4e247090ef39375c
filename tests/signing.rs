//! Integration tests for the signed chat chain

#![allow(clippy::expect_used, clippy::unwrap_used)]

use craft_protocol::protocol::signing::{
    signed_data_1_19, signed_data_1_19_3, AckAction, PreviousSignature, SenderKey, SignedEntry, SigningState,
    ACK_FLUSH_THRESHOLD,
};
use craft_protocol::protocol::version::SigningGeneration;
use rand_core::OsRng;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::EncodePublicKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha2::Sha256;
use uuid::Uuid;

struct Sender {
    uuid: Uuid,
    session: Uuid,
    signing_key: SigningKey<Sha256>,
    der: Vec<u8>,
}

impl Sender {
    fn new(n: u128) -> Self {
        let private = RsaPrivateKey::new(&mut OsRng, 1024).expect("keygen");
        let der = private
            .to_public_key()
            .to_public_key_der()
            .expect("der")
            .as_bytes()
            .to_vec();
        Self {
            uuid: Uuid::from_u128(n),
            session: Uuid::from_u128(n << 64),
            signing_key: SigningKey::<Sha256>::new(private),
            der,
        }
    }

    fn key(&self) -> SenderKey {
        SenderKey::new(&self.der, i64::MAX / 2, Some(self.session))
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        self.signing_key.sign(data).to_vec()
    }

    fn sign_1_19_3(&self, index: i32, content: &str, previous: &[Vec<u8>]) -> Vec<u8> {
        self.sign(&signed_data_1_19_3(self.uuid, self.session, index, content, 1_000, 7, previous))
    }
}

fn online_state(generation: SigningGeneration, window: usize) -> SigningState {
    let mut state = SigningState::new(generation, window);
    state.set_online(true);
    state.set_player(Uuid::from_u128(999));
    state
}

#[test]
fn test_1_19_signature_and_tamper() {
    let alice = Sender::new(1);
    let mut state = online_state(SigningGeneration::V1_19, 0);
    state.set_sender_key(alice.uuid, alice.key());

    let signature = alice.sign(&signed_data_1_19(alice.uuid, r#"{"text":"hi"}"#, 5_000, 3));
    assert!(state.verify_1_19(alice.uuid, r#"{"text":"hi"}"#, 5_000, 3, &signature));
    assert!(!state.verify_1_19(alice.uuid, r#"{"text":"hi!"}"#, 5_000, 3, &signature));
    assert!(!state.verify_1_19(Uuid::from_u128(2), r#"{"text":"hi"}"#, 5_000, 3, &signature));
}

#[test]
fn test_1_19_3_chain_through_the_cache() {
    let alice = Sender::new(1);
    let mut state = online_state(SigningGeneration::V1_19_3, 20);
    state.set_sender_key(alice.uuid, alice.key());

    let first = alice.sign_1_19_3(0, "first", &[]);
    assert!(state.verify_1_19_3(alice.uuid, 0, "first", 1_000, 7, &[], Some(&first)));
    assert_eq!(state.acknowledge(SignedEntry::new(alice.uuid, first.clone()), true), AckAction::None);
    assert_eq!(state.cache().index_of(&first), Some(0));

    // the second message references the first by cache slot
    let second = alice.sign_1_19_3(1, "second", std::slice::from_ref(&first));
    assert!(state.verify_1_19_3(
        alice.uuid,
        1,
        "second",
        1_000,
        7,
        &[PreviousSignature::Cached(0)],
        Some(&second)
    ));
    assert_eq!(state.cache().index_of(&second), Some(0));
    assert_eq!(state.cache().index_of(&first), Some(1));

    let seen = state.collect_seen();
    assert_eq!(seen.message_count, 1);
    assert_eq!(seen.entries.len(), 1);
    // the newest entry sits in the last slot of the window
    assert_eq!(seen.bitset, [0, 0, 0x08]);
}

#[test]
fn test_1_19_3_replayed_index_breaks_chain() {
    let alice = Sender::new(3);
    let mut state = online_state(SigningGeneration::V1_19_3, 20);
    state.set_sender_key(alice.uuid, alice.key());

    let signature = alice.sign_1_19_3(4, "hello", &[]);
    assert!(state.verify_1_19_3(alice.uuid, 4, "hello", 1_000, 7, &[], Some(&signature)));
    assert!(!state.verify_1_19_3(alice.uuid, 4, "hello", 1_000, 7, &[], Some(&signature)));
    assert!(!state.sender_key(&alice.uuid).unwrap().chain_valid());
}

#[test]
fn test_1_19_3_unknown_cache_slot_is_unverified() {
    let alice = Sender::new(4);
    let mut state = online_state(SigningGeneration::V1_19_3, 20);
    state.set_sender_key(alice.uuid, alice.key());

    let signature = alice.sign_1_19_3(0, "late", &[vec![1; 256]]);
    assert!(!state.verify_1_19_3(
        alice.uuid,
        0,
        "late",
        1_000,
        7,
        &[PreviousSignature::Cached(40)],
        Some(&signature)
    ));
}

#[test]
fn test_1_19_2_flushes_once_past_threshold() {
    let mut state = online_state(SigningGeneration::V1_19_2, 5);
    let mut flushes = 0;
    for n in 0..=ACK_FLUSH_THRESHOLD {
        let entry = SignedEntry::new(Uuid::from_u128(u128::from(n % 9)), vec![n as u8; 8]);
        if let AckAction::Acknowledge(ack) = state.acknowledge(entry, true) {
            flushes += 1;
            assert!(ack.last_seen.len() <= 5);
        }
    }
    assert_eq!(flushes, 1);
    assert_eq!(state.pending(), 0);
    assert_eq!(state.collector().len(), 5);
}

#[test]
fn test_1_19_3_window_is_bounded() {
    let mut state = online_state(SigningGeneration::V1_19_3, 20);
    for n in 0..50u8 {
        state.acknowledge(SignedEntry::new(Uuid::from_u128(u128::from(n)), vec![n; 4]), true);
        assert!(state.collector().len() <= 20);
    }
    let seen = state.collect_seen();
    assert_eq!(seen.entries.len(), 20);
    assert_eq!(seen.message_count, 50);
    assert_eq!(seen.bitset, [0xFF, 0xFF, 0x0F]);
}

#[test]
fn test_reset_clears_window_but_keeps_keys() {
    let alice = Sender::new(5);
    let mut state = online_state(SigningGeneration::V1_19_3, 20);
    state.set_sender_key(alice.uuid, alice.key());
    state.acknowledge(SignedEntry::new(alice.uuid, vec![1; 4]), true);

    state.reset();
    assert!(state.collector().is_empty());
    assert_eq!(state.pending(), 0);
    assert!(state.sender_key(&alice.uuid).is_some());
}
