use std::sync::Arc;

use proptest::prelude::*;

use crate::{IssuedCidConfig, IssuedCidSet, IssuedCidState, LOC_CID_COUNT};

use util::*;

const NUM_CIDS: usize = 4;

#[test]
fn issued_cid_lifecycle() {
    let _guard = subscribe();
    let (mut set, encryptor) = set_and_encryptor(NUM_CIDS);
    let verify = |set: &IssuedCidSet| verify_array(set, &*encryptor);

    assert_eq!(verify(&set), Ok(()));
    assert_eq!(num_pending(&set), 0);
    assert!(exists_once(&set, 0, IssuedCidState::Delivered));

    assert_eq!(set.set_size(NUM_CIDS), NUM_CIDS - 1);
    assert_eq!(verify(&set), Ok(()));
    assert_eq!(num_pending(&set), NUM_CIDS - 1);
    assert!(exists_once(&set, 0, IssuedCidState::Delivered));
    assert!(exists_once(&set, 1, IssuedCidState::Pending));
    assert!(exists_once(&set, 2, IssuedCidState::Pending));
    assert!(exists_once(&set, 3, IssuedCidState::Pending));

    // send three pending CIDs
    assert_eq!(set.on_sent(NUM_CIDS - 1), NUM_CIDS - 1);
    assert_eq!(verify(&set), Ok(()));
    assert!(exists_once(&set, 1, IssuedCidState::Inflight));
    assert!(exists_once(&set, 2, IssuedCidState::Inflight));
    assert!(exists_once(&set, 3, IssuedCidState::Inflight));

    set.on_acked(1);
    set.on_acked(3);
    assert!(set.on_lost(2));
    assert_eq!(verify(&set), Ok(()));
    assert_eq!(num_pending(&set), 1);
    assert!(exists_once(&set, 1, IssuedCidState::Delivered));
    assert!(exists_once(&set, 2, IssuedCidState::Pending));
    assert!(exists_once(&set, 3, IssuedCidState::Delivered));

    // retransmit sequence 2
    set.on_sent(1);
    assert_eq!(num_pending(&set), 0);

    // retire everything
    assert!(set.retire(0));
    assert!(set.retire(1));
    assert!(set.retire(2));
    assert!(set.retire(3));
    assert_eq!(num_pending(&set), 4);
    for sequence in 4..8 {
        assert!(exists_once(&set, sequence, IssuedCidState::Pending));
    }

    // partial send
    set.on_sent(1);
    assert_eq!(verify(&set), Ok(()));
    assert_eq!(num_pending(&set), 3);
    assert!(exists_once(&set, 4, IssuedCidState::Inflight));
    assert!(exists_once(&set, 5, IssuedCidState::Pending));
    assert!(exists_once(&set, 6, IssuedCidState::Pending));
    assert!(exists_once(&set, 7, IssuedCidState::Pending));

    // retire one in the middle of the pending CIDs
    assert!(set.retire(6));
    assert_eq!(verify(&set), Ok(()));
    assert!(exists_once(&set, 8, IssuedCidState::Pending));

    set.on_sent(2);
    assert!(set.on_lost(4));
    // late ACK
    assert!(set.on_acked(4));
    assert!(set.on_acked(5));
    // duplicate ACK
    assert!(!set.on_acked(5));
    assert!(exists_once(&set, 4, IssuedCidState::Delivered));
    assert!(exists_once(&set, 5, IssuedCidState::Delivered));
    assert_eq!(verify(&set), Ok(()));

    // a set without an encryptor stays empty
    let mut empty_set = IssuedCidSet::new(&IssuedCidConfig::default());
    assert_eq!(empty_set.set_size(NUM_CIDS), 0);
    assert!(empty_set.is_empty());
}

#[test]
fn encrypts_each_sequence_once() {
    let _guard = subscribe();
    let (mut set, encryptor) = set_and_encryptor(NUM_CIDS);
    set.set_size(NUM_CIDS);
    set.on_sent(2);
    set.on_lost(1);
    set.on_sent(2);
    set.retire(2);
    set.retire(2);
    set.on_acked(1);
    set.set_size(NUM_CIDS);
    assert_eq!(*encryptor.encrypted.lock().unwrap(), [0, 1, 2, 3, 4]);
    assert_eq!(set.stats().issued, 5);
}

#[test]
fn template_reaches_encryptor() {
    use crate::{CidDecodeError, CidEncryptor, CidPlaintext, ConnectionId, ResetToken};

    /// Puts `master_id` into the CID so the template can be observed
    struct MasterIdEncryptor;

    impl CidEncryptor for MasterIdEncryptor {
        fn encrypt_cid(&self, plaintext: &CidPlaintext) -> (ConnectionId, ResetToken) {
            let mut bytes = [0; 12];
            bytes[..4].copy_from_slice(&plaintext.master_id.to_be_bytes());
            bytes[4..].copy_from_slice(&plaintext.sequence.to_be_bytes());
            (ConnectionId::new(&bytes), ResetToken::default())
        }

        fn decrypt_cid(&self, cid: &[u8]) -> Result<CidPlaintext, CidDecodeError> {
            Err(CidDecodeError::InvalidLength(cid.len()))
        }
    }

    let mut config = IssuedCidConfig::new(Arc::new(MasterIdEncryptor));
    config.template(CidPlaintext {
        master_id: 0xaabb_ccdd,
        sequence: 77,
        ..CidPlaintext::default()
    });
    let mut set = IssuedCidSet::new(&config);
    set.set_size(2);
    for slot in set.iter() {
        assert_eq!(&slot.cid()[..4], &[0xaa, 0xbb, 0xcc, 0xdd]);
        assert_eq!(&slot.cid()[4..], &slot.sequence().to_be_bytes());
    }
}

#[cfg(feature = "ring")]
#[test]
fn hmac_encryptor_round_trip() {
    use crate::{CidEncryptor, CidPlaintext, HmacCidEncryptor};

    let _guard = subscribe();
    let encryptor = Arc::new(HmacCidEncryptor::from_secret(b"endpoint secret"));
    let mut config = IssuedCidConfig::new(encryptor.clone());
    config.template(CidPlaintext {
        master_id: 12,
        thread_id: 3,
        ..CidPlaintext::default()
    });
    let mut set = IssuedCidSet::new(&config);
    set.set_size(LOC_CID_COUNT);
    set.retire(0);
    assert_eq!(verify_array(&set, &*encryptor), Ok(()));
    for slot in set.iter() {
        let plaintext = encryptor.decrypt_cid(slot.cid()).unwrap();
        assert_eq!(plaintext.master_id, 12);
        assert_eq!(plaintext.thread_id, 3);
        assert_eq!(encryptor.encrypt_cid(&plaintext), (*slot.cid(), slot.reset_token()));
    }
}

#[derive(Debug, Clone)]
enum Op {
    SetSize(usize),
    Sent(usize),
    Acked(u64),
    Lost(u64),
    Retire(u64),
    RetirePriorTo(u64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..=LOC_CID_COUNT + 2).prop_map(Op::SetSize),
        (0usize..6).prop_map(Op::Sent),
        (0u64..32).prop_map(Op::Acked),
        (0u64..32).prop_map(Op::Lost),
        (0u64..32).prop_map(Op::Retire),
        (0u64..32).prop_map(Op::RetirePriorTo),
    ]
}

fn apply(set: &mut IssuedCidSet, op: &Op) {
    match *op {
        Op::SetSize(target) => {
            set.set_size(target.min(set.capacity()));
        }
        Op::Sent(count) => {
            set.on_sent(count);
        }
        Op::Acked(sequence) => {
            set.on_acked(sequence);
        }
        Op::Lost(sequence) => {
            set.on_lost(sequence);
        }
        Op::Retire(sequence) => {
            set.retire(sequence);
        }
        Op::RetirePriorTo(sequence) => {
            set.request_retire_prior_to(sequence);
        }
    }
}

fn snapshot(set: &IssuedCidSet) -> Vec<(u64, IssuedCidState)> {
    set.iter()
        .map(|slot| (slot.sequence(), slot.state()))
        .collect()
}

proptest! {
    #[test]
    fn invariants_hold(
        capacity in 1..=LOC_CID_COUNT,
        ops in proptest::collection::vec(op(), 0..64),
    ) {
        let (mut set, encryptor) = set_and_encryptor(capacity);
        for op in &ops {
            apply(&mut set, op);
            prop_assert_eq!(verify_array(&set, &*encryptor), Ok(()), "after {:?}", op);
            prop_assert!(set.len() <= set.target().max(1));
        }
        let encrypted = encryptor.encrypted.lock().unwrap();
        prop_assert_eq!(encrypted.len() as u64, set.next_sequence());
    }

    #[test]
    fn duplicate_ack_is_noop(
        ops in proptest::collection::vec(op(), 0..32),
        sequence in 0u64..16,
    ) {
        let mut set = set_with(NUM_CIDS);
        for op in &ops {
            apply(&mut set, op);
        }
        set.on_acked(sequence);
        let once = snapshot(&set);
        prop_assert!(!set.on_acked(sequence));
        prop_assert_eq!(snapshot(&set), once);
    }

    #[test]
    fn late_ack_wins(
        ops in proptest::collection::vec(op(), 0..32),
        sequence in 0u64..16,
    ) {
        let mut set = set_with(NUM_CIDS);
        for op in &ops {
            apply(&mut set, op);
        }
        if set.on_lost(sequence) {
            prop_assert!(set.on_acked(sequence));
            prop_assert!(exists_once(&set, sequence, IssuedCidState::Delivered));
        } else {
            prop_assert!(set
                .get(sequence)
                .map_or(true, |slot| slot.state() != IssuedCidState::Inflight));
        }
    }

    #[test]
    fn retire_is_idempotent(
        ops in proptest::collection::vec(op(), 0..32),
        sequence in 0u64..16,
    ) {
        let mut set = set_with(NUM_CIDS);
        for op in &ops {
            apply(&mut set, op);
        }
        let was_active = set.get(sequence).is_some();
        prop_assert_eq!(set.retire(sequence), was_active);
        let once = snapshot(&set);
        prop_assert!(!set.retire(sequence));
        prop_assert_eq!(snapshot(&set), once);
    }

    #[test]
    fn no_encryptor_stays_empty(ops in proptest::collection::vec(op(), 0..32)) {
        let mut set = IssuedCidSet::new(&IssuedCidConfig::default());
        for op in &ops {
            if let Op::SetSize(target) = *op {
                prop_assert_eq!(set.set_size(target.min(set.capacity())), 0);
            } else {
                apply(&mut set, op);
            }
            prop_assert!(set.is_empty());
        }
    }
}
