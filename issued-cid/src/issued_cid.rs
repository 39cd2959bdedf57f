use std::{fmt, sync::Arc};

use tinyvec::ArrayVec;
use tracing::{debug, trace, warn};

use crate::{
    config::IssuedCidConfig,
    crypto::{CidEncryptor, CidPlaintext},
    frame::{self, NewConnectionId},
    shared::ConnectionId,
    stats::IssuedCidStats,
    token::ResetToken,
    VarInt, LOC_CID_COUNT,
};

/// Lifecycle stage of an issued connection ID
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub enum IssuedCidState {
    /// 1. The slot holds no CID
    #[default]
    Idle,
    /// 2. Waiting to be sent in a NEW_CONNECTION_ID frame, for the first time or again after a loss
    Pending,
    /// 3. Sent, neither acknowledged nor declared lost yet
    Inflight,
    /// 4. Known to the peer
    Delivered,
}

/// A connection ID issued to the peer, together with its transmission state
#[derive(Debug, Default, Copy, Clone)]
pub struct IssuedCid {
    pub(crate) sequence: u64,
    pub(crate) cid: ConnectionId,
    pub(crate) reset_token: ResetToken,
    pub(crate) state: IssuedCidState,
}

impl IssuedCid {
    /// 1. Sequence number assigned when the CID was issued
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
    /// 2. The CID as it appears on the wire
    pub fn cid(&self) -> &ConnectionId {
        &self.cid
    }
    /// 3. Stateless reset token advertised alongside the CID
    pub fn reset_token(&self) -> ResetToken {
        self.reset_token
    }
    /// 4. Where the CID stands in its transmission lifecycle
    pub fn state(&self) -> IssuedCidState {
        self.state
    }
}

/// Connection IDs issued by the local endpoint
///
/// Holds up to `active_connection_id_limit` CIDs. Every `Pending` CID is kept ahead of every
/// `Inflight` or `Delivered` one, so the CIDs to send next always form a prefix of the set.
///
/// Signals from the network may be duplicated, reordered or refer to CIDs that are long gone; all
/// operations accept any input and report whether it had an effect.
pub struct IssuedCidSet {
    /// 1. Issued CIDs, `Pending` ones first; entries past `len()` are `Idle`
    slots: ArrayVec<[IssuedCid; LOC_CID_COUNT]>,
    /// 2. Upper bound on `slots.len()`
    capacity: usize,
    /// 3. Number of CIDs the set keeps issued, backfilled after retirement
    target: usize,
    /// 4. Sequence number of the next CID to issue
    next_sequence: u64,
    /// 5. Sequence number below which the peer is asked to retire CIDs
    retire_prior_to: u64,
    /// 6. `None` for zero-length CIDs, in which case the set stays empty
    encryptor: Option<Arc<dyn CidEncryptor>>,
    /// 7.
    template: CidPlaintext,
    /// 8.
    stats: IssuedCidStats,
}

impl IssuedCidSet {
    /// 1. Create the set of a new connection
    ///
    /// With an encryptor, the CID with sequence number 0 is issued right away. The peer learns it
    /// during the handshake, so it starts out `Delivered`.
    ///
    /// # Panics
    ///
    /// If the configured limit is not between 1 and [`LOC_CID_COUNT`].
    pub fn new(config: &IssuedCidConfig) -> Self {
        assert!(
            (1..=LOC_CID_COUNT).contains(&config.active_connection_id_limit),
            "active_connection_id_limit must be between 1 and {LOC_CID_COUNT}"
        );
        let mut this = Self {
            slots: ArrayVec::new(),
            capacity: config.active_connection_id_limit,
            target: 0,
            next_sequence: 0,
            retire_prior_to: 0,
            encryptor: config.encryptor.clone(),
            template: config.template,
            stats: IssuedCidStats::default(),
        };
        if this.issue(IssuedCidState::Delivered) {
            this.target = 1;
        }
        this
    }

    /// 2. Grow the number of issued CIDs to `target`
    ///
    /// `target` must not exceed the capacity; release builds clamp it. The set never shrinks; it
    /// only gets smaller through [`retire`](Self::retire). Returns the number of CIDs newly issued,
    /// all of them `Pending`.
    pub fn set_size(&mut self, target: usize) -> usize {
        debug_assert!(
            target <= self.capacity,
            "CID target {target} exceeds capacity {}",
            self.capacity
        );
        if self.encryptor.is_none() {
            return 0;
        }
        if target > self.capacity {
            debug!(
                target,
                capacity = self.capacity,
                "CID target exceeds capacity, clamping"
            );
        }
        self.target = self.target.max(target.min(self.capacity));

        let mut issued = 0;
        while self.slots.len() < self.target && self.issue(IssuedCidState::Pending) {
            issued += 1;
        }
        self.check_invariants();
        issued
    }

    /// 3. Record that the first `count` pending CIDs were put into NEW_CONNECTION_ID frames
    ///
    /// Returns the number of CIDs that became `Inflight`, which is less than `count` if fewer CIDs
    /// are pending.
    pub fn on_sent(&mut self, count: usize) -> usize {
        let pending = self.pending_count();
        let sent = count.min(pending);
        if sent == 0 {
            return 0;
        }
        for slot in &mut self.slots[..sent] {
            trace!(sequence = slot.sequence, frame = %frame::Type::NEW_CONNECTION_ID, "sent");
            slot.state = IssuedCidState::Inflight;
        }
        // Move the sent ones behind the remaining pending ones
        self.slots[..pending].rotate_left(sent);
        self.stats.sent += sent as u64;
        self.check_invariants();
        sent
    }

    /// 4. Handle acknowledgment of the CID with sequence number `sequence`
    ///
    /// Applies in any state, including after the CID was declared lost: a late acknowledgment
    /// still proves delivery. Returns whether the CID became `Delivered`, so duplicates and
    /// acknowledgments of retired CIDs yield `false`.
    pub fn on_acked(&mut self, sequence: u64) -> bool {
        let Some(mut index) = self.position(sequence) else {
            trace!(sequence, "ignoring ACK of unknown CID");
            return false;
        };
        let state = self.slots[index].state;
        match state {
            IssuedCidState::Delivered => return false,
            IssuedCidState::Pending => {
                // Leave the pending group from its tail
                let last = self.pending_count() - 1;
                self.slots.swap(index, last);
                index = last;
            }
            _ => {}
        }
        self.slots[index].state = IssuedCidState::Delivered;
        self.stats.acked += 1;
        trace!(sequence, "CID delivered");
        self.check_invariants();
        true
    }

    /// 5. Handle loss of the CID with sequence number `sequence`
    ///
    /// Only an `Inflight` CID goes back to `Pending`; returns whether that happened.
    pub fn on_lost(&mut self, sequence: u64) -> bool {
        let index = match self.position(sequence) {
            Some(index) if self.slots[index].state == IssuedCidState::Inflight => index,
            _ => return false,
        };
        self.requeue(index);
        self.stats.lost += 1;
        debug!(sequence, "CID lost, queued for retransmission");
        self.check_invariants();
        true
    }

    /// 6. Handle retirement of the CID with sequence number `sequence`
    ///
    /// Frees the CID's slot and, if that leaves the set below its target size, issues a
    /// replacement. Returns `false` if no such CID is active.
    pub fn retire(&mut self, sequence: u64) -> bool {
        let Some(index) = self.position(sequence) else {
            trace!(sequence, "ignoring retirement of unknown CID");
            return false;
        };
        let retired = self.slots.remove(index);
        self.stats.retired += 1;
        debug!(
            sequence,
            state = ?retired.state,
            frame = %frame::Type::RETIRE_CONNECTION_ID,
            "CID retired"
        );
        if self.slots.len() < self.target {
            self.issue(IssuedCidState::Pending);
        }
        self.check_invariants();
        true
    }

    /// 7. Ask the peer to retire every CID with a sequence number below `sequence`
    ///
    /// The request is capped at the highest issued sequence number, so the peer always keeps a CID
    /// to switch to. The value travels in NEW_CONNECTION_ID frames; if no pending CID can carry it,
    /// the CID with the highest sequence number is queued for retransmission. Returns `false` if
    /// the current value is not raised.
    pub fn request_retire_prior_to(&mut self, sequence: u64) -> bool {
        let Some(highest) = self.slots.iter().map(|slot| slot.sequence).max() else {
            return false;
        };
        let sequence = sequence.min(highest);
        if sequence <= self.retire_prior_to {
            return false;
        }
        debug!(
            from = self.retire_prior_to,
            to = sequence,
            "raising retire_prior_to"
        );
        self.retire_prior_to = sequence;
        if !self.pending().any(|slot| slot.sequence >= sequence) {
            if let Some(index) = self.position(highest) {
                trace!(sequence = highest, "resending CID to carry retire_prior_to");
                self.requeue(index);
            }
        }
        self.check_invariants();
        true
    }

    /// Whether no CIDs are issued
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of issued CIDs
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Maximum number of CIDs issued at once
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of CIDs the set keeps issued
    pub fn target(&self) -> usize {
        self.target
    }

    /// Sequence number the next issued CID will get
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Value for the `retire_prior_to` field of NEW_CONNECTION_ID frames
    pub fn retire_prior_to(&self) -> u64 {
        self.retire_prior_to
    }

    pub fn stats(&self) -> IssuedCidStats {
        self.stats
    }

    /// Issued CIDs, pending ones first
    pub fn iter(&self) -> impl Iterator<Item = &IssuedCid> + '_ {
        self.slots.iter()
    }

    /// The CID with sequence number `sequence`, if it is still active
    pub fn get(&self, sequence: u64) -> Option<&IssuedCid> {
        self.slots.iter().find(|slot| slot.sequence == sequence)
    }

    /// The active CID with wire representation `cid`
    pub fn find(&self, cid: &[u8]) -> Option<&IssuedCid> {
        self.slots.iter().find(|slot| slot.cid[..] == *cid)
    }

    /// Number of CIDs waiting for (re)transmission
    pub fn pending_count(&self) -> usize {
        self.slots
            .iter()
            .take_while(|slot| slot.state == IssuedCidState::Pending)
            .count()
    }

    /// CIDs waiting for (re)transmission, in the order they should be sent
    pub fn pending(&self) -> impl Iterator<Item = &IssuedCid> + '_ {
        self.slots
            .iter()
            .take_while(|slot| slot.state == IssuedCidState::Pending)
    }

    /// NEW_CONNECTION_ID frames for the pending CIDs
    ///
    /// Pass the number of frames actually written to [`on_sent`](Self::on_sent).
    pub fn pending_frames(&self) -> impl Iterator<Item = NewConnectionId> + '_ {
        self.pending().map(move |slot| NewConnectionId {
            sequence: slot.sequence,
            // Must not exceed the frame's own sequence number
            retire_prior_to: self.retire_prior_to.min(slot.sequence),
            id: slot.cid,
            reset_token: slot.reset_token,
        })
    }

    /// Active CIDs the peer has been asked to retire
    pub fn retiring(&self) -> impl Iterator<Item = &IssuedCid> + '_ {
        self.slots
            .iter()
            .filter(move |slot| slot.sequence < self.retire_prior_to)
    }

    fn position(&self, sequence: u64) -> Option<usize> {
        self.slots.iter().position(|slot| slot.sequence == sequence)
    }

    /// Move the sent CID at `index` to the tail of the pending group
    fn requeue(&mut self, index: usize) {
        let first = self.pending_count();
        self.slots.swap(index, first);
        self.slots[first].state = IssuedCidState::Pending;
    }

    /// Mint a CID with the next sequence number and place it according to `state`
    fn issue(&mut self, state: IssuedCidState) -> bool {
        let Some(encryptor) = &self.encryptor else {
            return false;
        };
        if self.slots.len() >= self.capacity {
            return false;
        }
        let sequence = match VarInt::from_u64(self.next_sequence) {
            Ok(sequence) => sequence.into_inner(),
            Err(e) => {
                warn!(sequence = self.next_sequence, "cannot issue CID: {}", e);
                return false;
            }
        };
        let (cid, reset_token) = encryptor.encrypt_cid(&CidPlaintext {
            sequence,
            ..self.template
        });
        self.next_sequence += 1;

        let index = match state {
            IssuedCidState::Pending => self.pending_count(),
            _ => self.slots.len(),
        };
        self.slots.insert(
            index,
            IssuedCid {
                sequence,
                cid,
                reset_token,
                state,
            },
        );
        self.stats.issued += 1;
        trace!(sequence, %cid, ?state, "issued CID");
        true
    }

    fn check_invariants(&self) {
        debug_assert!(self.slots.len() <= self.capacity);
        debug_assert!(self.slots[self.pending_count()..].iter().all(|slot| matches!(
            slot.state,
            IssuedCidState::Inflight | IssuedCidState::Delivered
        )));
    }
}

impl fmt::Debug for IssuedCidSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCidSet")
            .field("slots", &self.slots.as_slice())
            .field("capacity", &self.capacity)
            .field("target", &self.target)
            .field("next_sequence", &self.next_sequence)
            .field("retire_prior_to", &self.retire_prior_to)
            .field("encryptor", &self.encryptor.is_some())
            .finish()
    }
}
