use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tracing::debug;
use uuid::Uuid;

use crate::{
    client::transaction::{Outcome, Resolution, TransactionManager},
    dto::common::QueueStateSnapshot,
    state::{
        queue::{ItemId, Mutation, MutationError, RequesterCtx, RoomQueueState},
        wait,
    },
};

/// A requester's local view of its room queue.
///
/// Holds the last authoritative snapshot plus a working copy carrying the
/// speculative effects of in-flight transactions. Reverting is always
/// "discard the working copy and reuse the authoritative one": speculative
/// effects are pure functions of the pre-mutation local state, so no inverse
/// operations exist to get wrong.
pub struct QueueReplica {
    requester: RequesterCtx,
    authoritative: RoomQueueState,
    local: RoomQueueState,
    last_applied_version: Option<u64>,
    transactions: TransactionManager,
}

impl QueueReplica {
    /// Create an empty replica for `requester`, expiring unacknowledged
    /// mutations after `ack_timeout`.
    pub fn new(requester: RequesterCtx, ack_timeout: Duration) -> Self {
        let authoritative = RoomQueueState::replica(Vec::new(), Vec::new(), None, 0.0, 0);
        Self {
            requester,
            local: authoritative.clone(),
            authoritative,
            last_applied_version: None,
            transactions: TransactionManager::new(ack_timeout),
        }
    }

    /// Identity this replica speculates as.
    pub fn requester(&self) -> &RequesterCtx {
        &self.requester
    }

    /// The local state, including speculative effects.
    pub fn local(&self) -> &RoomQueueState {
        &self.local
    }

    /// Version of the latest applied authoritative snapshot.
    pub fn last_applied_version(&self) -> Option<u64> {
        self.last_applied_version
    }

    /// Number of transactions awaiting resolution.
    pub fn in_flight(&self) -> usize {
        self.transactions.in_flight()
    }

    /// Begin a speculative mutation: apply its effect to the local state and
    /// return the transaction id to attach to the outbound message.
    ///
    /// Capacity is not enforced locally; the server is the authority on its
    /// own limits and a rejection simply reverts the speculation.
    pub fn begin(&mut self, mutation: Mutation, now: Instant) -> Result<Uuid, MutationError> {
        self.local
            .apply(&self.requester, mutation.clone(), usize::MAX)?;
        let base_version = self.last_applied_version.unwrap_or(0);
        Ok(self.transactions.begin(mutation, base_version, now))
    }

    /// Replace the local state with an authoritative snapshot.
    ///
    /// Returns `false` when the snapshot is not newer than the last applied
    /// one and was ignored. Applying a snapshot silently supersedes every
    /// transaction begun against an older version: their speculative effects
    /// are gone (last-writer-wins at the snapshot level) and their late
    /// resolutions become no-ops.
    pub fn apply_snapshot(&mut self, snapshot: &QueueStateSnapshot) -> bool {
        if let Some(last) = self.last_applied_version {
            if snapshot.version <= last {
                return false;
            }
        }

        self.authoritative = snapshot.to_replica_state();
        self.local = self.authoritative.clone();
        self.last_applied_version = Some(snapshot.version);

        let superseded = self.transactions.supersede_before(snapshot.version);
        if superseded > 0 {
            debug!(superseded, version = snapshot.version, "snapshot superseded transactions");
        }
        true
    }

    /// Resolve a transaction with the server's acknowledgement outcome.
    ///
    /// A failure rolls the local state back to the last authoritative
    /// snapshot; a stale resolution (superseded, expired, or unknown) leaves
    /// everything untouched.
    pub fn resolve(&mut self, transaction_id: Uuid, outcome: Outcome) -> Resolution {
        let resolution = self.transactions.resolve(transaction_id, outcome);
        if resolution == Resolution::Reverted {
            self.local = self.authoritative.clone();
        }
        resolution
    }

    /// Expire every transaction whose acknowledgement deadline has passed,
    /// treating each as a failure. Returns how many expired.
    pub fn expire_overdue(&mut self, now: Instant) -> usize {
        let expired = self.transactions.expire_overdue(now);
        if !expired.is_empty() {
            self.local = self.authoritative.clone();
        }
        expired.len()
    }

    /// Stable "what's next" preview over the local state.
    pub fn preview_order(&self) -> Vec<ItemId> {
        self.local.preview_order()
    }

    /// Authoritative-style playback order over the local state.
    pub fn playback_order(&self) -> Vec<ItemId> {
        self.local.playback_order()
    }

    /// Expected wait in seconds for every upcoming item.
    pub fn waits(&self) -> IndexMap<ItemId, u64> {
        let order = self.local.playback_order();
        wait::compute_waits(
            &order,
            self.local.items(),
            self.local.history(),
            self.local.current_item_id(),
            self.local.current_position(),
        )
    }
}
