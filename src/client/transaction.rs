use std::time::{Duration, Instant};

use indexmap::IndexMap;
use uuid::Uuid;

use crate::state::queue::Mutation;

/// Outcome of a mutation as reported by the server, or synthesized locally
/// when the acknowledgement never arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The server applied the mutation.
    Success,
    /// The server rejected the mutation (or the wait for it timed out).
    Failure,
}

/// Disposition of a transaction resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Speculative effect retained; the record is discarded.
    Committed,
    /// Local state must be reset to the last authoritative snapshot.
    Reverted,
    /// The transaction was superseded by a newer snapshot (or never
    /// existed); the resolution is a no-op.
    Stale,
}

/// An in-flight speculative mutation awaiting its acknowledgement.
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    /// Client-generated transaction id, echoed by the server.
    pub id: Uuid,
    /// The proposed mutation, kept for diagnostics.
    pub mutation: Mutation,
    /// Authoritative snapshot version the speculation was built on.
    pub base_version: u64,
    /// Instant after which the transaction expires to a failure.
    pub deadline: Instant,
}

/// Tracks every in-flight transaction of one client.
///
/// Transactions live from `begin` until their resolution and never longer;
/// a snapshot newer than a transaction's base version supersedes it
/// silently, so a late acknowledgement cannot clobber newer state.
pub struct TransactionManager {
    inflight: IndexMap<Uuid, PendingTransaction>,
    timeout: Duration,
}

impl TransactionManager {
    /// Create a manager expiring unacknowledged transactions after
    /// `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            inflight: IndexMap::new(),
            timeout,
        }
    }

    /// Record a freshly begun transaction and return its id.
    pub fn begin(&mut self, mutation: Mutation, base_version: u64, now: Instant) -> Uuid {
        let id = Uuid::new_v4();
        self.inflight.insert(
            id,
            PendingTransaction {
                id,
                mutation,
                base_version,
                deadline: now + self.timeout,
            },
        );
        id
    }

    /// Resolve a transaction with the server's outcome.
    ///
    /// Unknown ids resolve to [`Resolution::Stale`]: the transaction was
    /// superseded by a snapshot, expired, or belongs to a previous session.
    pub fn resolve(&mut self, id: Uuid, outcome: Outcome) -> Resolution {
        if self.inflight.shift_remove(&id).is_none() {
            return Resolution::Stale;
        }
        match outcome {
            Outcome::Success => Resolution::Committed,
            Outcome::Failure => Resolution::Reverted,
        }
    }

    /// Silently drop every transaction begun against a version older than
    /// `version`. Returns how many were superseded.
    pub fn supersede_before(&mut self, version: u64) -> usize {
        let before = self.inflight.len();
        self.inflight
            .retain(|_, transaction| transaction.base_version >= version);
        before - self.inflight.len()
    }

    /// Drop and return every transaction whose deadline has passed. The
    /// caller treats each as a failure outcome.
    pub fn expire_overdue(&mut self, now: Instant) -> Vec<Uuid> {
        let expired: Vec<Uuid> = self
            .inflight
            .values()
            .filter(|transaction| transaction.deadline <= now)
            .map(|transaction| transaction.id)
            .collect();
        for id in &expired {
            self.inflight.shift_remove(id);
        }
        expired
    }

    /// Number of transactions currently awaiting resolution.
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mutation() -> Mutation {
        Mutation::RemoveItem { item_id: 1 }
    }

    #[test]
    fn begin_then_success_commits_and_discards() {
        let mut manager = TransactionManager::new(Duration::from_secs(5));
        let now = Instant::now();
        let id = manager.begin(mutation(), 0, now);

        assert_eq!(manager.resolve(id, Outcome::Success), Resolution::Committed);
        assert_eq!(manager.in_flight(), 0);
    }

    #[test]
    fn begin_then_failure_reverts() {
        let mut manager = TransactionManager::new(Duration::from_secs(5));
        let id = manager.begin(mutation(), 0, Instant::now());

        assert_eq!(manager.resolve(id, Outcome::Failure), Resolution::Reverted);
    }

    #[test]
    fn resolving_twice_is_stale() {
        let mut manager = TransactionManager::new(Duration::from_secs(5));
        let id = manager.begin(mutation(), 0, Instant::now());

        manager.resolve(id, Outcome::Success);
        assert_eq!(manager.resolve(id, Outcome::Failure), Resolution::Stale);
    }

    #[test]
    fn snapshots_supersede_older_transactions() {
        let mut manager = TransactionManager::new(Duration::from_secs(5));
        let now = Instant::now();
        let old = manager.begin(mutation(), 3, now);
        let fresh = manager.begin(mutation(), 4, now);

        assert_eq!(manager.supersede_before(4), 1);
        assert_eq!(manager.resolve(old, Outcome::Failure), Resolution::Stale);
        assert_eq!(
            manager.resolve(fresh, Outcome::Success),
            Resolution::Committed
        );
    }

    #[test]
    fn only_overdue_transactions_expire() {
        let mut manager = TransactionManager::new(Duration::from_secs(5));
        let begun_at = Instant::now();
        let overdue = manager.begin(mutation(), 0, begun_at);
        let fresh_at = begun_at + Duration::from_secs(4);
        let fresh = manager.begin(mutation(), 0, fresh_at);

        let expired = manager.expire_overdue(begun_at + Duration::from_secs(6));

        assert_eq!(expired, vec![overdue]);
        assert_eq!(manager.in_flight(), 1);
        assert_eq!(manager.resolve(fresh, Outcome::Success), Resolution::Committed);
    }
}
