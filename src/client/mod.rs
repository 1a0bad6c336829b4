//! Requester-side queue replica with optimistic transactions.
//!
//! A client holds a read-only, possibly stale copy of its room's queue,
//! applies its own mutations speculatively for instant feedback, and
//! reconciles against the authoritative snapshots the server broadcasts.
//! Everything here is a pure state machine with no I/O, shared by the
//! bundled player and the integration tests.

/// Local replica reconciling speculative effects with broadcasts.
pub mod replica;
/// Per-mutation BEGIN/COMMIT/REVERT bookkeeping.
pub mod transaction;
