//! Fair-rotation ordering of a room's queue.
//!
//! Both policies are pure functions of their inputs: calling them twice with
//! the same items, history, and current item yields the same order. The
//! served history is an anchor, reproduced verbatim at the front of every
//! computed order minus ids that were removed from the item collection.

use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;

use crate::state::queue::{ItemId, QueueItem, RequesterId};

/// Fairness policy applied when ordering pending items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPolicy {
    /// Round-robin over requesters in order of first appearance among the
    /// pending items. Ignores serve history beyond the anchor, which keeps
    /// the "what's next" preview stable while items are added or removed.
    /// Not-ready items are kept so they stay visible in the preview.
    ArrivalRoundRobin,
    /// Serve the requester who has waited longest since their last served
    /// item, counting the actual serve history. Prevents starvation under
    /// uneven submission rates. Not-ready items are excluded entirely.
    LongestWaitRoundRobin,
}

/// Compute a total playback order for the given queue.
///
/// The output starts with the ids of `history` that still exist in `items`,
/// in unchanged relative order, followed by the pending items arranged per
/// `policy`.
pub fn compute_order(
    items: &IndexMap<ItemId, QueueItem>,
    history: &[ItemId],
    current_item_id: Option<ItemId>,
    policy: RotationPolicy,
) -> Vec<ItemId> {
    match policy {
        RotationPolicy::ArrivalRoundRobin => arrival_order(items, history),
        RotationPolicy::LongestWaitRoundRobin => {
            longest_wait_order(items, history, current_item_id)
        }
    }
}

/// History ids still present in `items`, relative order preserved.
fn anchored_history(items: &IndexMap<ItemId, QueueItem>, history: &[ItemId]) -> Vec<ItemId> {
    history
        .iter()
        .copied()
        .filter(|id| items.contains_key(id))
        .collect()
}

fn arrival_order(items: &IndexMap<ItemId, QueueItem>, history: &[ItemId]) -> Vec<ItemId> {
    let mut order = anchored_history(items, history);
    let served: HashSet<ItemId> = history.iter().copied().collect();

    // Per-requester FIFO lanes, requesters keyed in order of first
    // appearance among the remaining items.
    let mut lanes: IndexMap<RequesterId, VecDeque<ItemId>> = IndexMap::new();
    for item in items.values() {
        if served.contains(&item.item_id) {
            continue;
        }
        lanes
            .entry(item.requester_id)
            .or_default()
            .push_back(item.item_id);
    }

    while !lanes.is_empty() {
        let mut exhausted = Vec::new();
        for (requester, lane) in lanes.iter_mut() {
            if let Some(id) = lane.pop_front() {
                order.push(id);
            }
            if lane.is_empty() {
                exhausted.push(*requester);
            }
        }
        for requester in exhausted {
            lanes.shift_remove(&requester);
        }
    }

    order
}

fn longest_wait_order(
    items: &IndexMap<ItemId, QueueItem>,
    history: &[ItemId],
    current_item_id: Option<ItemId>,
) -> Vec<ItemId> {
    let mut order = anchored_history(items, history);
    if let Some(current) = current_item_id {
        // The currently playing item counts as just served. Callers may pass
        // a current id already committed to history; guard the duplicate.
        if items.contains_key(&current) && !order.contains(&current) {
            order.push(current);
        }
    }

    // Requester ids parallel to the extended history, used to measure how
    // long each requester has gone unserved.
    let mut served_by: Vec<RequesterId> = order
        .iter()
        .map(|id| items[id].requester_id)
        .collect();

    let served: HashSet<ItemId> = order.iter().copied().collect();
    let mut pending: Vec<(ItemId, RequesterId)> = items
        .values()
        .filter(|item| item.is_ready() && !served.contains(&item.item_id))
        .map(|item| (item.item_id, item.requester_id))
        .collect();

    while !pending.is_empty() {
        let requester = select_longest_waiting(&pending, &served_by);
        let position = pending
            .iter()
            .position(|(_, candidate)| *candidate == requester)
            .expect("selected requester has a pending item");
        let (item_id, requester_id) = pending.remove(position);
        order.push(item_id);
        served_by.push(requester_id);
    }

    order
}

/// Pick the requester whose last served item lies furthest back, a requester
/// never served at all waiting infinitely long. Ties resolve to the earliest
/// first appearance in `pending`, which makes the selection deterministic
/// for any input.
fn select_longest_waiting(
    pending: &[(ItemId, RequesterId)],
    served_by: &[RequesterId],
) -> RequesterId {
    // `None` models an infinite wait.
    let mut winner: Option<(RequesterId, Option<usize>)> = None;
    let mut seen = HashSet::new();

    for &(_, requester) in pending {
        if !seen.insert(requester) {
            continue;
        }
        let wait = served_by
            .iter()
            .rposition(|served| *served == requester)
            .map(|index| served_by.len() - index);

        let better = match (&winner, &wait) {
            (None, _) => true,
            // An infinite-wait winner only loses to nobody; ties keep the
            // earlier appearance.
            (Some((_, None)), _) => false,
            (Some((_, Some(_))), None) => true,
            (Some((_, Some(best))), Some(candidate)) => candidate > best,
        };
        if better {
            winner = Some((requester, wait));
        }
    }

    winner.expect("pending is non-empty").0
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::*;
    use crate::state::queue::{MediaRef, MediaSource, ReadyState};

    fn item(item_id: ItemId, requester_id: RequesterId, ready: ReadyState) -> QueueItem {
        QueueItem {
            item_id,
            requester_id,
            media: MediaRef {
                media_id: format!("media-{item_id}"),
                title: format!("song {item_id}"),
                artist: None,
                duration_secs: 200,
                source: MediaSource::Library,
            },
            ready,
            submitted_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn queue(entries: &[(ItemId, RequesterId)]) -> IndexMap<ItemId, QueueItem> {
        entries
            .iter()
            .map(|&(id, requester)| (id, item(id, requester, ReadyState::Ready)))
            .collect()
    }

    #[test]
    fn longest_wait_rotates_across_uneven_submissions() {
        // Requesters A, B, C submit a1, a2, b1, c1 in that arrival order.
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let items = queue(&[(1, a), (2, a), (3, b), (4, c)]);

        let order = compute_order(&items, &[], None, RotationPolicy::LongestWaitRoundRobin);

        // a1 first (tie-break: first appearance), then B (infinite wait),
        // then C, then A again.
        assert_eq!(order, vec![1, 3, 4, 2]);
    }

    #[test]
    fn longest_wait_counts_the_serve_history() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        // A was served twice already; B holds the longest wait even though
        // A's next item arrived first.
        let items = queue(&[(1, a), (2, a), (3, a), (4, b), (5, b)]);
        let history = vec![1, 4, 2];

        let order = compute_order(
            &items,
            &history,
            None,
            RotationPolicy::LongestWaitRoundRobin,
        );

        assert_eq!(order, vec![1, 4, 2, 5, 3]);
    }

    #[test]
    fn no_requester_is_served_twice_while_another_waits() {
        let requesters: Vec<RequesterId> = (0..4).map(|_| Uuid::new_v4()).collect();
        // Uneven submissions: requester 0 floods the queue.
        let mut entries = Vec::new();
        let mut next_id = 1;
        for round in 0..5 {
            for (index, requester) in requesters.iter().enumerate() {
                if index == 0 || round < 2 {
                    entries.push((next_id, *requester));
                    next_id += 1;
                }
            }
        }
        let items = queue(&entries);

        let order = compute_order(&items, &[], None, RotationPolicy::LongestWaitRoundRobin);

        // Walk the order and check the fairness property: between two serves
        // of the same requester, every other requester holding a pending item
        // must have been served at least once.
        let mut remaining: IndexMap<RequesterId, usize> = IndexMap::new();
        for &(_, requester) in &entries {
            *remaining.entry(requester).or_default() += 1;
        }
        let mut since_last: IndexMap<RequesterId, HashSet<RequesterId>> = IndexMap::new();
        for id in order {
            let requester = items[&id].requester_id;
            if let Some(served_between) = since_last.get(&requester) {
                for (other, count) in &remaining {
                    if *other != requester && *count > 0 {
                        assert!(
                            served_between.contains(other),
                            "requester served twice while another waited"
                        );
                    }
                }
            }
            *remaining.get_mut(&requester).unwrap() -= 1;
            for (_, served_between) in since_last.iter_mut() {
                served_between.insert(requester);
            }
            since_last.insert(requester, HashSet::new());
        }
    }

    #[test]
    fn history_prefix_is_anchored() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let items = queue(&[(1, a), (2, b), (3, a), (4, b)]);
        let history = vec![2, 1];

        for policy in [
            RotationPolicy::ArrivalRoundRobin,
            RotationPolicy::LongestWaitRoundRobin,
        ] {
            let order = compute_order(&items, &history, None, policy);
            assert_eq!(&order[..2], &[2, 1], "history order must be preserved");
        }
    }

    #[test]
    fn removed_history_ids_are_skipped_without_error() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let items = queue(&[(2, a), (3, b)]);
        // Item 1 was served and then removed from the collection.
        let history = vec![1, 2];

        let order = compute_order(
            &items,
            &history,
            None,
            RotationPolicy::LongestWaitRoundRobin,
        );

        assert_eq!(order, vec![2, 3]);
    }

    #[test]
    fn removing_a_served_item_shifts_later_items_earlier() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut items = queue(&[(1, a), (2, a), (3, b)]);
        let history = vec![1];

        let before = compute_order(
            &items,
            &history,
            None,
            RotationPolicy::LongestWaitRoundRobin,
        );
        let position_before = before.iter().position(|id| *id == 2).unwrap();

        items.shift_remove(&1);
        let after = compute_order(
            &items,
            &history,
            None,
            RotationPolicy::LongestWaitRoundRobin,
        );
        let position_after = after.iter().position(|id| *id == 2).unwrap();

        assert!(position_after < position_before);
    }

    #[test]
    fn not_ready_items_are_excluded_until_ready() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut items = queue(&[(1, a), (3, b)]);
        items.insert(2, item(2, a, ReadyState::Pending));

        let order = compute_order(&items, &[], None, RotationPolicy::LongestWaitRoundRobin);
        assert!(!order.contains(&2), "pending item must not be scheduled");

        items.get_mut(&2).unwrap().ready = ReadyState::Ready;
        let order = compute_order(&items, &[], None, RotationPolicy::LongestWaitRoundRobin);
        assert!(order.contains(&2), "ready item becomes eligible on recompute");
    }

    #[test]
    fn preview_keeps_not_ready_items_visible() {
        let a = Uuid::new_v4();
        let mut items = queue(&[(1, a)]);
        items.insert(2, item(2, a, ReadyState::Pending));

        let order = compute_order(&items, &[], None, RotationPolicy::ArrivalRoundRobin);

        assert_eq!(order, vec![1, 2]);
    }

    #[test]
    fn arrival_round_robin_interleaves_requesters() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let items = queue(&[(1, a), (2, a), (3, a), (4, b), (5, c), (6, b)]);

        let order = compute_order(&items, &[], None, RotationPolicy::ArrivalRoundRobin);

        assert_eq!(order, vec![1, 4, 5, 2, 6, 3]);
    }

    #[test]
    fn current_item_counts_as_just_served() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let items = queue(&[(1, a), (2, a), (3, b)]);

        // Item 1 is playing but not yet committed to history: A was just
        // served, so B goes next.
        let order = compute_order(
            &items,
            &[],
            Some(1),
            RotationPolicy::LongestWaitRoundRobin,
        );

        assert_eq!(order, vec![1, 3, 2]);
    }

    #[test]
    fn compute_order_is_idempotent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let items = queue(&[(1, a), (2, b), (3, a), (4, b), (5, a)]);
        let history = vec![1];

        for policy in [
            RotationPolicy::ArrivalRoundRobin,
            RotationPolicy::LongestWaitRoundRobin,
        ] {
            let first = compute_order(&items, &history, Some(2), policy);
            let second = compute_order(&items, &history, Some(2), policy);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn empty_items_yield_an_empty_order() {
        let items = IndexMap::new();
        let history = vec![1, 2, 3];

        for policy in [
            RotationPolicy::ArrivalRoundRobin,
            RotationPolicy::LongestWaitRoundRobin,
        ] {
            assert!(compute_order(&items, &history, Some(3), policy).is_empty());
        }
    }
}
