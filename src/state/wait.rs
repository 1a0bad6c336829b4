//! Expected wait times along a computed playback order.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::state::queue::{ItemId, QueueItem};

/// Compute the expected wait, in whole seconds, for every upcoming item of
/// `order`.
///
/// Served history entries receive no wait; the currently playing item waits
/// zero and contributes only its remaining time to the items behind it. When
/// nothing is playing (or the current item was removed from `items`), waits
/// accumulate from zero starting at the first unserved item. The resulting
/// waits are non-decreasing along the order.
pub fn compute_waits(
    order: &[ItemId],
    items: &IndexMap<ItemId, QueueItem>,
    history: &[ItemId],
    current_item_id: Option<ItemId>,
    current_position: f64,
) -> IndexMap<ItemId, u64> {
    let served: HashSet<ItemId> = history.iter().copied().collect();
    let playing = current_item_id.filter(|id| order.contains(id));

    let mut waits = IndexMap::new();
    let mut reached_current = playing.is_none();
    let mut cumulative: u64 = 0;
    let mut next_duration: u64 = 0;

    for &id in order {
        if playing == Some(id) {
            let Some(item) = items.get(&id) else {
                continue;
            };
            waits.insert(id, 0);
            next_duration = remaining_secs(item, current_position);
            reached_current = true;
            continue;
        }
        if !reached_current || served.contains(&id) {
            continue;
        }
        let Some(item) = items.get(&id) else {
            continue;
        };

        cumulative += next_duration;
        waits.insert(id, cumulative);
        next_duration = u64::from(item.media.duration_secs);
    }

    waits
}

/// Remaining playback time of `item`, clamped to zero when the reported
/// position overshoots the duration.
fn remaining_secs(item: &QueueItem, position: f64) -> u64 {
    let remaining = f64::from(item.media.duration_secs) - position;
    if remaining <= 0.0 {
        0
    } else {
        remaining.round() as u64
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::*;
    use crate::state::queue::{MediaRef, MediaSource, ReadyState};

    fn item(item_id: ItemId, duration_secs: u32) -> QueueItem {
        QueueItem {
            item_id,
            requester_id: Uuid::new_v4(),
            media: MediaRef {
                media_id: format!("media-{item_id}"),
                title: format!("song {item_id}"),
                artist: None,
                duration_secs,
                source: MediaSource::Library,
            },
            ready: ReadyState::Ready,
            submitted_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn queue(entries: &[(ItemId, u32)]) -> IndexMap<ItemId, QueueItem> {
        entries
            .iter()
            .map(|&(id, duration)| (id, item(id, duration)))
            .collect()
    }

    #[test]
    fn current_item_waits_zero_and_seeds_remaining_time() {
        let items = queue(&[(1, 180), (2, 240), (3, 120)]);
        let order = vec![1, 2, 3];

        let waits = compute_waits(&order, &items, &[1], Some(1), 60.0);

        assert_eq!(waits[&1], 0);
        assert_eq!(waits[&2], 120, "remaining time of the current item");
        assert_eq!(waits[&3], 120 + 240);
    }

    #[test]
    fn waits_are_monotonic_along_the_order() {
        let items = queue(&[(1, 95), (2, 301), (3, 42), (4, 187), (5, 203)]);
        let order = vec![1, 2, 3, 4, 5];

        let waits = compute_waits(&order, &items, &[1], Some(1), 12.5);

        let values: Vec<u64> = order.iter().map(|id| waits[id]).collect();
        let mut sorted = values.clone();
        sorted.sort_unstable();
        assert_eq!(values, sorted);
    }

    #[test]
    fn served_history_receives_no_wait() {
        let items = queue(&[(1, 100), (2, 100), (3, 100)]);
        let order = vec![1, 2, 3];

        let waits = compute_waits(&order, &items, &[1, 2], Some(2), 30.0);

        assert!(!waits.contains_key(&1));
        assert_eq!(waits[&2], 0);
        assert_eq!(waits[&3], 70);
    }

    #[test]
    fn idle_playback_starts_waits_at_zero() {
        let items = queue(&[(1, 100), (2, 200)]);
        let order = vec![1, 2];

        let waits = compute_waits(&order, &items, &[], None, 0.0);

        assert_eq!(waits[&1], 0);
        assert_eq!(waits[&2], 100);
    }

    #[test]
    fn overshot_position_clamps_remaining_time_to_zero() {
        let items = queue(&[(1, 100), (2, 50)]);
        let order = vec![1, 2];

        let waits = compute_waits(&order, &items, &[1], Some(1), 250.0);

        assert_eq!(waits[&2], 0);
    }

    #[test]
    fn removed_current_item_degrades_to_idle_counting() {
        let items = queue(&[(2, 100), (3, 150)]);
        // Item 1 was playing but has been removed from the collection; its
        // history entry keeps it out of the upcoming waits.
        let order = vec![2, 3];

        let waits = compute_waits(&order, &items, &[1], Some(1), 40.0);

        assert_eq!(waits[&2], 0);
        assert_eq!(waits[&3], 100);
    }
}
