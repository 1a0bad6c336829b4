use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};
use tracing::warn;

use crate::{
    dao::{models::QueueItemEntity, queue_store::QueueStore},
    dto::common::QueueStateSnapshot,
    error::ServiceError,
    state::queue::{AppliedEffect, Mutation, RequesterCtx, RoomQueueState},
};

/// Authoritative owner of one room's queue.
///
/// The queue state lives behind a fair mutex, so mutations are applied one
/// at a time in receipt order by a single logical owner. Every successful
/// mutation produces a full snapshot broadcast to all subscribers; failed
/// mutations broadcast nothing.
pub struct Room {
    room_id: String,
    state: Mutex<RoomQueueState>,
    events: broadcast::Sender<QueueStateSnapshot>,
}

impl Room {
    /// Wrap a queue state as the authoritative owner for `room_id`.
    pub fn new(room_id: String, state: RoomQueueState, broadcast_capacity: usize) -> Self {
        let (events, _receiver) = broadcast::channel(broadcast_capacity);
        Self {
            room_id,
            state: Mutex::new(state),
            events,
        }
    }

    /// Identifier of the room this owner serves.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Register a subscriber that will receive subsequent state broadcasts.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueStateSnapshot> {
        self.events.subscribe()
    }

    /// Produce a full snapshot of the current state.
    pub async fn snapshot(&self) -> QueueStateSnapshot {
        let guard = self.state.lock().await;
        QueueStateSnapshot::from(&*guard)
    }

    /// Validate and apply a mutation, persist its durable effect, and
    /// broadcast the recomputed state to every subscriber.
    ///
    /// Returns the snapshot produced by the mutation so the caller can
    /// acknowledge the originating requester.
    pub async fn mutate(
        &self,
        ctx: &RequesterCtx,
        mutation: Mutation,
        max_items: usize,
        store: &Arc<dyn QueueStore>,
    ) -> Result<QueueStateSnapshot, ServiceError> {
        let mut guard = self.state.lock().await;
        let effect = guard.apply(ctx, mutation, max_items)?;
        self.persist(store, &effect, &guard).await;
        let snapshot = QueueStateSnapshot::from(&*guard);
        drop(guard);

        // Nobody subscribed yet is fine; the send error carries no signal.
        let _ = self.events.send(snapshot.clone());

        Ok(snapshot)
    }

    /// Write the durable side of an applied mutation through the store.
    ///
    /// The in-memory state is already authoritative at this point; a failing
    /// backend write is logged and does not fail the mutation.
    async fn persist(
        &self,
        store: &Arc<dyn QueueStore>,
        effect: &AppliedEffect,
        state: &RoomQueueState,
    ) {
        let room_id = self.room_id.clone();
        let result = match effect {
            AppliedEffect::ItemAdded(item) => {
                store
                    .save_item(room_id, QueueItemEntity::from(item))
                    .await
            }
            AppliedEffect::ItemRemoved(item_id) => store.remove_item(room_id, *item_id).await,
            AppliedEffect::Advanced { current } => {
                let mut result = Ok(());
                if let Some(current) = current {
                    result = store.append_history(room_id.clone(), *current).await;
                }
                if result.is_ok() {
                    result = store.save_playback(room_id, *current, 0.0).await;
                }
                result
            }
            AppliedEffect::PositionSet(position) => {
                store
                    .save_playback(room_id, state.current_item_id(), *position)
                    .await
            }
            AppliedEffect::ReadinessChanged(item_id) => match state.items().get(item_id) {
                Some(item) => store.save_item(room_id, QueueItemEntity::from(item)).await,
                None => Ok(()),
            },
            AppliedEffect::RoomCleared => store.reset_room(room_id).await,
        };

        if let Err(err) = result {
            warn!(room_id = %self.room_id, error = %err, "failed to persist queue mutation");
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::{
        dao::queue_store::memory::MemoryQueueStore,
        state::queue::{MediaRef, MediaSource, Role},
    };

    fn store() -> Arc<dyn QueueStore> {
        Arc::new(MemoryQueueStore::new())
    }

    fn host() -> RequesterCtx {
        RequesterCtx {
            requester_id: Uuid::new_v4(),
            role: Role::Host,
        }
    }

    fn add_mutation(media_id: &str) -> Mutation {
        Mutation::AddItem {
            media: MediaRef {
                media_id: media_id.into(),
                title: format!("title {media_id}"),
                artist: None,
                duration_secs: 90,
                source: MediaSource::Library,
            },
        }
    }

    #[tokio::test]
    async fn successful_mutations_broadcast_versioned_snapshots() {
        let room = Room::new("room".into(), RoomQueueState::new(), 16);
        let store = store();
        let ctx = host();
        let mut receiver = room.subscribe();

        let first = room
            .mutate(&ctx, add_mutation("m1"), 100, &store)
            .await
            .unwrap();
        let second = room
            .mutate(&ctx, add_mutation("m2"), 100, &store)
            .await
            .unwrap();

        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_eq!(receiver.recv().await.unwrap(), first);
        assert_eq!(receiver.recv().await.unwrap(), second);
    }

    #[tokio::test]
    async fn rejected_mutations_broadcast_nothing() {
        let room = Room::new("room".into(), RoomQueueState::new(), 16);
        let store = store();
        let ctx = host();
        let mut receiver = room.subscribe();

        let err = room
            .mutate(&ctx, Mutation::RemoveItem { item_id: 99 }, 100, &store)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::NotFound(_)));
        assert!(receiver.try_recv().is_err());
        assert_eq!(room.snapshot().await.version, 0);
    }

    #[tokio::test]
    async fn mutations_write_through_to_the_store() {
        let memory = Arc::new(MemoryQueueStore::new());
        let store: Arc<dyn QueueStore> = memory.clone();
        let room = Room::new("room".into(), RoomQueueState::new(), 16);
        let ctx = host();

        room.mutate(&ctx, add_mutation("m1"), 100, &store)
            .await
            .unwrap();
        room.mutate(&ctx, Mutation::Advance, 100, &store)
            .await
            .unwrap();

        let persisted = memory.load_room("room".into()).await.unwrap().unwrap();
        assert_eq!(persisted.items.len(), 1);
        assert_eq!(persisted.history, vec![1]);
        assert_eq!(persisted.current_item_id, Some(1));
    }
}
