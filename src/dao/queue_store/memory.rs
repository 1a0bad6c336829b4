//! In-memory reference backend for [`QueueStore`].
//!
//! Keeps every room record in a process-local map. Suitable for single-node
//! deployments and tests; a durable backend plugs in behind the same trait.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::dao::models::{QueueItemEntity, RoomEntity};
use crate::dao::queue_store::QueueStore;
use crate::dao::storage::StorageResult;

/// Process-local [`QueueStore`] implementation.
#[derive(Default)]
pub struct MemoryQueueStore {
    rooms: Arc<DashMap<String, RoomEntity>>,
}

impl MemoryQueueStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_room<T>(
        &self,
        room_id: String,
        apply: impl FnOnce(&mut RoomEntity) -> T + Send + 'static,
    ) -> BoxFuture<'static, StorageResult<T>>
    where
        T: Send + 'static,
    {
        let rooms = Arc::clone(&self.rooms);
        Box::pin(async move {
            let mut room = rooms
                .entry(room_id.clone())
                .or_insert_with(|| RoomEntity::empty(room_id));
            Ok(apply(room.value_mut()))
        })
    }
}

impl QueueStore for MemoryQueueStore {
    fn load_room(&self, room_id: String) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let rooms = Arc::clone(&self.rooms);
        Box::pin(async move { Ok(rooms.get(&room_id).map(|room| room.value().clone())) })
    }

    fn save_item(
        &self,
        room_id: String,
        item: QueueItemEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.with_room(room_id, move |room| {
            match room
                .items
                .iter_mut()
                .find(|existing| existing.item_id == item.item_id)
            {
                Some(existing) => *existing = item,
                None => room.items.push(item),
            }
        })
    }

    fn remove_item(
        &self,
        room_id: String,
        item_id: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.with_room(room_id, move |room| {
            room.items.retain(|item| item.item_id != item_id);
        })
    }

    fn append_history(
        &self,
        room_id: String,
        item_id: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.with_room(room_id, move |room| {
            // An id enters the history at most once per room session.
            if !room.history.contains(&item_id) {
                room.history.push(item_id);
            }
        })
    }

    fn save_playback(
        &self,
        room_id: String,
        current_item_id: Option<u64>,
        position: f64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.with_room(room_id, move |room| {
            room.current_item_id = current_item_id;
            room.current_position = position;
        })
    }

    fn reset_room(&self, room_id: String) -> BoxFuture<'static, StorageResult<()>> {
        let rooms = Arc::clone(&self.rooms);
        Box::pin(async move {
            rooms.remove(&room_id);
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::*;
    use crate::dao::models::{MediaSourceEntity, ReadyStateEntity};

    fn entity(item_id: u64) -> QueueItemEntity {
        QueueItemEntity {
            item_id,
            requester_id: Uuid::new_v4(),
            media_id: format!("media-{item_id}"),
            title: format!("song {item_id}"),
            artist: None,
            duration_secs: 120,
            source: MediaSourceEntity::Library,
            ready: ReadyStateEntity::Ready,
            submitted_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[tokio::test]
    async fn items_round_trip_in_submission_order() {
        let store = MemoryQueueStore::new();
        store.save_item("room".into(), entity(1)).await.unwrap();
        store.save_item("room".into(), entity(2)).await.unwrap();

        let room = store.load_room("room".into()).await.unwrap().unwrap();
        let ids: Vec<u64> = room.items.iter().map(|item| item.item_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn save_item_upserts_readiness_changes() {
        let store = MemoryQueueStore::new();
        store.save_item("room".into(), entity(1)).await.unwrap();

        let mut updated = entity(1);
        updated.ready = ReadyStateEntity::Failed;
        store.save_item("room".into(), updated).await.unwrap();

        let room = store.load_room("room".into()).await.unwrap().unwrap();
        assert_eq!(room.items.len(), 1);
        assert_eq!(room.items[0].ready, ReadyStateEntity::Failed);
    }

    #[tokio::test]
    async fn history_appends_are_deduplicated() {
        let store = MemoryQueueStore::new();
        store.append_history("room".into(), 1).await.unwrap();
        store.append_history("room".into(), 1).await.unwrap();
        store.append_history("room".into(), 2).await.unwrap();

        let room = store.load_room("room".into()).await.unwrap().unwrap();
        assert_eq!(room.history, vec![1, 2]);
    }

    #[tokio::test]
    async fn removing_an_item_keeps_its_history_entry() {
        let store = MemoryQueueStore::new();
        store.save_item("room".into(), entity(1)).await.unwrap();
        store.append_history("room".into(), 1).await.unwrap();

        store.remove_item("room".into(), 1).await.unwrap();

        let room = store.load_room("room".into()).await.unwrap().unwrap();
        assert!(room.items.is_empty());
        assert_eq!(room.history, vec![1]);
    }

    #[tokio::test]
    async fn reset_drops_the_room_record() {
        let store = MemoryQueueStore::new();
        store.save_item("room".into(), entity(1)).await.unwrap();
        store.reset_room("room".into()).await.unwrap();

        assert!(store.load_room("room".into()).await.unwrap().is_none());
    }
}
