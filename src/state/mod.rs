pub mod queue;
pub mod room;
pub mod scheduler;
pub mod wait;

use std::sync::Arc;

use dashmap::DashMap;

use crate::{
    config::AppConfig,
    dao::queue_store::QueueStore,
    error::ServiceError,
    state::{queue::RoomQueueState, room::Room},
};

/// Cheaply clonable handle on the central application state.
pub type SharedState = Arc<AppState>;

/// Central application state: configuration, the storage backend, and the
/// registry of live room owners.
pub struct AppState {
    config: AppConfig,
    queue_store: Arc<dyn QueueStore>,
    rooms: DashMap<String, Arc<Room>>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be
    /// cloned cheaply.
    pub fn new(config: AppConfig, queue_store: Arc<dyn QueueStore>) -> SharedState {
        Arc::new(Self {
            config,
            queue_store,
            rooms: DashMap::new(),
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Handle to the storage backend.
    pub fn queue_store(&self) -> Arc<dyn QueueStore> {
        Arc::clone(&self.queue_store)
    }

    /// Fetch the live owner for `room_id`, reviving it from the store (or
    /// creating an empty room) on first touch.
    pub async fn room(&self, room_id: &str) -> Result<Arc<Room>, ServiceError> {
        if let Some(room) = self.rooms.get(room_id) {
            return Ok(Arc::clone(room.value()));
        }

        let state = self
            .queue_store
            .load_room(room_id.to_string())
            .await?
            .map(RoomQueueState::from)
            .unwrap_or_default();
        let room = Arc::new(Room::new(
            room_id.to_string(),
            state,
            self.config.broadcast_capacity(),
        ));

        // Two concurrent first joins may both load; the first insert wins
        // and the loser's copy is discarded before anyone observed it.
        let entry = self.rooms.entry(room_id.to_string()).or_insert(room);
        Ok(Arc::clone(entry.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::queue_store::memory::MemoryQueueStore;

    #[tokio::test]
    async fn room_registry_returns_the_same_owner() {
        let state = AppState::new(
            AppConfig::default(),
            Arc::new(MemoryQueueStore::new()),
        );

        let first = state.room("friday").await.unwrap();
        let second = state.room("friday").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn rooms_are_revived_from_the_store() {
        let store = Arc::new(MemoryQueueStore::new());
        store.append_history("friday".into(), 7).await.unwrap();
        let state = AppState::new(AppConfig::default(), store);

        let room = state.room("friday").await.unwrap();
        let snapshot = room.snapshot().await;

        assert_eq!(snapshot.history, vec![7]);
    }
}
