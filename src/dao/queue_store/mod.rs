pub mod memory;

use futures::future::BoxFuture;

use crate::dao::models::{QueueItemEntity, RoomEntity};
use crate::dao::storage::StorageResult;

/// Abstraction over the persistence layer for room queues and play history.
///
/// The server treats the backing store as consistent and available; every
/// durable write happens here and nowhere else.
pub trait QueueStore: Send + Sync {
    /// Load the full persisted record of a room, if it exists.
    fn load_room(&self, room_id: String) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>>;
    /// Insert or update a queued item.
    fn save_item(
        &self,
        room_id: String,
        item: QueueItemEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Delete a queued item. History entries referencing it are kept.
    fn remove_item(
        &self,
        room_id: String,
        item_id: u64,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Append an id to the room's play history (at most once).
    fn append_history(
        &self,
        room_id: String,
        item_id: u64,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Record the current playback target and position.
    fn save_playback(
        &self,
        room_id: String,
        current_item_id: Option<u64>,
        position: f64,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Drop all queue and history data for a room.
    fn reset_room(&self, room_id: String) -> BoxFuture<'static, StorageResult<()>>;
    /// Cheap connectivity probe used by the health endpoint.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
