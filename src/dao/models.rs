use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Origin of a media reference as stored by the persistence layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaSourceEntity {
    /// Local media library.
    Library,
    /// Asynchronously fetched remote provider.
    Remote,
}

/// Readiness of an item's media as stored by the persistence layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReadyStateEntity {
    /// Media fetched and playable.
    Ready,
    /// Fetch still in progress.
    Pending,
    /// Fetch failed permanently.
    Failed,
}

/// Queue item representation shared between storage backends and the state
/// layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueItemEntity {
    /// Monotonically increasing identifier assigned at submission time.
    pub item_id: u64,
    /// Participant who submitted the item.
    pub requester_id: Uuid,
    /// Identifier of the media within its source catalog.
    pub media_id: String,
    /// Display title.
    pub title: String,
    /// Optional display artist.
    pub artist: Option<String>,
    /// Media duration in seconds.
    pub duration_secs: u32,
    /// Origin of the media content.
    pub source: MediaSourceEntity,
    /// Media readiness.
    pub ready: ReadyStateEntity,
    /// Submission timestamp.
    pub submitted_at: OffsetDateTime,
}

/// Aggregate room entity persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomEntity {
    /// Identifier of the room.
    pub room_id: String,
    /// Queued items in submission order.
    pub items: Vec<QueueItemEntity>,
    /// Ordered, append-only record of served item ids.
    pub history: Vec<u64>,
    /// Item currently playing, if any.
    pub current_item_id: Option<u64>,
    /// Playback position within the current item, in seconds.
    pub current_position: f64,
}

impl RoomEntity {
    /// An empty room record for a freshly created room.
    pub fn empty(room_id: String) -> Self {
        Self {
            room_id,
            items: Vec::new(),
            history: Vec::new(),
            current_item_id: None,
            current_position: 0.0,
        }
    }
}
