use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::queue::{
    MediaRef, MediaSource, QueueItem, ReadyState, RoomQueueState,
};

/// Origin of a media reference as exposed to clients.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaSourceDto {
    /// Local media library; playable immediately.
    #[default]
    Library,
    /// Remote provider; fetched asynchronously after submission.
    Remote,
}

/// Media readiness as exposed to clients.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReadyStateDto {
    /// Playable.
    Ready,
    /// Still being fetched; shown as "pending", never scheduled.
    Pending,
    /// Fetch failed; shown so the requester can remove the item.
    Failed,
}

/// Projection of a queue item carried in every state broadcast.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct QueueItemSnapshot {
    /// Server-assigned identifier, monotonic in submission order.
    pub item_id: u64,
    /// Participant who submitted the item.
    pub requester_id: Uuid,
    /// Identifier of the media within its source catalog.
    pub media_id: String,
    /// Display title.
    pub title: String,
    /// Optional display artist.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    /// Media duration in seconds.
    pub duration_secs: u32,
    /// Origin of the media content.
    pub source: MediaSourceDto,
    /// Media readiness.
    pub ready: ReadyStateDto,
    /// Submission timestamp (RFC 3339).
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String)]
    pub submitted_at: OffsetDateTime,
}

/// Full authoritative queue state for one room.
///
/// Broadcast on every successful mutation; clients replace their entire
/// local state with it rather than merging.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct QueueStateSnapshot {
    /// Monotonic snapshot version; stale snapshots must be discarded.
    pub version: u64,
    /// Authoritative playback order (longest-wait rotation).
    pub ordered_item_ids: Vec<u64>,
    /// Every queued item, in submission order.
    pub items: Vec<QueueItemSnapshot>,
    /// Append-only record of served item ids.
    pub history: Vec<u64>,
    /// Item currently playing, if any.
    pub current_item_id: Option<u64>,
    /// Playback position within the current item, in seconds.
    pub current_position: f64,
}

impl From<&QueueItem> for QueueItemSnapshot {
    fn from(item: &QueueItem) -> Self {
        Self {
            item_id: item.item_id,
            requester_id: item.requester_id,
            media_id: item.media.media_id.clone(),
            title: item.media.title.clone(),
            artist: item.media.artist.clone(),
            duration_secs: item.media.duration_secs,
            source: match item.media.source {
                MediaSource::Library => MediaSourceDto::Library,
                MediaSource::Remote => MediaSourceDto::Remote,
            },
            ready: match item.ready {
                ReadyState::Ready => ReadyStateDto::Ready,
                ReadyState::Pending => ReadyStateDto::Pending,
                ReadyState::Failed => ReadyStateDto::Failed,
            },
            submitted_at: item.submitted_at,
        }
    }
}

impl From<QueueItemSnapshot> for QueueItem {
    fn from(snapshot: QueueItemSnapshot) -> Self {
        Self {
            item_id: snapshot.item_id,
            requester_id: snapshot.requester_id,
            media: MediaRef {
                media_id: snapshot.media_id,
                title: snapshot.title,
                artist: snapshot.artist,
                duration_secs: snapshot.duration_secs,
                source: match snapshot.source {
                    MediaSourceDto::Library => MediaSource::Library,
                    MediaSourceDto::Remote => MediaSource::Remote,
                },
            },
            ready: match snapshot.ready {
                ReadyStateDto::Ready => ReadyState::Ready,
                ReadyStateDto::Pending => ReadyState::Pending,
                ReadyStateDto::Failed => ReadyState::Failed,
            },
            submitted_at: snapshot.submitted_at,
        }
    }
}

impl From<&RoomQueueState> for QueueStateSnapshot {
    fn from(state: &RoomQueueState) -> Self {
        Self {
            version: state.version(),
            ordered_item_ids: state.playback_order(),
            items: state.items().values().map(QueueItemSnapshot::from).collect(),
            history: state.history().to_vec(),
            current_item_id: state.current_item_id(),
            current_position: state.current_position(),
        }
    }
}

impl QueueStateSnapshot {
    /// Rebuild a client-side replica state from this snapshot.
    pub fn to_replica_state(&self) -> RoomQueueState {
        RoomQueueState::replica(
            self.items.iter().cloned().map(QueueItem::from).collect(),
            self.history.clone(),
            self.current_item_id,
            self.current_position,
            self.version,
        )
    }
}
