use indexmap::IndexMap;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::dao::models::{MediaSourceEntity, QueueItemEntity, ReadyStateEntity, RoomEntity};
use crate::state::scheduler::{self, RotationPolicy};

/// Identifier of a queued item, assigned by the server in submission order.
pub type ItemId = u64;
/// Identifier of a participant allowed to submit queue items.
pub type RequesterId = Uuid;

/// First identifier of the range reserved for speculative client-side items.
///
/// Server-assigned ids grow upward from 1, so a replica allocating upward
/// from this base can never collide with an authoritative id.
pub const SPECULATIVE_ID_BASE: ItemId = 1 << 63;

/// Whether an item's underlying media is available for playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// Media is fetched and playable.
    Ready,
    /// Media is still being fetched; the item is visible but not schedulable.
    Pending,
    /// The fetch failed; the item stays visible so the requester can remove it.
    Failed,
}

/// Where a media reference originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSource {
    /// Local media library; playable immediately.
    Library,
    /// Remote provider; content is fetched asynchronously after submission.
    Remote,
}

/// Opaque reference to playable content and its duration.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRef {
    /// Identifier of the media within its source catalog.
    pub media_id: String,
    /// Display title.
    pub title: String,
    /// Optional display artist.
    pub artist: Option<String>,
    /// Total duration of the media in seconds.
    pub duration_secs: u32,
    /// Origin of the media content.
    pub source: MediaSource,
}

/// A single entry of a room's queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    /// Unique, monotonically increasing identifier (defines arrival order).
    pub item_id: ItemId,
    /// Participant who submitted the item.
    pub requester_id: RequesterId,
    /// The playable content.
    pub media: MediaRef,
    /// Media readiness; only ready items are scheduled for playback.
    pub ready: ReadyState,
    /// Wall-clock submission timestamp, for display and auditing.
    pub submitted_at: OffsetDateTime,
}

impl QueueItem {
    /// Whether the item is eligible for the playback order.
    pub fn is_ready(&self) -> bool {
        self.ready == ReadyState::Ready
    }
}

/// Privilege level of a connected requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Regular participant: may add items and remove their own.
    Guest,
    /// Room host: runs the player and may apply privileged mutations.
    Host,
}

impl Role {
    /// Whether this role carries host privileges.
    pub fn is_host(self) -> bool {
        self == Role::Host
    }
}

/// Identity and privilege of the requester applying a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequesterCtx {
    /// Stable identifier of the requester.
    pub requester_id: RequesterId,
    /// Declared privilege level.
    pub role: Role,
}

/// Result reported by the asynchronous media fetch boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The media was fetched and is playable.
    Fetched,
    /// The fetch failed permanently.
    Failed,
}

/// A state-changing operation proposed by a requester.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Submit a new item to the queue.
    AddItem {
        /// The content to enqueue.
        media: MediaRef,
    },
    /// Remove an item (its history entry, if any, is left in place).
    RemoveItem {
        /// Item to remove.
        item_id: ItemId,
    },
    /// Move playback to the next scheduled item (host only).
    Advance,
    /// Report playback progress within the current item (host only).
    SetPosition {
        /// Position in seconds from the start of the current item.
        position: f64,
    },
    /// Report the outcome of an asynchronous media fetch (host only).
    SetReady {
        /// Item whose media was fetched.
        item_id: ItemId,
        /// Whether the fetch succeeded.
        outcome: FetchOutcome,
    },
    /// Clear the queue, history, and playback position (host only).
    Reset,
}

/// Error rejecting a mutation before it touches the queue state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    /// The referenced item does not exist.
    #[error("item `{0}` does not exist")]
    UnknownItem(ItemId),
    /// The item belongs to another requester and the actor is not the host.
    #[error("item `{0}` belongs to another requester")]
    NotOwner(ItemId),
    /// The mutation requires host privileges.
    #[error("mutation requires the host role")]
    HostOnly,
    /// The room queue reached its configured capacity.
    #[error("queue is full ({0} items)")]
    QueueFull(usize),
    /// The media reference failed domain validation.
    #[error("invalid media reference: {0}")]
    InvalidMedia(String),
    /// A playback mutation arrived while nothing is playing.
    #[error("nothing is currently playing")]
    NothingPlaying,
}

/// Durable side effect implied by a successfully applied mutation.
///
/// The owning room translates these into repository calls; the client
/// replica ignores them (its state is provisional by definition).
#[derive(Debug, Clone, PartialEq)]
pub enum AppliedEffect {
    /// A new item was appended and must be persisted.
    ItemAdded(QueueItem),
    /// An item was deleted from the canonical collection.
    ItemRemoved(ItemId),
    /// Playback advanced; when `current` is set it was appended to history.
    Advanced {
        /// The item now playing, if the queue was not exhausted.
        current: Option<ItemId>,
    },
    /// Playback position changed.
    PositionSet(f64),
    /// An item's readiness changed and must be re-persisted.
    ReadinessChanged(ItemId),
    /// The room was reset to an empty session.
    RoomCleared,
}

/// Aggregate queue state for a single room.
///
/// Owned exclusively by the authoritative server process for the room;
/// requesters hold read-only replicas reconciled through broadcasts. All
/// mutation goes through [`RoomQueueState::apply`], which is pure with
/// respect to everything but this struct, so the same semantics drive both
/// the authoritative copy and speculative client-side copies.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomQueueState {
    items: IndexMap<ItemId, QueueItem>,
    history: Vec<ItemId>,
    current_item_id: Option<ItemId>,
    current_position: f64,
    version: u64,
    next_item_id: ItemId,
}

impl Default for RoomQueueState {
    fn default() -> Self {
        Self {
            items: IndexMap::new(),
            history: Vec::new(),
            current_item_id: None,
            current_position: 0.0,
            version: 0,
            next_item_id: 1,
        }
    }
}

impl RoomQueueState {
    /// Create the state of a brand-new room.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the authoritative state from persisted parts.
    ///
    /// Items must be given in submission order. The id counter resumes past
    /// the highest persisted id so identifiers stay monotonic across
    /// restarts.
    pub fn restore(
        items: Vec<QueueItem>,
        history: Vec<ItemId>,
        current_item_id: Option<ItemId>,
        current_position: f64,
    ) -> Self {
        let next_item_id = items.iter().map(|item| item.item_id).max().unwrap_or(0) + 1;
        Self {
            items: items
                .into_iter()
                .map(|item| (item.item_id, item))
                .collect(),
            history,
            current_item_id,
            current_position,
            version: 0,
            next_item_id,
        }
    }

    /// Rebuild a client-side replica from an authoritative snapshot.
    ///
    /// Speculative additions allocate ids from [`SPECULATIVE_ID_BASE`]
    /// upward so they can never shadow a server-assigned id.
    pub fn replica(
        items: Vec<QueueItem>,
        history: Vec<ItemId>,
        current_item_id: Option<ItemId>,
        current_position: f64,
        version: u64,
    ) -> Self {
        Self {
            items: items
                .into_iter()
                .map(|item| (item.item_id, item))
                .collect(),
            history,
            current_item_id,
            current_position,
            version,
            next_item_id: SPECULATIVE_ID_BASE,
        }
    }

    /// Currently queued items, in submission order.
    pub fn items(&self) -> &IndexMap<ItemId, QueueItem> {
        &self.items
    }

    /// Append-only record of served item ids.
    pub fn history(&self) -> &[ItemId] {
        &self.history
    }

    /// Item currently playing, if any.
    pub fn current_item_id(&self) -> Option<ItemId> {
        self.current_item_id
    }

    /// Playback position within the current item, in seconds.
    pub fn current_position(&self) -> f64 {
        self.current_position
    }

    /// Monotonic snapshot version, bumped on every successful mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Authoritative playback order (longest-wait rotation).
    pub fn playback_order(&self) -> Vec<ItemId> {
        scheduler::compute_order(
            &self.items,
            &self.history,
            self.current_item_id,
            RotationPolicy::LongestWaitRoundRobin,
        )
    }

    /// Stable "what's next" preview order (arrival rotation).
    pub fn preview_order(&self) -> Vec<ItemId> {
        scheduler::compute_order(
            &self.items,
            &self.history,
            self.current_item_id,
            RotationPolicy::ArrivalRoundRobin,
        )
    }

    /// Validate and apply a mutation, bumping the version on success.
    ///
    /// Rejected mutations leave the state untouched, including the version
    /// counter.
    pub fn apply(
        &mut self,
        ctx: &RequesterCtx,
        mutation: Mutation,
        max_items: usize,
    ) -> Result<AppliedEffect, MutationError> {
        let effect = match mutation {
            Mutation::AddItem { media } => self.add_item(ctx, media, max_items)?,
            Mutation::RemoveItem { item_id } => self.remove_item(ctx, item_id)?,
            Mutation::Advance => self.advance(ctx)?,
            Mutation::SetPosition { position } => self.set_position(ctx, position)?,
            Mutation::SetReady { item_id, outcome } => self.set_ready(ctx, item_id, outcome)?,
            Mutation::Reset => self.reset(ctx)?,
        };

        self.version += 1;
        Ok(effect)
    }

    fn add_item(
        &mut self,
        ctx: &RequesterCtx,
        media: MediaRef,
        max_items: usize,
    ) -> Result<AppliedEffect, MutationError> {
        if media.media_id.trim().is_empty() {
            return Err(MutationError::InvalidMedia("media id is empty".into()));
        }
        if media.duration_secs == 0 {
            return Err(MutationError::InvalidMedia(
                "duration must be strictly positive".into(),
            ));
        }
        if self.items.len() >= max_items {
            return Err(MutationError::QueueFull(max_items));
        }

        let ready = match media.source {
            MediaSource::Library => ReadyState::Ready,
            MediaSource::Remote => ReadyState::Pending,
        };
        let item = QueueItem {
            item_id: self.next_item_id,
            requester_id: ctx.requester_id,
            media,
            ready,
            submitted_at: OffsetDateTime::now_utc(),
        };
        self.next_item_id += 1;
        self.items.insert(item.item_id, item.clone());

        Ok(AppliedEffect::ItemAdded(item))
    }

    fn remove_item(
        &mut self,
        ctx: &RequesterCtx,
        item_id: ItemId,
    ) -> Result<AppliedEffect, MutationError> {
        let item = self
            .items
            .get(&item_id)
            .ok_or(MutationError::UnknownItem(item_id))?;
        if item.requester_id != ctx.requester_id && !ctx.role.is_host() {
            return Err(MutationError::NotOwner(item_id));
        }

        // shift_remove keeps the submission order of the remaining items.
        // The history entry, if any, stays: future scheduler passes skip it.
        self.items.shift_remove(&item_id);

        Ok(AppliedEffect::ItemRemoved(item_id))
    }

    fn advance(&mut self, ctx: &RequesterCtx) -> Result<AppliedEffect, MutationError> {
        if !ctx.role.is_host() {
            return Err(MutationError::HostOnly);
        }

        let order = self.playback_order();
        let next = order
            .iter()
            .copied()
            .find(|id| !self.history.contains(id));

        self.current_item_id = next;
        self.current_position = 0.0;
        if let Some(next) = next {
            // History records "played or currently playing": the new current
            // item is committed the moment it starts.
            self.history.push(next);
        }

        Ok(AppliedEffect::Advanced { current: next })
    }

    fn set_position(
        &mut self,
        ctx: &RequesterCtx,
        position: f64,
    ) -> Result<AppliedEffect, MutationError> {
        if !ctx.role.is_host() {
            return Err(MutationError::HostOnly);
        }
        if self.current_item_id.is_none() {
            return Err(MutationError::NothingPlaying);
        }

        self.current_position = position.max(0.0);
        Ok(AppliedEffect::PositionSet(self.current_position))
    }

    fn set_ready(
        &mut self,
        ctx: &RequesterCtx,
        item_id: ItemId,
        outcome: FetchOutcome,
    ) -> Result<AppliedEffect, MutationError> {
        if !ctx.role.is_host() {
            return Err(MutationError::HostOnly);
        }
        let item = self
            .items
            .get_mut(&item_id)
            .ok_or(MutationError::UnknownItem(item_id))?;

        item.ready = match outcome {
            FetchOutcome::Fetched => ReadyState::Ready,
            FetchOutcome::Failed => ReadyState::Failed,
        };

        Ok(AppliedEffect::ReadinessChanged(item_id))
    }

    fn reset(&mut self, ctx: &RequesterCtx) -> Result<AppliedEffect, MutationError> {
        if !ctx.role.is_host() {
            return Err(MutationError::HostOnly);
        }

        self.items.clear();
        self.history.clear();
        self.current_item_id = None;
        self.current_position = 0.0;
        // The id counter and version keep growing so stale clients can never
        // confuse a post-reset state with a pre-reset one.

        Ok(AppliedEffect::RoomCleared)
    }
}

impl From<QueueItemEntity> for QueueItem {
    fn from(entity: QueueItemEntity) -> Self {
        Self {
            item_id: entity.item_id,
            requester_id: entity.requester_id,
            media: MediaRef {
                media_id: entity.media_id,
                title: entity.title,
                artist: entity.artist,
                duration_secs: entity.duration_secs,
                source: match entity.source {
                    MediaSourceEntity::Library => MediaSource::Library,
                    MediaSourceEntity::Remote => MediaSource::Remote,
                },
            },
            ready: match entity.ready {
                ReadyStateEntity::Ready => ReadyState::Ready,
                ReadyStateEntity::Pending => ReadyState::Pending,
                ReadyStateEntity::Failed => ReadyState::Failed,
            },
            submitted_at: entity.submitted_at,
        }
    }
}

impl From<&QueueItem> for QueueItemEntity {
    fn from(item: &QueueItem) -> Self {
        Self {
            item_id: item.item_id,
            requester_id: item.requester_id,
            media_id: item.media.media_id.clone(),
            title: item.media.title.clone(),
            artist: item.media.artist.clone(),
            duration_secs: item.media.duration_secs,
            source: match item.media.source {
                MediaSource::Library => MediaSourceEntity::Library,
                MediaSource::Remote => MediaSourceEntity::Remote,
            },
            ready: match item.ready {
                ReadyState::Ready => ReadyStateEntity::Ready,
                ReadyState::Pending => ReadyStateEntity::Pending,
                ReadyState::Failed => ReadyStateEntity::Failed,
            },
            submitted_at: item.submitted_at,
        }
    }
}

impl From<RoomEntity> for RoomQueueState {
    fn from(entity: RoomEntity) -> Self {
        Self::restore(
            entity.items.into_iter().map(Into::into).collect(),
            entity.history,
            entity.current_item_id,
            entity.current_position,
        )
    }
}
