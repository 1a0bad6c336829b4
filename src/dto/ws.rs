use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dto::{
        common::{MediaSourceDto, QueueStateSnapshot},
        validation::validate_room_id,
    },
    state::queue::{FetchOutcome, MediaRef, MediaSource, Mutation, Role},
};

/// Error raised while decoding an inbound WebSocket frame.
#[derive(Debug, Error)]
pub enum MessageParseError {
    /// The payload was not valid JSON for any known message shape.
    #[error("invalid message payload: {0}")]
    Json(#[from] serde_json::Error),
    /// The payload decoded but failed field validation.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

/// Messages accepted from requester WebSocket clients.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequesterInboundMessage {
    /// First frame of every connection: who is joining which room.
    Identification(IdentificationRequest),
    /// A proposed queue mutation carrying its client transaction id.
    Mutation(MutationRequest),
    /// Unrecognised message type, ignored with a warning.
    #[serde(other)]
    Unknown,
}

impl RequesterInboundMessage {
    /// Parse and validate an inbound frame in one step.
    pub fn from_json_str(payload: &str) -> Result<Self, MessageParseError> {
        let message: Self = serde_json::from_str(payload)?;
        match &message {
            Self::Identification(request) => request.validate()?,
            Self::Mutation(request) => request.validate()?,
            Self::Unknown => {}
        }
        Ok(message)
    }
}

/// Identification payload sent as the first frame of a connection.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct IdentificationRequest {
    /// Room the requester wants to join.
    pub room_id: String,
    /// Stable requester id from a previous session; omitted on first join.
    pub requester_id: Option<Uuid>,
    /// Declared privilege level.
    #[serde(default)]
    pub role: RoleDto,
}

impl Validate for IdentificationRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(err) = validate_room_id(&self.room_id) {
            errors.add("room_id", err);
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Privilege level declared by a connecting requester.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoleDto {
    /// Regular participant.
    #[default]
    Guest,
    /// Room host running the player.
    Host,
}

impl From<RoleDto> for Role {
    fn from(role: RoleDto) -> Self {
        match role {
            RoleDto::Guest => Role::Guest,
            RoleDto::Host => Role::Host,
        }
    }
}

/// A queue mutation proposed by a requester.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct MutationRequest {
    /// Client-generated transaction id echoed back in the acknowledgement.
    pub transaction_id: Uuid,
    /// The operation to apply.
    pub mutation: MutationDto,
}

impl Validate for MutationRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        match &self.mutation {
            MutationDto::AddItem { media } => media.validate(),
            _ => Ok(()),
        }
    }
}

/// Wire shape of a queue mutation.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MutationDto {
    /// Submit a new item.
    AddItem {
        /// The content to enqueue.
        media: MediaInput,
    },
    /// Remove an item (owner or host).
    RemoveItem {
        /// Item to remove.
        item_id: u64,
    },
    /// Move playback to the next scheduled item (host only).
    Advance,
    /// Report playback progress (host only).
    SetPosition {
        /// Seconds from the start of the current item.
        position: f64,
    },
    /// Report the outcome of an asynchronous media fetch (host only).
    SetReady {
        /// Item whose media was fetched.
        item_id: u64,
        /// Fetch outcome.
        outcome: FetchOutcomeDto,
    },
    /// Clear the room's queue, history, and playback (host only).
    Reset,
}

/// Outcome of an asynchronous media fetch.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FetchOutcomeDto {
    /// Media fetched and playable.
    Fetched,
    /// Fetch failed permanently.
    Failed,
}

/// Media details supplied when submitting an item.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
pub struct MediaInput {
    /// Identifier of the media within its source catalog.
    #[validate(length(min = 1, max = 256))]
    pub media_id: String,
    /// Display title.
    #[validate(length(min = 1, max = 512))]
    pub title: String,
    /// Optional display artist.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    /// Media duration in seconds.
    #[validate(range(min = 1, max = 21600))]
    pub duration_secs: u32,
    /// Origin of the media content.
    #[serde(default)]
    pub source: MediaSourceDto,
}

impl From<MediaInput> for MediaRef {
    fn from(media: MediaInput) -> Self {
        Self {
            media_id: media.media_id,
            title: media.title,
            artist: media.artist,
            duration_secs: media.duration_secs,
            source: match media.source {
                MediaSourceDto::Library => MediaSource::Library,
                MediaSourceDto::Remote => MediaSource::Remote,
            },
        }
    }
}

impl From<MutationDto> for Mutation {
    fn from(mutation: MutationDto) -> Self {
        match mutation {
            MutationDto::AddItem { media } => Mutation::AddItem {
                media: media.into(),
            },
            MutationDto::RemoveItem { item_id } => Mutation::RemoveItem { item_id },
            MutationDto::Advance => Mutation::Advance,
            MutationDto::SetPosition { position } => Mutation::SetPosition { position },
            MutationDto::SetReady { item_id, outcome } => Mutation::SetReady {
                item_id,
                outcome: match outcome {
                    FetchOutcomeDto::Fetched => FetchOutcome::Fetched,
                    FetchOutcomeDto::Failed => FetchOutcome::Failed,
                },
            },
            MutationDto::Reset => Mutation::Reset,
        }
    }
}

/// Messages pushed to requester WebSocket clients.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequesterOutboundMessage {
    /// Positive acknowledgement of a successful identification.
    Identified(IdentAck),
    /// Full authoritative queue state; replaces all prior client state.
    QueueState(QueueStateSnapshot),
    /// Resolution of one proposed mutation, sent to its originator only.
    Ack(MutationAck),
}

/// Identification acknowledgement carrying the requester's server-side
/// identity and the recommended transaction timeout.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct IdentAck {
    /// The requester id to reuse on reconnection.
    pub requester_id: Uuid,
    /// Room that was joined.
    pub room_id: String,
    /// Privilege level granted.
    pub role: RoleDto,
    /// Milliseconds after which an unacknowledged mutation should be
    /// treated as failed by the client.
    pub ack_timeout_ms: u64,
}

/// Resolution of a proposed mutation.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct MutationAck {
    /// The transaction id supplied by the client.
    pub transaction_id: Uuid,
    /// Whether the mutation was applied.
    pub outcome: AckOutcome,
    /// Human-readable rejection reason on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Outcome carried by a mutation acknowledgement.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AckOutcome {
    /// The mutation was applied and broadcast.
    Success,
    /// The mutation was rejected; the client must revert its speculation.
    Failure,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identification_frame_round_trips() {
        let payload = r#"{"type":"identification","room_id":"friday-night","role":"host"}"#;
        let message = RequesterInboundMessage::from_json_str(payload).unwrap();
        match message {
            RequesterInboundMessage::Identification(request) => {
                assert_eq!(request.room_id, "friday-night");
                assert_eq!(request.role, RoleDto::Host);
                assert!(request.requester_id.is_none());
            }
            other => panic!("expected identification, got {other:?}"),
        }
    }

    #[test]
    fn identification_rejects_invalid_room_ids() {
        let payload = r#"{"type":"identification","room_id":"NOT OK"}"#;
        assert!(matches!(
            RequesterInboundMessage::from_json_str(payload),
            Err(MessageParseError::Validation(_))
        ));
    }

    #[test]
    fn add_item_mutation_is_validated() {
        let payload = r#"{
            "type": "mutation",
            "transaction_id": "4b1c0a52-48ab-4a8b-b82f-7a33cc9ce025",
            "mutation": {
                "op": "add_item",
                "media": {"media_id": "", "title": "x", "duration_secs": 100}
            }
        }"#;
        assert!(matches!(
            RequesterInboundMessage::from_json_str(payload),
            Err(MessageParseError::Validation(_))
        ));
    }

    #[test]
    fn unknown_message_types_decode_to_unknown() {
        let payload = r#"{"type":"dance","intensity":11}"#;
        let message = RequesterInboundMessage::from_json_str(payload).unwrap();
        assert!(matches!(message, RequesterInboundMessage::Unknown));
    }

    #[test]
    fn advance_mutation_decodes_without_arguments() {
        let payload = r#"{
            "type": "mutation",
            "transaction_id": "4b1c0a52-48ab-4a8b-b82f-7a33cc9ce025",
            "mutation": {"op": "advance"}
        }"#;
        let message = RequesterInboundMessage::from_json_str(payload).unwrap();
        match message {
            RequesterInboundMessage::Mutation(request) => {
                assert!(matches!(request.mutation, MutationDto::Advance));
            }
            other => panic!("expected mutation, got {other:?}"),
        }
    }
}
