use std::sync::Arc;

use tracing::debug;

use crate::{
    dto::{common::QueueStateSnapshot, ws::MutationRequest},
    error::ServiceError,
    state::{SharedState, queue::{Mutation, RequesterCtx}, room::Room},
};

/// Apply a proposed mutation to `room` on behalf of `ctx`.
///
/// The room serializes concurrent mutations, persists the durable effect,
/// and broadcasts the recomputed state; the returned snapshot lets the
/// caller acknowledge the originating requester.
pub async fn apply_mutation(
    state: &SharedState,
    room: &Arc<Room>,
    ctx: &RequesterCtx,
    request: MutationRequest,
) -> Result<QueueStateSnapshot, ServiceError> {
    let mutation = Mutation::from(request.mutation);
    let store = state.queue_store();
    let snapshot = room
        .mutate(ctx, mutation, state.config().max_items_per_room(), &store)
        .await?;

    debug!(
        room_id = %room.room_id(),
        requester = %ctx.requester_id,
        version = snapshot.version,
        "applied queue mutation"
    );

    Ok(snapshot)
}
