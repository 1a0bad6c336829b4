use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::Sse,
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{
    dto::validation::validate_room_id,
    error::AppError,
    services::sse_service,
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/rooms/{room_id}/events",
    params(("room_id" = String, Path, description = "Identifier of the observed room")),
    responses((status = 200, description = "Room observer stream", content_type = "text/event-stream", body = String))
)]
/// Stream a room's queue state broadcasts to a read-only observer.
pub async fn room_events(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>>, AppError> {
    validate_room_id(&room_id).map_err(|err| AppError::BadRequest(err.to_string()))?;

    let room = state.room(&room_id).await?;
    info!(room_id = %room_id, "new observer stream");
    Ok(sse_service::room_event_stream(room))
}

/// Configure the observer stream endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/rooms/{room_id}/events", get(room_events))
}
