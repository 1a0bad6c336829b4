use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Open Mic Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::room_events,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::sse::Handshake,
            crate::dto::ws::RequesterInboundMessage,
            crate::dto::ws::RequesterOutboundMessage,
            crate::dto::ws::MutationAck,
            crate::dto::common::QueueStateSnapshot,
            crate::dto::common::QueueItemSnapshot,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "observers", description = "Read-only room event streams"),
        (name = "requesters", description = "WebSocket operations for queue requesters"),
    )
)]
pub struct ApiDoc;
