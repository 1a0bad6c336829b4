/// Shared queue snapshots exposed to every client surface.
pub mod common;
/// Health check payloads.
pub mod health;
/// Server-sent events payloads for the observer stream.
pub mod sse;
/// Validation helpers for DTOs.
pub mod validation;
/// WebSocket message shapes for the requester sync channel.
pub mod ws;
