//! Signaling gateway: decodes client messages per connection, dispatches
//! them onto the ride orchestrator or the mesh relay, and hosts the axum
//! WebSocket endpoint.

pub mod gateway;
pub mod mesh;
pub mod messages;
pub mod ws;

pub use gateway::Gateway;
pub use messages::ClientMessage;
pub use ws::AppState;
