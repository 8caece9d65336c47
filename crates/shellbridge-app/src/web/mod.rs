// Web layer: REST connection management plus the two WebSocket protocols
// (raw terminal relay, agent-conversation notifications).

pub mod protocol;
pub mod routes;
pub mod server;
