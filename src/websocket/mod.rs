pub mod connection;
pub mod handler;
pub mod types;

pub use connection::{ConnectionId, ConnectionManager, MembershipCheck};
pub use handler::ws_handler;
pub use types::{ChatMessagePayload, WsMessage};
