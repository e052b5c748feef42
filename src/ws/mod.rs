pub mod handler;
pub mod messages;
pub mod session;

pub use handler::ws_routes;
pub use messages::{msg_types, ClientMessage, ServerMessage, StateFrame};
pub use session::{ConnectionSet, ParticipantConnection, SendOutcome, WsSessionState};
