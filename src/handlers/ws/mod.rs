pub mod handler;
pub mod messages;
pub mod processor;

pub use handler::ws_handler;
pub use messages::{IncomingMessage, OutgoingMessage, TrackingStatusKind};
