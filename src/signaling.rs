//! WebSocket call-signaling relay: roster, call matching and signal forwarding

mod actor;
mod messages;
mod registry;
mod server;
mod types;

pub use actor::RegistryHandle;
pub use messages::{ClientMessage, ServerMessage};
pub use registry::{Registry, Transport};
pub use server::{DEFAULT_SIGNALING_PORT, ServerConfig, SignalingServer};
pub use types::{ConnectionId, OutboundMessage, SignalingError, UNKNOWN_DISPLAY_NAME, UserInfo};
