//! The voice session: configuration, transport contract, capture wiring and
//! the controller that ties them into one lifecycle.

pub mod capture;
pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod transport;

pub use config::{AgentConfig, SessionConfig};
pub use controller::{ControllerOptions, SessionController};
pub use error::{TransportError, VoiceError};
pub use transport::{Connector, InboundEvent, SessionHandle, SessionLink};
