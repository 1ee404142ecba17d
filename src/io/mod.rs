//! Hardware and network I/O.
//!
//! - [`audio`] - Microphone capture and speaker playback via cpal
//! - [`live`] - Gemini Live websocket transport
//! - [`protocol`] - Live wire messages
//! - [`models`] - Model listing over HTTP

pub mod audio;
pub mod live;
pub mod models;
pub mod protocol;

pub use audio::{AudioDevices, CpalDevices, DeviceHandle};
pub use live::LiveConnector;
