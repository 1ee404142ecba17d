//! Shared voice state.
//!
//! This module contains the state the UI reads and the session writes:
//!
//! - [`ConnectionState`] - lifecycle of the voice session
//! - [`VoiceState`] - status, levels, transcript feed

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32};

use tokio::sync::{broadcast, watch};

use crate::audio::effects::level_meter::{load_level, store_level};

/// Connection status of the voice session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Error(String),
}

impl ConnectionState {
    /// States from which a new session may start.
    pub fn accepts_start(&self) -> bool {
        matches!(
            self,
            ConnectionState::Idle | ConnectionState::Disconnected | ConnectionState::Error(_)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected | ConnectionState::Error(_)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "Idle"),
            ConnectionState::Connecting => write!(f, "Connecting..."),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Error(reason) => write!(f, "Error: {reason}"),
        }
    }
}

/// State shared between the session controller and its observers.
///
/// Status goes through a `watch` channel so a late subscriber still sees the
/// current value. Levels are lossy atomics polled by the UI. Transcript
/// fragments fan out on a `broadcast` channel.
pub struct VoiceState {
    status: watch::Sender<ConnectionState>,
    pub transmitting: Arc<AtomicBool>,
    pub input_level: Arc<AtomicU32>,
    pub output_level: Arc<AtomicU32>,
    transcript: broadcast::Sender<String>,
}

impl VoiceState {
    pub fn new() -> Arc<Self> {
        let (status, _) = watch::channel(ConnectionState::Idle);
        let (transcript, _) = broadcast::channel(256);
        Arc::new(Self {
            status,
            transmitting: Arc::new(AtomicBool::new(false)),
            input_level: Arc::new(AtomicU32::new(0)),
            output_level: Arc::new(AtomicU32::new(0)),
            transcript,
        })
    }

    pub fn status(&self) -> ConnectionState {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionState> {
        self.status.subscribe()
    }

    pub(crate) fn set_status(&self, state: ConnectionState) {
        self.status.send_replace(state);
    }

    /// Atomically move to `Connecting` if a start is allowed from the current
    /// state. Returns the state that blocked the transition otherwise.
    pub(crate) fn begin_connecting(&self) -> Result<(), ConnectionState> {
        let mut blocked = None;
        self.status.send_if_modified(|current| {
            if current.accepts_start() {
                *current = ConnectionState::Connecting;
                true
            } else {
                blocked = Some(current.clone());
                false
            }
        });
        match blocked {
            Some(state) => Err(state),
            None => Ok(()),
        }
    }

    /// Move from `Connecting` to `Error(reason)`. Any other state is left
    /// alone. Returns whether the state changed.
    pub(crate) fn abandon_connecting(&self, reason: &str) -> bool {
        self.status.send_if_modified(|current| {
            if *current == ConnectionState::Connecting {
                *current = ConnectionState::Error(reason.to_string());
                true
            } else {
                false
            }
        })
    }

    pub fn subscribe_transcript(&self) -> broadcast::Receiver<String> {
        self.transcript.subscribe()
    }

    pub(crate) fn publish_transcript(&self, text: String) {
        // No subscribers is fine.
        let _ = self.transcript.send(text);
    }

    /// Volume in [0, 1]: the louder of microphone and assistant audio.
    pub fn volume(&self) -> f32 {
        load_level(&self.input_level).max(load_level(&self.output_level))
    }

    pub(crate) fn set_output_level(&self, level: f32) {
        store_level(&self.output_level, level);
    }

    pub(crate) fn clear_levels(&self) {
        store_level(&self.input_level, 0.0);
        store_level(&self.output_level, 0.0);
    }
}
