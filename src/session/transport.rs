//! Connection contract between the session controller and a live endpoint.
//!
//! A [`Connector`] opens a session and hands back a [`SessionLink`]: a handle
//! for outbound audio plus a channel of [`InboundEvent`]s. The event stream
//! carries any number of audio/transcript events and ends with exactly one
//! `Closed` or `Error`.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audio::frame::EncodedChunk;
use crate::session::config::SessionConfig;
use crate::session::error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Base64 PCM16 at 24 kHz.
    Audio(String),
    Transcript(String),
    Closed(String),
    Error(String),
}

#[derive(Debug)]
pub enum Outbound {
    Audio(EncodedChunk),
    Close,
}

/// Sending side of an open session. Cheap to share with the capture thread.
pub struct SessionHandle {
    id: Uuid,
    outbound: mpsc::UnboundedSender<Outbound>,
    closed: AtomicBool,
}

impl SessionHandle {
    pub fn new(id: Uuid, outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            id,
            outbound,
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue a chunk for the writer. Never blocks. Returns whether the chunk
    /// was queued; delivery problems come back as an inbound `Error`.
    pub fn send(&self, chunk: EncodedChunk) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        match self.outbound.send(Outbound::Audio(chunk)) {
            Ok(()) => true,
            Err(_) => {
                warn!(session_id = %self.id, "Dropping audio frame: writer is gone");
                false
            }
        }
    }

    /// Ask the writer to close the connection. Only the first call does anything.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let _ = self.outbound.send(Outbound::Close);
        info!(session_id = %self.id, "Session close requested");
        true
    }
}

pub struct SessionLink {
    pub handle: Arc<SessionHandle>,
    pub events: mpsc::UnboundedReceiver<InboundEvent>,
}

/// Opens sessions. Resolves only once the remote side is ready for audio.
pub trait Connector: Send + Sync + 'static {
    fn open(
        &self,
        config: &SessionConfig,
    ) -> impl Future<Output = Result<SessionLink, TransportError>> + Send;
}
