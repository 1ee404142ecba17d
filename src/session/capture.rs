//! Capture chain: microphone blocks in, encoded frames out to the session.
//!
//! ```text
//! mic ─▶ AudioBatcher ─▶ LevelMeter ─▶ Gate ─▶ PcmEncoder ─▶ TransportSink
//!        (4096 @16k)     (input level) (transmitting)        (attached on connect)
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::audio::effects::{Gate, LevelMeter};
use crate::audio::frame::{AudioBuffer, EncodedChunk};
use crate::audio::{AudioBatcher, INPUT_SAMPLE_RATE};
use crate::io::audio::MicFrame;
use crate::pipeline::{GraphNode, Node, OutputId, Pushable};
use crate::push_chain;
use crate::session::transport::SessionHandle;

/// Encodes a capture frame to PCM16 + base64.
pub struct PcmEncoder;

impl Node for PcmEncoder {
    type Input = AudioBuffer<f32, 1, INPUT_SAMPLE_RATE>;
    type Output = EncodedChunk;

    fn process(&self, input: Self::Input) -> Option<Self::Output> {
        Some(EncodedChunk::encode(&input))
    }
}

/// Last hop before the network. Re-checks the transmitting flag so a frame
/// encoded just before teardown is still dropped.
pub struct TransportSink {
    handle: Arc<SessionHandle>,
    transmitting: Arc<AtomicBool>,
    held_back: Arc<AtomicU64>,
}

impl Pushable<EncodedChunk> for TransportSink {
    fn push(&self, input: EncodedChunk) {
        if !self.transmitting.load(Ordering::Acquire) {
            self.held_back.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.handle.send(input);
    }
}

pub struct CapturePipeline {
    head: Arc<dyn Pushable<MicFrame>>,
    encoder: Arc<GraphNode<PcmEncoder>>,
    transmitting: Arc<AtomicBool>,
    held_back: Arc<AtomicU64>,
    transport: Mutex<Option<OutputId>>,
}

impl CapturePipeline {
    pub fn new(frame_size: usize, level: Arc<AtomicU32>, transmitting: Arc<AtomicBool>) -> Self {
        let encoder = Arc::new(GraphNode::new(PcmEncoder));
        let gate = Gate::<MicFrame>::new(transmitting.clone());
        let held_back = gate.held_back();
        let head = push_chain![
            AudioBatcher::<f32, 1, INPUT_SAMPLE_RATE>::new(frame_size),
            LevelMeter::<f32, 1, INPUT_SAMPLE_RATE>::new(level),
            gate,
            => encoder.clone()
        ];
        Self {
            head,
            encoder,
            transmitting,
            held_back,
            transport: Mutex::new(None),
        }
    }

    /// Frames dropped because the session was not transmitting.
    pub fn gated_frames(&self) -> u64 {
        self.held_back.load(Ordering::Relaxed)
    }

    /// Entry point for microphone blocks.
    pub fn input(&self) -> Arc<dyn Pushable<MicFrame>> {
        self.head.clone()
    }

    /// Route encoded frames to `handle`, replacing any previous session.
    pub fn attach(&self, handle: Arc<SessionHandle>) {
        let sink = Arc::new(TransportSink {
            handle,
            transmitting: self.transmitting.clone(),
            held_back: self.held_back.clone(),
        });
        let id = self.encoder.add_output(sink);
        let previous = self
            .transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(id);
        if let Some(previous) = previous {
            self.encoder.remove_output(previous);
        }
    }

    pub fn detach(&self) {
        let id = self
            .transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(id) = id {
            self.encoder.remove_output(id);
        }
    }
}
