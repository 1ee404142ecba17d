//! Fixed-window sample batcher.

use std::sync::{Mutex, PoisonError};

use crate::audio::AudioSample;
use crate::audio::frame::AudioBuffer;
use crate::pipeline::Node;

/// Collects incoming samples and emits them in windows of exactly
/// `frame_samples` samples per channel.
///
/// Device callbacks deliver whatever block size the host picks; the Live
/// endpoint gets a steady cadence of equal frames (4096 samples at 16 kHz is
/// ~256 ms). Leftover samples wait for the next push.
pub struct AudioBatcher<Sample, const CHANNELS: usize, const SAMPLE_RATE: u32> {
    buffer: Mutex<Vec<Sample>>,
    window: usize,
}

impl<Sample, const CHANNELS: usize, const SAMPLE_RATE: u32>
    AudioBatcher<Sample, CHANNELS, SAMPLE_RATE>
{
    pub fn new(frame_samples: usize) -> Self {
        let window = frame_samples.max(1) * CHANNELS;
        Self {
            buffer: Mutex::new(Vec::with_capacity(window * 2)),
            window,
        }
    }
}

impl<Sample: AudioSample, const CHANNELS: usize, const SAMPLE_RATE: u32> Node
    for AudioBatcher<Sample, CHANNELS, SAMPLE_RATE>
{
    type Input = AudioBuffer<Sample, CHANNELS, SAMPLE_RATE>;
    type Output = AudioBuffer<Sample, CHANNELS, SAMPLE_RATE>;

    fn process(&self, input: Self::Input) -> Option<Self::Output> {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.extend(input.into_inner());

        if buffer.len() >= self.window {
            let samples: Vec<Sample> = buffer.drain(..self.window).collect();
            AudioBuffer::new(samples).ok()
        } else {
            None
        }
    }
}
