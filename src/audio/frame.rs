use anyhow::Result;

use crate::audio::pcm;

/// A type-safe audio buffer with compile-time channel count and sample rate.
///
/// This structure ensures that audio processing logic (like channel iteration)
/// is checked at compile time and can be heavily optimized by the compiler.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer<Sample, const CHANNELS: usize, const SAMPLE_RATE: u32> {
    data: Vec<Sample>,
}

impl<Sample, const CHANNELS: usize, const SAMPLE_RATE: u32>
    AudioBuffer<Sample, CHANNELS, SAMPLE_RATE>
{
    /// Create a new audio buffer from raw samples.
    ///
    /// Returns an error if the data length is not a multiple of the channel count.
    pub fn new(data: Vec<Sample>) -> Result<Self> {
        if !data.is_empty() && data.len() % CHANNELS != 0 {
            anyhow::bail!(
                "Data length {} must be a multiple of channels {}",
                data.len(),
                CHANNELS
            );
        }
        Ok(Self { data })
    }

    /// Returns the number of samples per channel.
    pub fn samples_per_channel(&self) -> usize {
        self.data.len() / CHANNELS
    }

    /// Playing time of the buffer in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples_per_channel() as f64 / SAMPLE_RATE as f64
    }

    /// Access the underlying raw sample data.
    pub fn data(&self) -> &[Sample] {
        &self.data
    }

    /// Consumes the buffer and returns the raw vector.
    pub fn into_inner(self) -> Vec<Sample> {
        self.data
    }
}

impl<Sample, const SAMPLE_RATE: u32> AudioBuffer<Sample, 1, SAMPLE_RATE> {
    /// Mono buffers accept any length.
    pub fn mono(data: Vec<Sample>) -> Self {
        Self { data }
    }
}

/// One captured frame ready for the wire: PCM16 bytes plus their base64 form.
///
/// Immutable once built. The text form is what travels inside the JSON
/// `realtimeInput` message; the bytes are kept for size accounting and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    bytes: Vec<u8>,
    text: String,
    mime_type: String,
}

impl EncodedChunk {
    pub fn encode<const SAMPLE_RATE: u32>(buffer: &AudioBuffer<f32, 1, SAMPLE_RATE>) -> Self {
        let bytes = pcm::encode_samples(buffer.data());
        let text = pcm::to_transport_text(&bytes);
        Self {
            bytes,
            text,
            mime_type: pcm::mime_type(SAMPLE_RATE),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }
}
