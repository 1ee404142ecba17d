//! PCM16 codec and the base64 transport encoding.
//!
//! The Live endpoint takes and returns mono signed 16-bit little-endian PCM,
//! carried as base64 inside JSON. Everything here is pure.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::audio::AudioSample;

/// Encode normalized samples as little-endian PCM16.
///
/// Input is clamped to [-1, 1]; see the `i16` [`AudioSample`] impl for scaling.
pub fn encode_samples(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = i16::from_f64_normalized(sample as f64);
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode little-endian PCM16 into normalized samples.
///
/// A trailing odd byte cannot form a sample and is ignored.
pub fn decode_samples(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]).to_f64_normalized() as f32)
        .collect()
}

pub fn to_transport_text(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn from_transport_text(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(text)
}

pub fn mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={sample_rate}")
}
