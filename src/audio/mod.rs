//! Audio data types, processing nodes, and effects.
//!
//! # Data Types
//! - [`AudioSample`] - Trait for audio sample types (i16, f32)
//! - [`frame::AudioBuffer`] - A buffer of audio samples (raw PCM data)
//! - [`frame::EncodedChunk`] - A capture frame encoded for the wire
//!
//! # Codec
//! - [`pcm`] - PCM16 little-endian and base64 transport text
//!
//! # Capture
//! - [`resample::MicResampler`] - Downmix and resample device audio to 16 kHz
//! - [`buffers::AudioBatcher`] - Re-frames device blocks into fixed windows
//! - [`effects::level_meter`] - Audio level metering
//! - [`effects::gate`] - Drops frames while not transmitting
//!
//! # Playback
//! - [`scheduler`] - Gapless scheduling against the speaker clock

pub mod buffers;
pub mod effects;
pub mod frame;
pub mod pcm;
pub mod resample;
pub mod sample;
pub mod scheduler;

pub use buffers::AudioBatcher;
pub use effects::{Gate, LevelMeter, calculate_rms_level};
pub use frame::{AudioBuffer, EncodedChunk};
pub use sample::AudioSample;
pub use scheduler::{
    AudioClock, FrameClock, PlaybackRenderer, PlaybackScheduler, ScheduledBuffer, ScheduledQueue,
};

/// Rate the Live endpoint expects for microphone audio.
pub const INPUT_SAMPLE_RATE: u32 = 16000;
/// Rate of audio returned by the Live endpoint.
pub const OUTPUT_SAMPLE_RATE: u32 = 24000;
/// Samples per capture frame (~256 ms at 16 kHz).
pub const FRAME_SAMPLES: usize = 4096;
