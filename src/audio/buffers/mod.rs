//! Audio buffer implementations.
//!
//! - [`AudioBatcher`] - Re-frames device blocks into fixed-size capture windows

pub mod audio_batcher;

pub use audio_batcher::AudioBatcher;
