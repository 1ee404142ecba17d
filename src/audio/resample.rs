//! Downmix and sample-rate conversion for capture.
//!
//! Input devices rarely run at 16 kHz. Device blocks are downmixed to mono,
//! accumulated, and fed through rubato in fixed chunks.

use anyhow::Result;
use rubato::{FftFixedIn, Resampler};
use tracing::{error, info};

const CHUNK_SIZE: usize = 1024;

pub struct MicResampler {
    resampler: Option<FftFixedIn<f32>>,
    source_channels: usize,
    pending: Vec<f32>,
}

impl MicResampler {
    pub fn new(source_rate: u32, source_channels: usize, target_rate: u32) -> Result<Self> {
        let resampler = if source_rate != target_rate {
            let r = FftFixedIn::<f32>::new(
                source_rate as usize,
                target_rate as usize,
                CHUNK_SIZE,
                2,
                1,
            )?;
            info!("Created resampler {}Hz -> {}Hz", source_rate, target_rate);
            Some(r)
        } else {
            None
        };

        Ok(Self {
            resampler,
            source_channels: source_channels.max(1),
            pending: Vec::with_capacity(CHUNK_SIZE * 2),
        })
    }

    /// Takes one interleaved device block, returns whatever mono output is ready.
    pub fn process(&mut self, interleaved: &[f32]) -> Vec<f32> {
        let mono = downmix(interleaved, self.source_channels);

        let Some(resampler) = self.resampler.as_mut() else {
            return mono;
        };

        self.pending.extend(mono);

        let mut output = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let chunk: Vec<f32> = self.pending.drain(..needed).collect();
            match resampler.process(&[chunk], None) {
                Ok(mut resampled) => output.append(&mut resampled[0]),
                Err(e) => {
                    error!("Resample failed: {}", e);
                    break;
                }
            }
        }
        output
    }
}

/// Average interleaved channels into one.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_stereo() {
        assert_eq!(downmix(&[1.0, 0.0, -0.5, -0.5], 2), vec![0.5, -0.5]);
        assert_eq!(downmix(&[0.1, 0.2], 1), vec![0.1, 0.2]);
    }

    #[test]
    fn test_passthrough_at_target_rate() {
        let mut resampler = MicResampler::new(16000, 1, 16000).unwrap();
        let block = vec![0.25f32; 480];
        assert_eq!(resampler.process(&block), block);
    }

    #[test]
    fn test_downsamples_48k() {
        let mut resampler = MicResampler::new(48000, 2, 16000).unwrap();

        let mut produced = 0;
        // One second of stereo audio in 10 ms blocks.
        for _ in 0..100 {
            produced += resampler.process(&vec![0.1f32; 960]).len();
        }

        assert!(produced > 15000 && produced <= 16000, "produced {produced}");
    }
}
