//! Audio level metering.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::audio::frame::AudioBuffer;
use crate::audio::sample::AudioSample;
use crate::pipeline::Node;

/// RMS of normalized samples, clamped to [0, 1].
pub fn calculate_rms_level<Sample: AudioSample>(samples: &[Sample]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples
        .iter()
        .map(|s| {
            let v = s.to_f64_normalized();
            v * v
        })
        .sum();
    let rms = (sum_sq / samples.len() as f64).sqrt();
    rms.min(1.0) as f32
}

/// Shared f32 level cell. Stored as bits so it can live in an `AtomicU32`.
pub fn store_level(cell: &AtomicU32, level: f32) {
    cell.store(level.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
}

pub fn load_level(cell: &AtomicU32) -> f32 {
    f32::from_bits(cell.load(Ordering::Relaxed))
}

/// Writes the RMS of every `update_interval`-th buffer into a shared level
/// cell. Range: 0.0 - 1.0.
pub struct LevelMeter<Sample, const CHANNELS: usize, const SAMPLE_RATE: u32> {
    level: Arc<AtomicU32>,
    counter: AtomicU32,
    update_interval: u32,
    _marker: std::marker::PhantomData<Sample>,
}

impl<Sample, const CHANNELS: usize, const SAMPLE_RATE: u32>
    LevelMeter<Sample, CHANNELS, SAMPLE_RATE>
{
    /// Meter every buffer. Capture frames are ~256 ms, so there is no need to
    /// thin them out.
    pub fn new(level: Arc<AtomicU32>) -> Self {
        Self::with_interval(level, 1)
    }

    pub fn with_interval(level: Arc<AtomicU32>, update_interval: u32) -> Self {
        Self {
            level,
            counter: AtomicU32::new(0),
            update_interval: update_interval.max(1),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<Sample, const CHANNELS: usize, const SAMPLE_RATE: u32> Node
    for LevelMeter<Sample, CHANNELS, SAMPLE_RATE>
where
    Sample: AudioSample,
{
    type Input = AudioBuffer<Sample, CHANNELS, SAMPLE_RATE>;
    type Output = AudioBuffer<Sample, CHANNELS, SAMPLE_RATE>;

    fn process(&self, input: Self::Input) -> Option<Self::Output> {
        let count = self.counter.fetch_add(1, Ordering::Relaxed);
        if count % self.update_interval != 0 {
            return Some(input);
        }

        store_level(&self.level, calculate_rms_level(input.data()));

        Some(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_of_constant_signal() {
        assert_eq!(calculate_rms_level::<f32>(&[]), 0.0);
        assert_eq!(calculate_rms_level(&[0.0f32; 64]), 0.0);
        assert!((calculate_rms_level(&[0.5f32, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
        assert_eq!(calculate_rms_level(&[i16::MIN; 8]), 1.0);
    }

    #[test]
    fn test_meter_stores_level_and_passes_audio() {
        let level = Arc::new(AtomicU32::new(0));
        let meter = LevelMeter::<f32, 1, 16000>::new(level.clone());

        let input = AudioBuffer::new(vec![0.25f32; 128]).unwrap();
        let output = meter.process(input.clone()).unwrap();

        assert_eq!(output, input);
        assert!((load_level(&level) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_meter_interval_skips_buffers() {
        let level = Arc::new(AtomicU32::new(0));
        let meter = LevelMeter::<f32, 1, 16000>::with_interval(level.clone(), 2);

        meter.process(AudioBuffer::new(vec![0.5f32; 16]).unwrap());
        meter.process(AudioBuffer::new(vec![0.0f32; 16]).unwrap());
        assert!((load_level(&level) - 0.5).abs() < 1e-6);
    }
}
