//! Gapless playback scheduling.
//!
//! Inbound chunks are decoded and laid end to end on a timeline driven by the
//! speaker's own sample counter:
//!
//! ```text
//!   clock ──────●────────────────────────────────▶
//!               now
//!   cursor            ├── chunk 1 ──┤── chunk 2 ──┤
//!                     start = max(now, cursor)
//! ```
//!
//! The speaker callback ([`PlaybackRenderer`]) reads the timeline at device
//! rate and advances the clock by the frames it wrote.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::audio::frame::AudioBuffer;
use crate::audio::pcm;
use crate::audio::OUTPUT_SAMPLE_RATE;

/// Monotonic playback clock, in seconds.
pub trait AudioClock: Send + Sync {
    fn now(&self) -> f64;
}

/// Clock that counts frames handed to the output device.
pub struct FrameClock {
    frames: AtomicU64,
    sample_rate: u32,
}

impl FrameClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            frames: AtomicU64::new(0),
            sample_rate: sample_rate.max(1),
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::AcqRel);
    }
}

impl AudioClock for FrameClock {
    fn now(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// A decoded chunk pinned to a start time on the playback clock.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledBuffer {
    start: f64,
    buffer: AudioBuffer<f32, 1, OUTPUT_SAMPLE_RATE>,
}

impl ScheduledBuffer {
    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn duration(&self) -> f64 {
        self.buffer.duration_secs()
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration()
    }

    pub fn samples(&self) -> &[f32] {
        self.buffer.data()
    }

    /// Linearly interpolated value at clock time `t`.
    fn sample_at(&self, t: f64) -> f32 {
        let samples = self.buffer.data();
        let pos = (t - self.start).max(0.0) * OUTPUT_SAMPLE_RATE as f64;
        let index = pos.floor() as usize;
        let Some(&a) = samples.get(index) else {
            return 0.0;
        };
        let b = samples.get(index + 1).copied().unwrap_or(a);
        let frac = (pos - index as f64) as f32;
        a + (b - a) * frac
    }
}

/// Unbounded FIFO of scheduled buffers shared with the speaker thread.
#[derive(Default)]
pub struct ScheduledQueue {
    buffers: Mutex<VecDeque<ScheduledBuffer>>,
}

impl ScheduledQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<ScheduledBuffer>> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Owns the playback cursor: the next free slot on the clock.
pub struct PlaybackScheduler {
    clock: Arc<dyn AudioClock>,
    cursor: Mutex<f64>,
    queue: Arc<ScheduledQueue>,
}

impl PlaybackScheduler {
    pub fn new(clock: Arc<dyn AudioClock>, queue: Arc<ScheduledQueue>) -> Self {
        let cursor = Mutex::new(clock.now());
        Self {
            clock,
            cursor,
            queue,
        }
    }

    pub fn cursor(&self) -> f64 {
        *self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Place samples (24 kHz mono) right after everything already scheduled,
    /// or at the current clock time if the timeline has run dry.
    pub fn schedule(&self, samples: Vec<f32>) -> ScheduledBuffer {
        let buffer = AudioBuffer::<f32, 1, OUTPUT_SAMPLE_RATE>::mono(samples);

        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        // The renderer advances the clock under the queue lock, so `now` read
        // here cannot fall behind a block that is already rendered.
        let mut pending = self.queue.lock();
        let now = self.clock.now();
        let start = now.max(*cursor);
        let scheduled = ScheduledBuffer { start, buffer };
        *cursor = scheduled.end();
        pending.push_back(scheduled.clone());
        drop(pending);
        drop(cursor);

        debug!(
            "Scheduled {:.3}s of audio at {:.3} (clock {:.3})",
            scheduled.duration(),
            start,
            now
        );
        scheduled
    }

    /// Decode a base64 PCM16 chunk and schedule it. Undecodable chunks are
    /// logged and dropped without touching the cursor.
    pub fn schedule_chunk(&self, text: &str) -> Option<ScheduledBuffer> {
        match pcm::from_transport_text(text) {
            Ok(bytes) => Some(self.schedule(pcm::decode_samples(&bytes))),
            Err(e) => {
                warn!("Dropping undecodable audio chunk: {}", e);
                None
            }
        }
    }

    /// Buffers not yet fully played.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Forget everything pending and restart the timeline at the clock.
    /// Returns how many buffers were dropped.
    pub fn reset(&self) -> usize {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        let mut pending = self.queue.lock();
        let dropped = pending.len();
        pending.clear();
        *cursor = self.clock.now();
        dropped
    }
}

/// Renders the scheduled timeline into device buffers. Runs inside the
/// speaker callback.
pub struct PlaybackRenderer {
    queue: Arc<ScheduledQueue>,
    clock: Arc<FrameClock>,
}

impl PlaybackRenderer {
    pub fn new(queue: Arc<ScheduledQueue>, clock: Arc<FrameClock>) -> Self {
        Self { queue, clock }
    }

    /// Fill interleaved `out` and advance the clock by the frames written.
    /// Gaps in the timeline render as silence.
    pub fn render(&self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let frames = out.len() / channels;
        let base = self.clock.frames();
        let rate = self.clock.sample_rate() as f64;

        out.fill(0.0);

        let mut queue = self.queue.lock();
        let mut index = 0;
        for (i, frame) in out.chunks_exact_mut(channels).enumerate() {
            let t = (base + i as u64) as f64 / rate;
            while index < queue.len() && queue[index].end() <= t {
                index += 1;
            }
            match queue.get(index) {
                Some(buffer) if buffer.start() <= t => frame.fill(buffer.sample_at(t)),
                _ => {}
            }
        }

        let block_end = (base + frames as u64) as f64 / rate;
        while queue.front().is_some_and(|b| b.end() <= block_end) {
            queue.pop_front();
        }
        self.clock.advance(frames as u64);
        drop(queue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ManualClock(Mutex<f64>);

    impl ManualClock {
        fn at(t: f64) -> Arc<Self> {
            Arc::new(Self(Mutex::new(t)))
        }

        fn set(&self, t: f64) {
            *self.0.lock().unwrap() = t;
        }
    }

    impl AudioClock for ManualClock {
        fn now(&self) -> f64 {
            *self.0.lock().unwrap()
        }
    }

    #[test]
    fn test_back_to_back_chunks_advance_cursor() {
        let clock = ManualClock::at(5.0);
        let queue = Arc::new(ScheduledQueue::new());
        let scheduler = PlaybackScheduler::new(clock.clone(), queue.clone());

        let bytes = pcm::encode_samples(&vec![0.0; 24000]);
        let text = pcm::to_transport_text(&bytes);
        let starts: Vec<f64> = (0..3)
            .map(|_| scheduler.schedule_chunk(&text).unwrap().start())
            .collect();

        assert_eq!(starts, vec![5.0, 6.0, 7.0]);
        assert!((scheduler.cursor() - 8.0).abs() < 1e-9);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_never_schedules_in_the_past() {
        let clock = ManualClock::at(0.0);
        let scheduler = PlaybackScheduler::new(clock.clone(), Arc::new(ScheduledQueue::new()));

        let first = scheduler.schedule(vec![0.0; 12000]);
        assert_eq!(first.start(), 0.0);

        // Clock runs past the cursor: next chunk starts at the clock.
        clock.set(2.0);
        let second = scheduler.schedule(vec![0.0; 12000]);
        assert_eq!(second.start(), 2.0);
        assert!(second.start() >= first.end());

        // Clock behind the cursor: chunk queues right after the previous one.
        clock.set(2.1);
        let third = scheduler.schedule(vec![0.0; 2400]);
        assert!((third.start() - second.end()).abs() < 1e-12);
        assert!(third.start() >= 2.1);
    }

    #[test]
    fn test_bad_chunk_leaves_cursor() {
        let clock = ManualClock::at(1.0);
        let queue = Arc::new(ScheduledQueue::new());
        let scheduler = PlaybackScheduler::new(clock, queue.clone());

        assert!(scheduler.schedule_chunk("%%%").is_none());
        assert_eq!(scheduler.cursor(), 1.0);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_reset_moves_cursor_to_clock() {
        let clock = ManualClock::at(0.0);
        let queue = Arc::new(ScheduledQueue::new());
        let scheduler = PlaybackScheduler::new(clock.clone(), queue.clone());

        scheduler.schedule(vec![0.0; 48000]);
        clock.set(0.5);
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(scheduler.reset(), 1);

        assert_eq!(scheduler.cursor(), 0.5);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_renderer_plays_gapless() {
        let clock = Arc::new(FrameClock::new(OUTPUT_SAMPLE_RATE));
        let queue = Arc::new(ScheduledQueue::new());
        let scheduler = PlaybackScheduler::new(clock.clone(), queue.clone());
        let renderer = PlaybackRenderer::new(queue.clone(), clock.clone());

        scheduler.schedule(vec![0.5; 100]);
        scheduler.schedule(vec![-0.5; 100]);

        let mut out = vec![9.0; 200];
        renderer.render(&mut out, 1);

        assert!(out[..100].iter().all(|&s| s == 0.5));
        assert!(out[100..].iter().all(|&s| s == -0.5));
        assert_eq!(clock.frames(), 200);
        assert_eq!(queue.len(), 0);

        let mut tail = vec![9.0; 10];
        renderer.render(&mut tail, 1);
        assert!(tail.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_chunk_scheduled_between_blocks_plays_from_first_sample() {
        let clock = Arc::new(FrameClock::new(OUTPUT_SAMPLE_RATE));
        let queue = Arc::new(ScheduledQueue::new());
        let scheduler = PlaybackScheduler::new(clock.clone(), queue.clone());
        let renderer = PlaybackRenderer::new(queue, clock.clone());

        let mut out = vec![9.0; 480];
        renderer.render(&mut out, 1);
        assert_eq!(clock.frames(), 480);

        let ramp: Vec<f32> = (0..960).map(|i| i as f32 / 960.0).collect();
        let scheduled = scheduler.schedule(ramp.clone());
        assert!(scheduled.start() >= clock.now());

        renderer.render(&mut out, 1);
        for (got, want) in out.iter().zip(&ramp) {
            assert!((got - want).abs() < 1e-4, "{got} != {want}");
        }
    }

    #[test]
    fn test_concurrent_scheduling_renders_every_sample() {
        use std::sync::atomic::AtomicBool;

        const BLOCK: usize = 64;
        const CHUNK: usize = 256;
        const CHUNKS: usize = 200;

        let clock = Arc::new(FrameClock::new(OUTPUT_SAMPLE_RATE));
        let queue = Arc::new(ScheduledQueue::new());
        let scheduler = PlaybackScheduler::new(clock.clone(), queue.clone());
        let renderer = PlaybackRenderer::new(queue.clone(), clock);
        let done = Arc::new(AtomicBool::new(false));

        let render_thread = {
            let queue = queue.clone();
            let done = done.clone();
            std::thread::spawn(move || {
                let mut played = 0usize;
                let mut out = vec![0.0f32; BLOCK];
                while !(done.load(Ordering::Acquire) && queue.len() == 0) {
                    renderer.render(&mut out, 1);
                    played += out.iter().filter(|&&s| s > 0.5).count();
                }
                played
            })
        };

        for i in 0..CHUNKS {
            scheduler.schedule(vec![1.0; CHUNK]);
            if i % 8 == 0 {
                std::thread::yield_now();
            }
        }
        done.store(true, Ordering::Release);

        let played = render_thread.join().unwrap();
        let expected = CHUNK * CHUNKS;
        // Float edges may cost a frame per chunk; a skipped block costs BLOCK.
        assert!(
            played + CHUNKS >= expected && played <= expected + CHUNKS,
            "played {played} of {expected}"
        );
    }

    #[test]
    fn test_renderer_interpolates_and_fills_channels() {
        let clock = Arc::new(FrameClock::new(48000));
        let queue = Arc::new(ScheduledQueue::new());
        let scheduler = PlaybackScheduler::new(clock.clone(), queue.clone());
        let renderer = PlaybackRenderer::new(queue, clock);

        scheduler.schedule(vec![0.0, 1.0]);

        let mut out = vec![0.0; 8];
        renderer.render(&mut out, 2);

        let expected = [0.0, 0.0, 0.5, 0.5, 1.0, 1.0];
        for (got, want) in out.iter().zip(expected) {
            assert!((got - want).abs() < 1e-4, "{out:?}");
        }
    }
}
