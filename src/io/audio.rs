//! Audio device I/O using cpal.
//!
//! Provides:
//! - [`AudioDevices`] - what the session controller needs from the hardware
//! - [`CpalDevices`] - default microphone and speaker via cpal
//! - [`DeviceHandle`] - owns a running device thread, released exactly once
//!
//! Each stream lives on its own named thread. `cpal::Stream` is not `Send` on
//! every host, so the thread builds it, reports readiness, and parks until
//! asked to stop.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread::JoinHandle;

use anyhow::{Context, Result, anyhow, bail};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use dasp_sample::{FromSample, Sample as DaspSample};
use tracing::{debug, error, info};

use crate::audio::frame::AudioBuffer;
use crate::audio::resample::MicResampler;
use crate::audio::scheduler::{AudioClock, FrameClock, PlaybackRenderer, ScheduledQueue};
use crate::audio::INPUT_SAMPLE_RATE;
use crate::pipeline::Pushable;

pub type MicFrame = AudioBuffer<f32, 1, INPUT_SAMPLE_RATE>;

/// Hardware the voice session acquires on start and releases on teardown.
pub trait AudioDevices: Send + Sync + 'static {
    /// Start capturing; every block is pushed as 16 kHz mono.
    fn open_microphone(&self, sink: Arc<dyn Pushable<MicFrame>>) -> Result<DeviceHandle>;

    /// Start rendering `queue`. The returned clock is the speaker's position.
    fn open_speaker(
        &self,
        queue: Arc<ScheduledQueue>,
    ) -> Result<(DeviceHandle, Arc<dyn AudioClock>)>;
}

/// A running device. Stopping is idempotent; dropping stops it too.
pub struct DeviceHandle {
    name: &'static str,
    stop: Option<Box<dyn FnOnce() + Send>>,
}

impl DeviceHandle {
    pub fn new(name: &'static str, stop: impl FnOnce() + Send + 'static) -> Self {
        Self {
            name,
            stop: Some(Box::new(stop)),
        }
    }

    pub fn release(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
            info!("Released {}", self.name);
        }
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Default input and output devices of the default cpal host.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalDevices;

impl AudioDevices for CpalDevices {
    fn open_microphone(&self, sink: Arc<dyn Pushable<MicFrame>>) -> Result<DeviceHandle> {
        spawn_device_thread("voice-microphone", "microphone", move || {
            build_microphone_stream(sink)
        })
    }

    fn open_speaker(
        &self,
        queue: Arc<ScheduledQueue>,
    ) -> Result<(DeviceHandle, Arc<dyn AudioClock>)> {
        let device = cpal::default_host()
            .default_output_device()
            .context("No default output device available")?;
        let supported = device
            .default_output_config()
            .context("Failed to query default output config")?;
        let clock = Arc::new(FrameClock::new(supported.config().sample_rate));

        let renderer = PlaybackRenderer::new(queue, clock.clone());
        let handle = spawn_device_thread("voice-speaker", "speaker", move || {
            build_speaker_stream(renderer)
        })?;
        Ok((handle, clock))
    }
}

/// Run `build` on a named thread, keep the stream alive there until the
/// handle is released.
fn spawn_device_thread<F>(
    thread_name: &str,
    name: &'static str,
    build: F,
) -> Result<DeviceHandle>
where
    F: FnOnce() -> Result<Stream> + Send + 'static,
{
    let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
    let (stop_tx, stop_rx) = mpsc::channel::<()>();

    let thread: JoinHandle<()> = std::thread::Builder::new()
        .name(thread_name.to_string())
        .spawn(move || {
            let stream = match build() {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));

            // Returns on an explicit stop or when the handle is gone.
            let _ = stop_rx.recv();
            drop(stream);
            debug!("{} stream dropped", name);
        })
        .with_context(|| format!("Failed to spawn {name} thread"))?;

    match ready_rx.recv() {
        Ok(Ok(())) => {
            info!("{} started", name);
            Ok(DeviceHandle::new(name, move || {
                let _ = stop_tx.send(());
                if thread.join().is_err() {
                    error!("{} thread panicked", name);
                }
            }))
        }
        Ok(Err(e)) => {
            let _ = thread.join();
            Err(e.context(format!("Failed to open {name}")))
        }
        Err(_) => {
            let _ = thread.join();
            Err(anyhow!("{name} thread exited during setup"))
        }
    }
}

fn build_microphone_stream(sink: Arc<dyn Pushable<MicFrame>>) -> Result<Stream> {
    let device = cpal::default_host()
        .default_input_device()
        .context("No default input device available")?;
    let supported = device
        .default_input_config()
        .context("Failed to query default input config")?;
    debug!("Input config: {supported:#?}");

    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();
    let resampler = MicResampler::new(
        config.sample_rate,
        config.channels as usize,
        INPUT_SAMPLE_RATE,
    )?;

    let stream = match sample_format {
        SampleFormat::I16 => build_input::<i16>(&device, &config, resampler, sink)?,
        SampleFormat::U16 => build_input::<u16>(&device, &config, resampler, sink)?,
        SampleFormat::F32 => build_input::<f32>(&device, &config, resampler, sink)?,
        format => bail!("Unsupported input sample format: {format:?}"),
    };
    stream.play().context("Failed to start microphone stream")?;
    Ok(stream)
}

fn build_input<T>(
    device: &Device,
    config: &StreamConfig,
    mut resampler: MicResampler,
    sink: Arc<dyn Pushable<MicFrame>>,
) -> Result<Stream>
where
    T: cpal::SizedSample,
    f32: FromSample<T>,
{
    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let block: Vec<f32> = data.iter().map(|s| s.to_sample::<f32>()).collect();
                let mono = resampler.process(&block);
                if !mono.is_empty() {
                    sink.push(AudioBuffer::mono(mono));
                }
            },
            |err| error!("An error occurred on the input audio stream: {}", err),
            None,
        )
        .context("Failed to build input stream")?;
    Ok(stream)
}

fn build_speaker_stream(renderer: PlaybackRenderer) -> Result<Stream> {
    let device = cpal::default_host()
        .default_output_device()
        .context("No default output device available")?;
    let supported = device
        .default_output_config()
        .context("Failed to query default output config")?;
    debug!("Output config: {supported:#?}");

    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();

    let stream = match sample_format {
        SampleFormat::I16 => build_output::<i16>(&device, &config, renderer)?,
        SampleFormat::U16 => build_output::<u16>(&device, &config, renderer)?,
        SampleFormat::F32 => build_output::<f32>(&device, &config, renderer)?,
        format => bail!("Unsupported output sample format: {format:?}"),
    };
    stream.play().context("Failed to start speaker stream")?;
    Ok(stream)
}

fn build_output<T>(
    device: &Device,
    config: &StreamConfig,
    renderer: PlaybackRenderer,
) -> Result<Stream>
where
    T: cpal::SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut scratch: Vec<f32> = Vec::new();

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                renderer.render(&mut scratch, channels);
                for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                    *out = sample.to_sample::<T>();
                }
            },
            |err| error!("An error occurred on the output audio stream: {}", err),
            None,
        )
        .context("Failed to build output stream")?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_device_handle_releases_once() {
        let stops = Arc::new(AtomicUsize::new(0));
        let counter = stops.clone();
        let mut handle = DeviceHandle::new("microphone", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        handle.release();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        handle.release();
        drop(handle);

        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_device_handle_drop_releases() {
        let stops = Arc::new(AtomicUsize::new(0));
        let counter = stops.clone();
        drop(DeviceHandle::new("speaker", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_device_thread_reports_setup_failure() {
        let result = spawn_device_thread("test-device", "test device", || {
            Err(anyhow!("no hardware"))
        });
        let err = result.err().unwrap();
        assert!(format!("{err:#}").contains("no hardware"));
    }
}
