//! Voice session lifecycle.
//!
//! ```text
//! Idle ──start_voice──▶ Connecting ──open ok──▶ Connected ──end_voice──────▶ Disconnected
//!   ▲                       │                       ├──remote close──────▶ Disconnected
//!   │                       ├──failure──▶ Error     └──remote error──────▶ Error
//!   │                       └──cancelled─▶ Error
//!   └──────── Disconnected / Error accept a new start_voice ─────────────────┘
//! ```
//!
//! The controller is the only writer of the connection state. Teardown is a
//! single guarded path shared by the user, the remote side and failures.
//! Device open and release join device threads, so they run on the blocking
//! pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audio::effects::calculate_rms_level;
use crate::audio::scheduler::{PlaybackScheduler, ScheduledQueue};
use crate::io::audio::{AudioDevices, DeviceHandle};
use crate::session::capture::CapturePipeline;
use crate::session::config::{AgentConfig, SessionConfig};
use crate::session::error::VoiceError;
use crate::session::transport::{Connector, InboundEvent, SessionHandle, SessionLink};
use crate::state::{ConnectionState, VoiceState};

const CANCELLED_REASON: &str = "Connection cancelled";

#[derive(Debug, Clone, Copy)]
pub struct ControllerOptions {
    pub frame_size: usize,
    pub connect_timeout: Duration,
}

impl ControllerOptions {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            frame_size: config.audio.frame_size,
            connect_timeout: config.connect_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TeardownCause {
    User,
    RemoteClose(String),
    RemoteError(String),
}

struct ActiveSession {
    generation: u64,
    id: Uuid,
    handle: Arc<SessionHandle>,
    capture: Arc<CapturePipeline>,
    microphone: DeviceHandle,
    speaker: DeviceHandle,
    scheduler: Arc<PlaybackScheduler>,
    dispatch: Option<JoinHandle<()>>,
}

/// Held while `start_voice` is in flight. If the future is dropped before it
/// finishes, the state leaves `Connecting` so a later start is accepted.
struct PendingStart<'a> {
    state: &'a VoiceState,
    armed: bool,
}

impl<'a> PendingStart<'a> {
    fn new(state: &'a VoiceState) -> Self {
        Self { state, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingStart<'_> {
    fn drop(&mut self) {
        if self.armed && self.state.abandon_connecting(CANCELLED_REASON) {
            warn!("Voice session start cancelled");
            self.state.clear_levels();
        }
    }
}

/// Publishes the outcome of a teardown on drop, after the devices are
/// released or when the teardown future is cancelled.
struct FinalStatus<'a> {
    state: &'a VoiceState,
    next: Option<ConnectionState>,
}

impl Drop for FinalStatus<'_> {
    fn drop(&mut self) {
        if let Some(next) = self.next.take() {
            self.state.set_status(next);
        }
    }
}

struct Inner<C, D> {
    connector: C,
    devices: D,
    state: Arc<VoiceState>,
    config: SessionConfig,
    options: ControllerOptions,
    generation: AtomicU64,
    active: Mutex<Option<ActiveSession>>,
}

pub struct SessionController<C: Connector, D: AudioDevices> {
    inner: Arc<Inner<C, D>>,
}

impl<C: Connector, D: AudioDevices> Clone for SessionController<C, D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Connector, D: AudioDevices> SessionController<C, D> {
    pub fn new(
        connector: C,
        devices: D,
        state: Arc<VoiceState>,
        config: SessionConfig,
        options: ControllerOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector,
                devices,
                state,
                config,
                options,
                generation: AtomicU64::new(0),
                active: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> &Arc<VoiceState> {
        &self.inner.state
    }

    #[cfg(test)]
    fn is_active(&self) -> bool {
        self.inner.lock_active().is_some()
    }

    #[cfg(test)]
    fn playback_cursor(&self) -> Option<f64> {
        self.inner
            .lock_active()
            .as_ref()
            .map(|session| session.scheduler.cursor())
    }

    /// Acquire audio devices, open the session and start streaming.
    ///
    /// Rejected unless the state is `Idle`, `Disconnected` or `Error`. On any
    /// failure every resource acquired so far is released and the state
    /// becomes `Error`. Dropping the returned future does the same.
    pub async fn start_voice(&self) -> Result<(), VoiceError> {
        let inner = &self.inner;
        if let Err(current) = inner.state.begin_connecting() {
            warn!("start_voice rejected in state {}", current);
            return Err(VoiceError::AlreadyActive(current.to_string()));
        }
        let pending = PendingStart::new(&inner.state);
        let generation = inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        info!(generation, "Starting voice session");

        let queue = Arc::new(ScheduledQueue::new());
        let speaker_queue = queue.clone();
        let (speaker, clock) = match inner
            .on_device_thread(move |devices| devices.open_speaker(speaker_queue))
            .await
        {
            Ok(opened) => opened,
            Err(e) => return Err(inner.fail(VoiceError::Acquisition(e))),
        };

        let capture = Arc::new(CapturePipeline::new(
            inner.options.frame_size,
            inner.state.input_level.clone(),
            inner.state.transmitting.clone(),
        ));
        let mic_input = capture.input();
        let microphone = match inner
            .on_device_thread(move |devices| devices.open_microphone(mic_input))
            .await
        {
            Ok(microphone) => microphone,
            Err(e) => {
                release_devices(vec![speaker]).await;
                return Err(inner.fail(VoiceError::Acquisition(e)));
            }
        };
        let scheduler = Arc::new(PlaybackScheduler::new(clock, queue));

        let timeout = inner.options.connect_timeout;
        let opened = tokio::time::timeout(timeout, inner.connector.open(&inner.config)).await;
        let SessionLink { handle, events } = match opened {
            Ok(Ok(link)) => link,
            Ok(Err(e)) => {
                release_devices(vec![microphone, speaker]).await;
                return Err(inner.fail(e.into()));
            }
            Err(_) => {
                release_devices(vec![microphone, speaker]).await;
                return Err(inner.fail(VoiceError::Timeout(timeout.as_secs())));
            }
        };

        let id = handle.id();
        capture.attach(handle.clone());

        let mut active = inner.lock_active();
        *active = Some(ActiveSession {
            generation,
            id,
            handle,
            capture,
            microphone,
            speaker,
            scheduler: scheduler.clone(),
            dispatch: None,
        });
        let dispatch = tokio::spawn(dispatch_loop(inner.clone(), generation, events, scheduler));
        if let Some(session) = active.as_mut() {
            session.dispatch = Some(dispatch);
        }
        inner.state.transmitting.store(true, Ordering::Release);
        inner.state.set_status(ConnectionState::Connected);
        drop(active);
        pending.disarm();

        info!(session_id = %id, generation, "Voice session connected");
        Ok(())
    }

    /// Stop streaming and release everything. A no-op unless connected.
    /// Devices are released before this returns.
    pub async fn end_voice(&self) -> bool {
        let ended = self.inner.teardown(None, TeardownCause::User).await;
        if !ended {
            debug!(
                "end_voice ignored in state {}",
                self.inner.state.status()
            );
        }
        ended
    }
}

impl<C: Connector, D: AudioDevices> Inner<C, D> {
    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a device call on the blocking pool.
    async fn on_device_thread<T, F>(self: &Arc<Self>, f: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&D) -> anyhow::Result<T> + Send + 'static,
    {
        let inner = self.clone();
        tokio::task::spawn_blocking(move || f(&inner.devices))
            .await
            .context("Device task failed")?
    }

    fn fail(&self, err: VoiceError) -> VoiceError {
        error!("Voice session failed to start: {}", err);
        self.state.clear_levels();
        self.state
            .set_status(ConnectionState::Error(err.status_reason()));
        err
    }

    /// Take the active session if `generation` matches it (any session for
    /// `None`). Clears the transmitting flag first so capture stops on its
    /// next block.
    fn take_session(&self, generation: Option<u64>) -> Option<ActiveSession> {
        let mut active = self.lock_active();
        let matches = active
            .as_ref()
            .is_some_and(|s| generation.is_none_or(|g| s.generation == g));
        if !matches {
            return None;
        }
        self.state.transmitting.store(false, Ordering::Release);
        active.take()
    }

    /// Release the active session. Only the first caller for a given session
    /// does any work; `generation` pins remote paths to their own session.
    async fn teardown(&self, generation: Option<u64>, cause: TeardownCause) -> bool {
        let Some(mut session) = self.take_session(generation) else {
            return false;
        };

        session.capture.detach();
        session.handle.close();
        let dropped_buffers = session.scheduler.reset();
        if cause == TeardownCause::User {
            if let Some(dispatch) = session.dispatch.take() {
                dispatch.abort();
            }
        }
        self.state.clear_levels();

        let next = match &cause {
            TeardownCause::User | TeardownCause::RemoteClose(_) => ConnectionState::Disconnected,
            TeardownCause::RemoteError(reason) => ConnectionState::Error(reason.clone()),
        };
        let _status = FinalStatus {
            state: &self.state,
            next: Some(next),
        };
        info!(
            session_id = %session.id,
            generation = session.generation,
            cause = ?cause,
            dropped_buffers,
            gated_frames = session.capture.gated_frames(),
            "Voice session ended"
        );

        release_devices(vec![session.microphone, session.speaker]).await;
        true
    }
}

/// Stop device threads on the blocking pool. Every handle is released even if
/// the caller stops waiting.
async fn release_devices(devices: Vec<DeviceHandle>) {
    let released = tokio::task::spawn_blocking(move || {
        for mut device in devices {
            device.release();
        }
    })
    .await;
    if let Err(e) = released {
        error!("Releasing audio devices failed: {}", e);
    }
}

async fn dispatch_loop<C: Connector, D: AudioDevices>(
    inner: Arc<Inner<C, D>>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<InboundEvent>,
    scheduler: Arc<PlaybackScheduler>,
) {
    while let Some(event) = events.recv().await {
        match event {
            InboundEvent::Audio(text) => {
                if let Some(buffer) = scheduler.schedule_chunk(&text) {
                    inner
                        .state
                        .set_output_level(calculate_rms_level(buffer.samples()));
                    debug!(pending = scheduler.pending(), "Queued assistant audio");
                }
            }
            InboundEvent::Transcript(text) => {
                debug!("Transcript: {}", text);
                inner.state.publish_transcript(text);
            }
            InboundEvent::Closed(reason) => {
                info!("Remote closed the session: {}", reason);
                inner
                    .teardown(Some(generation), TeardownCause::RemoteClose(reason))
                    .await;
                return;
            }
            InboundEvent::Error(reason) => {
                warn!("Session error: {}", reason);
                inner
                    .teardown(Some(generation), TeardownCause::RemoteError(reason))
                    .await;
                return;
            }
        }
    }
    inner
        .teardown(
            Some(generation),
            TeardownCause::RemoteClose("event stream ended".to_string()),
        )
        .await;
}
