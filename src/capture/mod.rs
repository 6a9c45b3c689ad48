// SPDX-License-Identifier: GPL-3.0-only

//! Capture session lifecycle
//!
//! Owns the device handle for its entire streaming lifetime and runs
//! every blocking device call (enumerate, open, configure, frame
//! delivery) on one dedicated worker thread, serialized by
//! construction. Camera calls are slow relative to a 60 Hz render
//! budget; they never share a thread with the draw callback.
//!
//! Asynchronous device outcomes are modeled as explicit state
//! transitions plus [`SessionEvent`]s on an mpsc channel to the
//! controller. Nothing is signaled through polled shared flags except
//! the stop request itself.

use crate::backends::types::{CameraFrame, CaptureFormat};
use crate::backends::CaptureBackend;
use crate::errors::CaptureError;
use crate::surface::FrameSurface;
use crate::transform::FrameTransform;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Opening,
    Configuring,
    Streaming,
    Stopping,
    Closed,
    /// A fault was recorded; restart is a caller decision
    Faulted,
}

/// Notifications emitted by the worker thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Device opened and session configured; frames are flowing
    Streaming { device: String, format: CaptureFormat },
    /// `start()` could not reach the streaming state
    StartFailed(CaptureError),
    /// The device was revoked externally; the session closed itself
    Disconnected,
    /// Device-reported fault during streaming
    DeviceError { code: i32 },
    /// Streaming failed without a device error code (dequeue or mmap)
    StreamFailed,
    /// The frame transform failed for one frame; raw data was forwarded
    TransformFailed,
}

/// Capture session
///
/// Exactly one live session per controller. `start`/`stop`/`set_mode`
/// are expected to be called from a single owning context; only the
/// worker thread runs concurrently with them.
pub struct CaptureSession {
    state: Arc<Mutex<SessionState>>,
    stop_signal: Arc<AtomicBool>,
    processed: Arc<AtomicBool>,
    /// Idle backend between sessions; moves into the worker on start
    backend: Option<Box<dyn CaptureBackend>>,
    /// Device path preference; first enumerated device when unset
    preferred_device: Option<String>,
    /// Running worker; returns the backend on join
    worker: Option<JoinHandle<Box<dyn CaptureBackend>>>,
    surface: Arc<FrameSurface>,
    transform: Arc<dyn FrameTransform>,
    format: CaptureFormat,
    events: Sender<SessionEvent>,
}

impl CaptureSession {
    pub fn new(
        backend: Box<dyn CaptureBackend>,
        surface: Arc<FrameSurface>,
        transform: Arc<dyn FrameTransform>,
        format: CaptureFormat,
        events: Sender<SessionEvent>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::Idle)),
            stop_signal: Arc::new(AtomicBool::new(false)),
            processed: Arc::new(AtomicBool::new(false)),
            backend: Some(backend),
            preferred_device: None,
            worker: None,
            surface,
            transform,
            format,
            events,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    /// Shared mode flag; the worker reads it per delivered frame
    pub fn mode_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.processed)
    }

    /// Prefer the device with this path on the next start.
    ///
    /// Falls back to the first enumerated device when unset or when no
    /// device matches.
    pub fn set_preferred_device(&mut self, path: Option<String>) {
        self.preferred_device = path;
    }

    /// Switch between raw pass-through and processed mode.
    ///
    /// Pure state update; takes effect on the next delivered frame, no
    /// session restart involved.
    pub fn set_mode(&self, processed: bool) {
        self.processed.store(processed, Ordering::SeqCst);
        debug!(processed, "Capture mode changed");
    }

    /// True when the transform runs on delivered frames
    pub fn mode(&self) -> bool {
        self.processed.load(Ordering::SeqCst)
    }

    /// Start the session worker.
    ///
    /// Transitions Idle→Opening synchronously; the rest of the ladder
    /// (Configuring, Streaming, or Faulted) runs on the worker thread
    /// and is reported through the event channel. Calling `start` on a
    /// session that is already running is a no-op.
    pub fn start(&mut self) {
        if let Some(handle) = &self.worker {
            if !handle.is_finished() {
                warn!("start() ignored: session already running");
                return;
            }
            // A finished worker (fault or disconnect) still holds the
            // backend; reclaim it before restarting.
            self.reclaim_backend();
        }

        let Some(backend) = self.backend.take() else {
            warn!("start() ignored: no backend available");
            return;
        };

        self.stop_signal.store(false, Ordering::SeqCst);
        self.surface.reset();
        *self.state.lock().unwrap() = SessionState::Opening;

        let state = Arc::clone(&self.state);
        let stop = Arc::clone(&self.stop_signal);
        let processed = Arc::clone(&self.processed);
        let surface = Arc::clone(&self.surface);
        let transform = Arc::clone(&self.transform);
        let format = self.format;
        let preferred = self.preferred_device.clone();
        let events = self.events.clone();

        info!("Starting capture session");
        self.worker = Some(std::thread::spawn(move || {
            run_worker(
                backend, state, stop, processed, surface, transform, format, preferred, events,
            )
        }));
    }

    /// Stop the session and wait for the worker to quiesce.
    ///
    /// Blocking by design: device and GPU-adjacent resources must not
    /// be released while the worker could still touch them. Idempotent;
    /// calling `stop` when Closed or Idle is a no-op.
    pub fn stop(&mut self) {
        if self.worker.is_none() {
            debug!("stop() on inactive session is a no-op");
            return;
        }

        {
            let mut state = self.state.lock().unwrap();
            if *state == SessionState::Streaming
                || *state == SessionState::Opening
                || *state == SessionState::Configuring
            {
                *state = SessionState::Stopping;
            }
        }

        self.stop_signal.store(true, Ordering::SeqCst);
        self.reclaim_backend();

        let mut state = self.state.lock().unwrap();
        if *state != SessionState::Faulted {
            *state = SessionState::Closed;
        }
        info!(state = ?*state, "Capture session stopped");
    }

    /// Join the worker and take the backend back for a later restart
    fn reclaim_backend(&mut self) {
        if let Some(handle) = self.worker.take() {
            match handle.join() {
                Ok(backend) => self.backend = Some(backend),
                Err(e) => warn!("Capture worker panicked: {:?}", e),
            }
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if self.worker.is_some() {
            debug!("CaptureSession dropped while active, stopping");
            self.stop();
        }
    }
}

/// Worker thread body: open → configure → stream until stop or fault.
///
/// Always returns the backend so the session can restart later; the
/// device handle itself is closed before returning in every path.
#[allow(clippy::too_many_arguments)]
fn run_worker(
    mut backend: Box<dyn CaptureBackend>,
    state: Arc<Mutex<SessionState>>,
    stop: Arc<AtomicBool>,
    processed: Arc<AtomicBool>,
    surface: Arc<FrameSurface>,
    transform: Arc<dyn FrameTransform>,
    format: CaptureFormat,
    preferred: Option<String>,
    events: Sender<SessionEvent>,
) -> Box<dyn CaptureBackend> {
    let set_state = |s: SessionState| {
        *state.lock().unwrap() = s;
    };
    // The controller may already be gone during shutdown; a closed
    // channel is not an error here.
    let emit = |event: SessionEvent| {
        let _ = events.send(event);
    };

    let mut devices = backend.list_devices();
    if devices.is_empty() {
        warn!("No capture devices found");
        set_state(SessionState::Faulted);
        emit(SessionEvent::StartFailed(CaptureError::DeviceUnavailable(
            "no devices enumerated".into(),
        )));
        return backend;
    }

    let device = match preferred
        .as_deref()
        .and_then(|path| devices.iter().position(|d| d.path == path))
    {
        Some(index) => devices.swap_remove(index),
        None => {
            if let Some(path) = &preferred {
                warn!(path = %path, "Preferred device not found, using first");
            }
            devices.swap_remove(0)
        }
    };

    if let Err(e) = backend.open(&device) {
        warn!(error = %e, "Device open failed");
        backend.close();
        set_state(SessionState::Faulted);
        emit(SessionEvent::StartFailed(e));
        return backend;
    }

    set_state(SessionState::Configuring);
    let granted = match backend.configure(&format) {
        Ok(granted) => granted,
        Err(e) => {
            warn!(error = %e, "Session configuration failed");
            backend.close();
            set_state(SessionState::Faulted);
            emit(SessionEvent::StartFailed(e));
            return backend;
        }
    };

    set_state(SessionState::Streaming);
    emit(SessionEvent::Streaming {
        device: device.name.clone(),
        format: granted,
    });
    info!(device = %device.name, format = %granted, "Capture session streaming");

    let mut deliver = |frame: CameraFrame| {
        let frame = if processed.load(Ordering::SeqCst) {
            apply_transform(transform.as_ref(), frame, &emit)
        } else {
            frame
        };
        surface.publish(frame);
    };

    let outcome = backend.run_stream(&stop, &mut deliver);
    backend.close();

    match outcome {
        Ok(()) => {
            // Stop requested; the session object finalizes the state
            // after joining us.
            debug!("Capture worker exiting on stop request");
        }
        Err(CaptureError::Disconnected) => {
            info!("Capture device disconnected, session closed");
            set_state(SessionState::Closed);
            emit(SessionEvent::Disconnected);
        }
        Err(CaptureError::Device(code)) => {
            warn!(code, "Device fault during streaming");
            set_state(SessionState::Faulted);
            emit(SessionEvent::DeviceError { code });
        }
        Err(CaptureError::Stream(reason)) => {
            warn!(reason = %reason, "Stream failure during capture");
            set_state(SessionState::Faulted);
            emit(SessionEvent::StreamFailed);
        }
        // Only reachable for failures before streaming began, e.g. the
        // buffer setup inside run_stream.
        Err(e) => {
            warn!(error = %e, "Streaming failed to start");
            set_state(SessionState::Faulted);
            emit(SessionEvent::StartFailed(e));
        }
    }

    backend
}

/// Run the native transform; on failure forward the raw frame and
/// surface a diagnostic.
fn apply_transform(
    transform: &dyn FrameTransform,
    frame: CameraFrame,
    emit: &impl Fn(SessionEvent),
) -> CameraFrame {
    match transform.transform(&frame.data, frame.width, frame.height) {
        Ok(pixels) => CameraFrame {
            data: Arc::from(pixels),
            stride: frame.width * 4,
            ..frame
        },
        Err(e) => {
            warn!(sequence = frame.sequence, error = %e, "Transform failed, forwarding raw frame");
            emit(SessionEvent::TransformFailed);
            frame
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_pattern::{TestPatternBackend, TestPatternConfig};
    use crate::errors::TransformError;
    use crate::transform::FrameTransform;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    struct PassThrough;
    impl FrameTransform for PassThrough {
        fn transform(&self, pixels: &[u8], _w: u32, _h: u32) -> Result<Vec<u8>, TransformError> {
            Ok(pixels.to_vec())
        }
    }

    fn fast_config() -> TestPatternConfig {
        TestPatternConfig {
            frame_interval: Duration::from_millis(2),
            ..Default::default()
        }
    }

    fn session_with(
        config: TestPatternConfig,
    ) -> (CaptureSession, Arc<FrameSurface>, mpsc::Receiver<SessionEvent>) {
        let surface = Arc::new(FrameSurface::new());
        let (tx, rx) = mpsc::channel();
        let session = CaptureSession::new(
            Box::new(TestPatternBackend::new(config)),
            Arc::clone(&surface),
            Arc::new(PassThrough),
            CaptureFormat {
                width: 16,
                height: 16,
                framerate: 30,
            },
            tx,
        );
        (session, surface, rx)
    }

    fn wait_for<F: Fn() -> bool>(cond: F, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn test_start_reaches_streaming_and_frames_flow() {
        let (mut session, surface, rx) = session_with(fast_config());
        session.start();

        let event = rx.recv_timeout(Duration::from_secs(2)).expect("event");
        assert!(matches!(event, SessionEvent::Streaming { .. }));
        assert!(wait_for(|| surface.is_ready(), Duration::from_secs(2)));
        assert_eq!(session.state(), SessionState::Streaming);

        session.stop();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut session, _surface, _rx) = session_with(fast_config());
        session.start();
        session.stop();
        assert_eq!(session.state(), SessionState::Closed);
        session.stop();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let (mut session, _surface, _rx) = session_with(fast_config());
        session.stop();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_never_streaming_after_stop() {
        // Liveness/safety pairing: arbitrary start/stop sequences must
        // never leave the session Streaming with a closed handle.
        let (mut session, _surface, _rx) = session_with(fast_config());
        for _ in 0..3 {
            session.start();
            session.stop();
            assert_ne!(session.state(), SessionState::Streaming);
        }
    }

    #[test]
    fn test_preferred_device_is_selected() {
        let (mut session, _surface, rx) = session_with(TestPatternConfig {
            device_count: 2,
            ..fast_config()
        });
        session.set_preferred_device(Some("test:1".into()));
        session.start();

        let event = rx.recv_timeout(Duration::from_secs(2)).expect("event");
        match event {
            SessionEvent::Streaming { device, .. } => assert_eq!(device, "Test pattern 1"),
            other => panic!("expected streaming event, got {:?}", other),
        }
        session.stop();
    }

    #[test]
    fn test_missing_preferred_device_falls_back_to_first() {
        let (mut session, _surface, rx) = session_with(TestPatternConfig {
            device_count: 2,
            ..fast_config()
        });
        session.set_preferred_device(Some("test:9".into()));
        session.start();

        let event = rx.recv_timeout(Duration::from_secs(2)).expect("event");
        match event {
            SessionEvent::Streaming { device, .. } => assert_eq!(device, "Test pattern 0"),
            other => panic!("expected streaming event, got {:?}", other),
        }
        session.stop();
    }

    #[test]
    fn test_stream_failure_faults_with_stream_event() {
        let (mut session, _surface, rx) = session_with(TestPatternConfig {
            stream_failure_after: Some(2),
            ..fast_config()
        });
        session.start();

        let mut saw_stream_failure = false;
        while let Ok(event) = rx.recv_timeout(Duration::from_secs(2)) {
            assert!(
                !matches!(event, SessionEvent::StartFailed(_)),
                "mid-stream failure must not look like a start failure"
            );
            if event == SessionEvent::StreamFailed {
                saw_stream_failure = true;
                break;
            }
        }
        assert!(saw_stream_failure);
        assert!(wait_for(
            || session.state() == SessionState::Faulted,
            Duration::from_secs(2)
        ));
    }

    #[test]
    fn test_empty_enumeration_yields_device_unavailable() {
        let (mut session, surface, rx) = session_with(TestPatternConfig {
            device_count: 0,
            ..fast_config()
        });
        session.start();

        let event = rx.recv_timeout(Duration::from_secs(2)).expect("event");
        assert!(matches!(
            event,
            SessionEvent::StartFailed(CaptureError::DeviceUnavailable(_))
        ));
        assert!(wait_for(
            || session.state() == SessionState::Faulted,
            Duration::from_secs(2)
        ));
        assert!(!surface.is_ready());
    }

    #[test]
    fn test_open_denied_yields_device_unavailable() {
        let (mut session, _surface, rx) = session_with(TestPatternConfig {
            fail_open: true,
            ..fast_config()
        });
        session.start();

        let event = rx.recv_timeout(Duration::from_secs(2)).expect("event");
        assert!(matches!(
            event,
            SessionEvent::StartFailed(CaptureError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn test_configure_failure_faults_session() {
        let (mut session, _surface, rx) = session_with(TestPatternConfig {
            fail_configure: true,
            ..fast_config()
        });
        session.start();

        let event = rx.recv_timeout(Duration::from_secs(2)).expect("event");
        assert!(matches!(
            event,
            SessionEvent::StartFailed(CaptureError::ConfigurationFailed(_))
        ));
        assert!(wait_for(
            || session.state() == SessionState::Faulted,
            Duration::from_secs(2)
        ));
    }

    #[test]
    fn test_disconnect_closes_without_recovery() {
        let (mut session, _surface, rx) = session_with(TestPatternConfig {
            disconnect_after: Some(2),
            ..fast_config()
        });
        session.start();

        // First the streaming event, then the disconnect
        let mut saw_disconnect = false;
        while let Ok(event) = rx.recv_timeout(Duration::from_secs(2)) {
            if event == SessionEvent::Disconnected {
                saw_disconnect = true;
                break;
            }
        }
        assert!(saw_disconnect);
        assert!(wait_for(
            || session.state() == SessionState::Closed,
            Duration::from_secs(2)
        ));
    }

    #[test]
    fn test_device_error_faults_and_preserves_code() {
        let (mut session, _surface, rx) = session_with(TestPatternConfig {
            error_after: Some((2, 42)),
            ..fast_config()
        });
        session.start();

        let mut code_seen = None;
        while let Ok(event) = rx.recv_timeout(Duration::from_secs(2)) {
            if let SessionEvent::DeviceError { code } = event {
                code_seen = Some(code);
                break;
            }
        }
        assert_eq!(code_seen, Some(42));
        assert!(wait_for(
            || session.state() == SessionState::Faulted,
            Duration::from_secs(2)
        ));
    }

    #[test]
    fn test_restart_after_stop() {
        let (mut session, surface, rx) = session_with(fast_config());
        session.start();
        assert!(wait_for(|| surface.is_ready(), Duration::from_secs(2)));
        session.stop();

        // Drain events from the first run
        while rx.try_recv().is_ok() {}

        session.start();
        let event = rx.recv_timeout(Duration::from_secs(2)).expect("event");
        assert!(matches!(event, SessionEvent::Streaming { .. }));
        session.stop();
    }

    #[test]
    fn test_mode_toggle_visible_by_next_frame() {
        // A transform that stamps a marker byte makes processed frames
        // distinguishable from the raw gradient.
        struct Stamp;
        impl FrameTransform for Stamp {
            fn transform(&self, pixels: &[u8], _w: u32, _h: u32) -> Result<Vec<u8>, TransformError> {
                let mut out = pixels.to_vec();
                for px in out.chunks_exact_mut(4) {
                    px[0] = 0xEE;
                }
                Ok(out)
            }
        }

        let surface = Arc::new(FrameSurface::new());
        let (tx, _rx) = mpsc::channel();
        let mut session = CaptureSession::new(
            Box::new(TestPatternBackend::new(fast_config())),
            Arc::clone(&surface),
            Arc::new(Stamp),
            CaptureFormat {
                width: 16,
                height: 16,
                framerate: 30,
            },
            tx,
        );

        session.start();
        assert!(wait_for(|| surface.is_ready(), Duration::from_secs(2)));

        session.set_mode(true);
        assert!(
            wait_for(
                || surface
                    .acquire()
                    .map(|a| a.frame.data[0] == 0xEE)
                    .unwrap_or(false),
                Duration::from_secs(2)
            ),
            "processed frame should appear after set_mode(true)"
        );

        session.set_mode(false);
        assert!(
            wait_for(
                || surface
                    .acquire()
                    .map(|a| a.frame.data[0] != 0xEE)
                    .unwrap_or(false),
                Duration::from_secs(2)
            ),
            "raw frames should resume after set_mode(false)"
        );

        session.stop();
    }
}
