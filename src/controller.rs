// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline controller
//!
//! Composition root for one capture-to-render pipeline: owns the
//! session, the shared surface and the render loop, and translates
//! worker events into shell-facing fault notifications. The shell (a
//! windowing layer or the headless driver) talks only to this type.
//!
//! ```text
//!  shell / driver
//!        |
//!        v
//!  PipelineController ----> CaptureSession ----> CaptureBackend
//!        |    ^                   |
//!        |    | SessionEvents     v (worker thread)
//!        |    +-------------  FrameSurface
//!        v                        ^
//!   RenderLoop  <-----------------+
//! ```

use crate::backends::types::CaptureFormat;
use crate::backends::CaptureBackend;
use crate::capture::{CaptureSession, SessionEvent, SessionState};
use crate::constants::TRANSFORM_NOTICE_INTERVAL;
use crate::errors::{CaptureError, FaultKind, RenderResult};
use crate::render::{RenderContext, RenderLoop};
use crate::surface::FrameSurface;
use crate::transform::FrameTransform;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Shell-facing notifications.
///
/// All methods have empty defaults; a shell implements only what it
/// displays. Callbacks fire on the thread that calls into the
/// controller, never from the capture worker.
pub trait PipelineObserver {
    /// Measured frame count for the last render window
    fn on_fps_update(&mut self, _fps: u32) {}
    /// A fault crossed the pipeline boundary
    fn on_fault(&mut self, _fault: FaultKind) {}
    /// The raw/processed mode changed
    fn on_mode_changed(&mut self, _processed: bool) {}
    /// The capture session reached the streaming state
    fn on_streaming(&mut self, _device: &str, _format: CaptureFormat) {}
}

/// Owns and coordinates one pipeline instance
pub struct PipelineController {
    session: CaptureSession,
    render: RenderLoop,
    surface: Arc<FrameSurface>,
    events: Receiver<SessionEvent>,
    observer: Box<dyn PipelineObserver>,
    last_transform_notice: Option<Instant>,
}

impl PipelineController {
    pub fn new(
        backend: Box<dyn CaptureBackend>,
        transform: Arc<dyn FrameTransform>,
        format: CaptureFormat,
        observer: Box<dyn PipelineObserver>,
    ) -> Self {
        let surface = Arc::new(FrameSurface::new());
        let (tx, rx) = mpsc::channel();
        let session = CaptureSession::new(
            backend,
            Arc::clone(&surface),
            transform,
            format,
            tx,
        );
        let render = RenderLoop::new(Arc::clone(&surface));

        Self {
            session,
            render,
            surface,
            events: rx,
            observer,
            last_transform_notice: None,
        }
    }

    /// Prefer the device with this path on the next start.
    ///
    /// Falls back to the first enumerated device when unset or when no
    /// device matches.
    pub fn set_preferred_device(&mut self, path: Option<String>) {
        self.session.set_preferred_device(path);
    }

    /// Start capturing; render init is independent and may come later
    pub fn start(&mut self) {
        self.session.start();
    }

    /// Stop capturing and wait for the worker to quiesce
    pub fn stop(&mut self) {
        self.session.stop();
        self.pump_events();
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// True once at least one frame reached the surface
    pub fn has_frame(&self) -> bool {
        self.surface.is_ready()
    }

    /// Select raw pass-through or processed mode.
    ///
    /// Takes effect on the next delivered frame; no restart involved.
    pub fn set_mode(&mut self, processed: bool) {
        if self.session.mode() == processed {
            return;
        }
        self.session.set_mode(processed);
        info!(processed, "Pipeline mode changed");
        self.observer.on_mode_changed(processed);
    }

    /// Flip the mode and return the new value
    pub fn toggle_mode(&mut self) -> bool {
        let next = !self.session.mode();
        self.set_mode(next);
        next
    }

    /// True when frames run through the transform
    pub fn mode(&self) -> bool {
        self.session.mode()
    }

    /// Initialize the render loop against a GPU context.
    ///
    /// A shader failure here is reported as a fault and returned; the
    /// pipeline cannot render without a program.
    pub fn init_render(&mut self, context: RenderContext) -> RenderResult<()> {
        self.render.on_surface_created(context).inspect_err(|e| {
            warn!(error = %e, "Render initialization failed");
            self.observer.on_fault(FaultKind::RenderInitFailed);
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.render.on_surface_resized(width, height);
    }

    /// Draw one frame and surface any pending worker events.
    ///
    /// This is the once-per-refresh entry point; event delivery rides
    /// on the render cadence so no extra polling thread exists.
    pub fn draw(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
    ) -> RenderResult<()> {
        self.pump_events();

        if let Some(fps) = self.render.on_draw_frame(encoder, target)? {
            self.observer.on_fps_update(fps);
        }
        Ok(())
    }

    /// Drain pending session events into observer notifications.
    ///
    /// Called from `draw`, but also usable standalone when no render
    /// context exists (headless fault checks, tests).
    pub fn pump_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                SessionEvent::Streaming { device, format } => {
                    self.observer.on_streaming(&device, format);
                }
                SessionEvent::StartFailed(error) => {
                    self.observer.on_fault(start_fault(&error));
                }
                SessionEvent::Disconnected => {
                    self.observer.on_fault(FaultKind::CaptureDisconnected);
                }
                SessionEvent::DeviceError { code } => {
                    self.observer.on_fault(FaultKind::CaptureError(code));
                }
                SessionEvent::StreamFailed => {
                    self.observer.on_fault(FaultKind::StreamFailed);
                }
                SessionEvent::TransformFailed => self.notify_transform_failure(),
            }
        }
    }

    /// Rate-limit transform failure notifications.
    ///
    /// A broken transform fails on every frame; the shell gets one
    /// notice per interval while the log keeps the full record.
    fn notify_transform_failure(&mut self) {
        let now = Instant::now();
        let due = self
            .last_transform_notice
            .map(|last| now.duration_since(last) >= TRANSFORM_NOTICE_INTERVAL)
            .unwrap_or(true);

        if due {
            self.last_transform_notice = Some(now);
            self.observer.on_fault(FaultKind::TransformFailed);
        }
    }
}

fn start_fault(error: &CaptureError) -> FaultKind {
    match error {
        CaptureError::DeviceUnavailable(_) => FaultKind::DeviceUnavailable,
        CaptureError::Disconnected => FaultKind::CaptureDisconnected,
        CaptureError::Device(code) => FaultKind::CaptureError(*code),
        CaptureError::ConfigurationFailed(_) | CaptureError::Stream(_) => {
            FaultKind::ConfigurationFailed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_pattern::{TestPatternBackend, TestPatternConfig};
    use crate::errors::TransformError;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Observer that records everything through a shared handle
    #[derive(Clone, Default)]
    struct Recorder {
        faults: Arc<Mutex<Vec<FaultKind>>>,
        modes: Arc<Mutex<Vec<bool>>>,
    }

    impl PipelineObserver for Recorder {
        fn on_fault(&mut self, fault: FaultKind) {
            self.faults.lock().unwrap().push(fault);
        }
        fn on_mode_changed(&mut self, processed: bool) {
            self.modes.lock().unwrap().push(processed);
        }
    }

    struct PassThrough;
    impl FrameTransform for PassThrough {
        fn transform(&self, pixels: &[u8], _w: u32, _h: u32) -> Result<Vec<u8>, TransformError> {
            Ok(pixels.to_vec())
        }
    }

    struct AlwaysFails;
    impl FrameTransform for AlwaysFails {
        fn transform(&self, _p: &[u8], _w: u32, _h: u32) -> Result<Vec<u8>, TransformError> {
            Err(TransformError::new("simulated failure"))
        }
    }

    fn controller_with(
        config: TestPatternConfig,
        transform: Arc<dyn FrameTransform>,
        observer: Recorder,
    ) -> PipelineController {
        PipelineController::new(
            Box::new(TestPatternBackend::new(config)),
            transform,
            CaptureFormat {
                width: 16,
                height: 16,
                framerate: 30,
            },
            Box::new(observer),
        )
    }

    fn fast_config() -> TestPatternConfig {
        TestPatternConfig {
            frame_interval: Duration::from_millis(2),
            ..Default::default()
        }
    }

    #[test]
    fn test_toggle_twice_restores_mode() {
        let recorder = Recorder::default();
        let mut controller =
            controller_with(fast_config(), Arc::new(PassThrough), recorder.clone());

        assert!(!controller.mode());
        assert!(controller.toggle_mode());
        assert!(!controller.toggle_mode());
        assert!(!controller.mode());
        assert_eq!(*recorder.modes.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn test_set_mode_to_current_value_is_silent() {
        let recorder = Recorder::default();
        let mut controller =
            controller_with(fast_config(), Arc::new(PassThrough), recorder.clone());

        controller.set_mode(false);
        assert!(recorder.modes.lock().unwrap().is_empty());
    }

    #[test]
    fn test_no_devices_reports_device_unavailable() {
        let recorder = Recorder::default();
        let mut controller = controller_with(
            TestPatternConfig {
                device_count: 0,
                ..fast_config()
            },
            Arc::new(PassThrough),
            recorder.clone(),
        );

        controller.start();
        let deadline = Instant::now() + Duration::from_secs(2);
        while recorder.faults.lock().unwrap().is_empty() && Instant::now() < deadline {
            controller.pump_events();
            std::thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(
            recorder.faults.lock().unwrap().first(),
            Some(&FaultKind::DeviceUnavailable)
        );
        assert!(!controller.has_frame());
        controller.stop();
    }

    #[test]
    fn test_device_error_code_reaches_observer() {
        let recorder = Recorder::default();
        let mut controller = controller_with(
            TestPatternConfig {
                error_after: Some((2, 42)),
                ..fast_config()
            },
            Arc::new(PassThrough),
            recorder.clone(),
        );

        controller.start();
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            controller.pump_events();
            if recorder
                .faults
                .lock()
                .unwrap()
                .contains(&FaultKind::CaptureError(42))
            {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }

        assert!(recorder
            .faults
            .lock()
            .unwrap()
            .contains(&FaultKind::CaptureError(42)));
        controller.stop();
    }

    #[test]
    fn test_stream_failure_is_not_a_configuration_fault() {
        let recorder = Recorder::default();
        let mut controller = controller_with(
            TestPatternConfig {
                stream_failure_after: Some(2),
                ..fast_config()
            },
            Arc::new(PassThrough),
            recorder.clone(),
        );

        controller.start();
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            controller.pump_events();
            if recorder
                .faults
                .lock()
                .unwrap()
                .contains(&FaultKind::StreamFailed)
            {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        controller.stop();

        let faults = recorder.faults.lock().unwrap();
        assert!(faults.contains(&FaultKind::StreamFailed));
        assert!(!faults.contains(&FaultKind::ConfigurationFailed));
    }

    #[test]
    fn test_transform_failures_are_rate_limited() {
        let recorder = Recorder::default();
        let mut controller =
            controller_with(fast_config(), Arc::new(AlwaysFails), recorder.clone());

        controller.set_mode(true);
        controller.start();

        // Let well over TRANSFORM_NOTICE_INTERVAL worth of failing
        // frames accumulate in far less wall time than the interval.
        let deadline = Instant::now() + Duration::from_millis(200);
        while Instant::now() < deadline {
            controller.pump_events();
            std::thread::sleep(Duration::from_millis(5));
        }
        controller.stop();

        let notices = recorder
            .faults
            .lock()
            .unwrap()
            .iter()
            .filter(|f| **f == FaultKind::TransformFailed)
            .count();
        assert_eq!(notices, 1, "expected exactly one rate-limited notice");
    }

    #[test]
    fn test_failing_transform_still_delivers_frames() {
        let recorder = Recorder::default();
        let mut controller =
            controller_with(fast_config(), Arc::new(AlwaysFails), recorder.clone());

        controller.set_mode(true);
        controller.start();

        let deadline = Instant::now() + Duration::from_secs(2);
        while !controller.has_frame() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(controller.has_frame(), "raw frames should be forwarded");
        controller.stop();
    }
}
