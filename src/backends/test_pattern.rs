// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic capture backend
//!
//! Generates a moving gradient without touching any hardware. Used by
//! the `--test-pattern` driver flag and by the test suite, where its
//! fault injection knobs simulate missing devices, configuration
//! failures, mid-stream disconnects, and device errors.

use super::types::{CameraDevice, CameraFrame, CaptureFormat};
use super::CaptureBackend;
use crate::errors::{CaptureError, CaptureResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Fault injection and timing knobs for the synthetic source
#[derive(Debug, Clone)]
pub struct TestPatternConfig {
    /// Number of devices reported by enumeration
    pub device_count: usize,
    /// Make `open` fail with `DeviceUnavailable` (permission denied / busy)
    pub fail_open: bool,
    /// Make `configure` fail with `ConfigurationFailed`
    pub fail_configure: bool,
    /// Simulate external revocation after this many delivered frames
    pub disconnect_after: Option<u64>,
    /// Simulate a device fault with the given code after N frames
    pub error_after: Option<(u64, i32)>,
    /// Simulate a codeless stream failure after N frames
    pub stream_failure_after: Option<u64>,
    /// Delay between delivered frames
    pub frame_interval: Duration,
}

impl Default for TestPatternConfig {
    fn default() -> Self {
        Self {
            device_count: 1,
            fail_open: false,
            fail_configure: false,
            disconnect_after: None,
            error_after: None,
            stream_failure_after: None,
            frame_interval: Duration::from_millis(33),
        }
    }
}

/// Synthetic capture backend
pub struct TestPatternBackend {
    config: TestPatternConfig,
    opened: bool,
    granted: Option<CaptureFormat>,
    sequence: u64,
}

impl TestPatternBackend {
    pub fn new(config: TestPatternConfig) -> Self {
        Self {
            config,
            opened: false,
            granted: None,
            sequence: 0,
        }
    }

    /// Render one gradient frame; the pattern scrolls with the sequence
    /// number so consecutive frames are distinguishable.
    fn render_frame(&self, format: &CaptureFormat) -> CameraFrame {
        let w = format.width as usize;
        let h = format.height as usize;
        let phase = (self.sequence % 256) as u8;

        let mut rgba = vec![0u8; w * h * 4];
        for y in 0..h {
            for x in 0..w {
                let idx = (y * w + x) * 4;
                rgba[idx] = ((x * 255) / w.max(1)) as u8;
                rgba[idx + 1] = ((y * 255) / h.max(1)) as u8;
                rgba[idx + 2] = phase;
                rgba[idx + 3] = 255;
            }
        }

        CameraFrame {
            width: format.width,
            height: format.height,
            stride: format.width * 4,
            data: Arc::from(rgba),
            sequence: self.sequence,
            captured_at: Instant::now(),
        }
    }
}

impl Default for TestPatternBackend {
    fn default() -> Self {
        Self::new(TestPatternConfig::default())
    }
}

impl CaptureBackend for TestPatternBackend {
    fn list_devices(&mut self) -> Vec<CameraDevice> {
        (0..self.config.device_count)
            .map(|i| CameraDevice {
                name: format!("Test pattern {}", i),
                path: format!("test:{}", i),
            })
            .collect()
    }

    fn open(&mut self, device: &CameraDevice) -> CaptureResult<()> {
        if self.config.fail_open {
            return Err(CaptureError::DeviceUnavailable(
                "simulated open denial".into(),
            ));
        }
        debug!(path = %device.path, "Test pattern device opened");
        self.opened = true;
        Ok(())
    }

    fn configure(&mut self, requested: &CaptureFormat) -> CaptureResult<CaptureFormat> {
        if !self.opened {
            return Err(CaptureError::ConfigurationFailed("device not open".into()));
        }
        if self.config.fail_configure {
            return Err(CaptureError::ConfigurationFailed(
                "simulated configuration failure".into(),
            ));
        }
        self.granted = Some(*requested);
        Ok(*requested)
    }

    fn run_stream(
        &mut self,
        stop: &AtomicBool,
        deliver: &mut dyn FnMut(CameraFrame),
    ) -> CaptureResult<()> {
        let format = self
            .granted
            .ok_or_else(|| CaptureError::ConfigurationFailed("format not configured".into()))?;

        info!(format = %format, "Test pattern stream started");

        while !stop.load(Ordering::SeqCst) {
            self.sequence += 1;

            if let Some(limit) = self.config.disconnect_after
                && self.sequence > limit
            {
                return Err(CaptureError::Disconnected);
            }
            if let Some((limit, code)) = self.config.error_after
                && self.sequence > limit
            {
                return Err(CaptureError::Device(code));
            }
            if let Some(limit) = self.config.stream_failure_after
                && self.sequence > limit
            {
                return Err(CaptureError::Stream("simulated dequeue failure".into()));
            }

            deliver(self.render_frame(&format));
            std::thread::sleep(self.config.frame_interval);
        }

        Ok(())
    }

    fn close(&mut self) {
        self.opened = false;
        self.granted = None;
    }
}
