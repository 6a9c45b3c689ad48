// SPDX-License-Identifier: GPL-3.0-only

//! Capture backend abstraction
//!
//! This module provides a trait-based abstraction over the platform
//! capture API so the session logic stays device-agnostic.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │ PipelineController  │
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │   CaptureSession    │  ← Lifecycle state machine, worker thread
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │ CaptureBackend Trait│  ← Common interface
//! └──────────┬──────────┘
//!            │
//!       ┌────┴─────┐
//!       ▼          ▼
//!   ┌──────┐ ┌───────────┐
//!   │ V4L2 │ │TestPattern│
//!   └──────┘ └───────────┘
//! ```

pub mod format_converters;
pub mod test_pattern;
pub mod types;
pub mod v4l2;

pub use types::*;

use crate::errors::CaptureResult;
use std::sync::atomic::AtomicBool;

/// Capture backend trait
///
/// The session drives a backend through a strict sequence:
/// `list_devices` → `open` → `configure` → `run_stream` → `close`.
/// All calls happen on the session's worker thread, never concurrently.
pub trait CaptureBackend: Send {
    /// Enumerate available capture devices
    fn list_devices(&mut self) -> Vec<CameraDevice>;

    /// Open a device handle.
    ///
    /// Fails with `DeviceUnavailable` if the device is gone, busy, or
    /// access is denied.
    fn open(&mut self, device: &CameraDevice) -> CaptureResult<()>;

    /// Negotiate a capture format against the open device.
    ///
    /// Returns the format actually granted, which may differ from the
    /// request. Fails with `ConfigurationFailed`.
    fn configure(&mut self, requested: &CaptureFormat) -> CaptureResult<CaptureFormat>;

    /// Run the repeating capture request.
    ///
    /// Delivers frames to `deliver` until `stop` is raised (returns
    /// `Ok(())`) or the device faults (`Disconnected` / `Device(code)`).
    /// Blocks the calling thread for the life of the stream.
    fn run_stream(
        &mut self,
        stop: &AtomicBool,
        deliver: &mut dyn FnMut(CameraFrame),
    ) -> CaptureResult<()>;

    /// Release the device handle. Safe to call in any state.
    fn close(&mut self);
}

/// Get the default backend for this platform
pub fn get_backend() -> Box<dyn CaptureBackend> {
    Box::new(v4l2::V4l2Backend::new())
}
