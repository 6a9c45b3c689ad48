// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 capture backend
//!
//! Streams frames from `/dev/video*` using memory-mapped buffers. Raw
//! YUYV output is converted to RGBA on the capture thread before
//! delivery, so consumers never see a device-specific layout.

use super::format_converters::yuyv_to_rgba;
use super::types::{CameraDevice, CameraFrame, CaptureFormat};
use super::CaptureBackend;
use crate::constants::CAPTURE_BUFFER_COUNT;
use crate::errors::{CaptureError, CaptureResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

/// V4L2 backend state
pub struct V4l2Backend {
    device: Option<Device>,
    granted: Option<CaptureFormat>,
    /// Row stride in bytes of the granted YUYV format
    stride: u32,
}

impl V4l2Backend {
    pub fn new() -> Self {
        Self {
            device: None,
            granted: None,
            stride: 0,
        }
    }

    /// Map an I/O error from a streaming call onto the capture taxonomy.
    ///
    /// ENODEV means the kernel revoked the device (unplug); everything
    /// else is reported as a device fault with its errno preserved.
    fn stream_error(err: std::io::Error) -> CaptureError {
        const ENODEV: i32 = 19;
        match err.raw_os_error() {
            Some(ENODEV) => CaptureError::Disconnected,
            Some(code) => CaptureError::Device(code),
            None => CaptureError::Stream(err.to_string()),
        }
    }
}

impl Default for V4l2Backend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for V4l2Backend {
    fn list_devices(&mut self) -> Vec<CameraDevice> {
        let mut devices = Vec::new();

        for node in v4l::context::enum_devices() {
            let path = node.path().to_string_lossy().to_string();

            // Skip nodes that cannot capture video (metadata nodes, etc.)
            let Ok(dev) = Device::with_path(node.path()) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps
                .capabilities
                .contains(v4l::capability::Flags::VIDEO_CAPTURE)
            {
                continue;
            }

            let name = node.name().unwrap_or_else(|| caps.card.clone());
            debug!(path = %path, name = %name, "Found capture device");
            devices.push(CameraDevice { name, path });
        }

        devices.sort_by(|a, b| a.path.cmp(&b.path));
        devices
    }

    fn open(&mut self, device: &CameraDevice) -> CaptureResult<()> {
        info!(path = %device.path, name = %device.name, "Opening V4L2 device");

        let dev = Device::with_path(&device.path)
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        self.device = Some(dev);
        Ok(())
    }

    fn configure(&mut self, requested: &CaptureFormat) -> CaptureResult<CaptureFormat> {
        let dev = self
            .device
            .as_ref()
            .ok_or_else(|| CaptureError::ConfigurationFailed("device not open".into()))?;

        let wanted = Format::new(requested.width, requested.height, FourCC::new(b"YUYV"));
        let granted = dev
            .set_format(&wanted)
            .map_err(|e| CaptureError::ConfigurationFailed(e.to_string()))?;

        if granted.fourcc != FourCC::new(b"YUYV") {
            return Err(CaptureError::ConfigurationFailed(format!(
                "device does not support YUYV (offered {})",
                granted.fourcc
            )));
        }

        let params = v4l::video::capture::Parameters::with_fps(requested.framerate);
        let granted_params = dev
            .set_params(&params)
            .map_err(|e| CaptureError::ConfigurationFailed(e.to_string()))?;

        let framerate = if granted_params.interval.numerator > 0 {
            granted_params.interval.denominator / granted_params.interval.numerator
        } else {
            requested.framerate
        };

        let format = CaptureFormat {
            width: granted.width,
            height: granted.height,
            framerate,
        };

        self.stride = if granted.stride > 0 {
            granted.stride
        } else {
            granted.width * 2
        };

        info!(format = %format, stride = self.stride, "V4L2 format configured");
        self.granted = Some(format);
        Ok(format)
    }

    fn run_stream(
        &mut self,
        stop: &AtomicBool,
        deliver: &mut dyn FnMut(CameraFrame),
    ) -> CaptureResult<()> {
        let dev = self
            .device
            .as_ref()
            .ok_or_else(|| CaptureError::ConfigurationFailed("device not open".into()))?;
        let format = self
            .granted
            .ok_or_else(|| CaptureError::ConfigurationFailed("format not configured".into()))?;

        let mut stream = MmapStream::with_buffers(dev, Type::VideoCapture, CAPTURE_BUFFER_COUNT)
            .map_err(|e| CaptureError::ConfigurationFailed(e.to_string()))?;

        info!(format = %format, "V4L2 stream started");

        let tight_stride = format.width * 2;
        let mut sequence: u64 = 0;

        while !stop.load(Ordering::SeqCst) {
            let (buf, meta) = match stream.next() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, "V4L2 dequeue failed");
                    return Err(Self::stream_error(e));
                }
            };

            // Strip row padding before conversion when the driver packs
            // lines wider than the image.
            let rgba = if self.stride == tight_stride {
                yuyv_to_rgba(buf, format.width, format.height)
            } else {
                let mut packed = Vec::with_capacity((tight_stride * format.height) as usize);
                for row in buf.chunks_exact(self.stride as usize).take(format.height as usize) {
                    packed.extend_from_slice(&row[..tight_stride as usize]);
                }
                yuyv_to_rgba(&packed, format.width, format.height)
            };

            sequence = if meta.sequence > 0 {
                meta.sequence as u64
            } else {
                sequence + 1
            };

            deliver(CameraFrame {
                width: format.width,
                height: format.height,
                stride: format.width * 4,
                data: Arc::from(rgba),
                sequence,
                captured_at: Instant::now(),
            });
        }

        debug!("V4L2 stream stop requested");
        Ok(())
    }

    fn close(&mut self) {
        if self.device.take().is_some() {
            info!("V4L2 device closed");
        }
        self.granted = None;
        self.stride = 0;
    }
}
