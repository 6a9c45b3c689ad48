// SPDX-License-Identifier: MPL-2.0

//! edgeview - real-time camera preview with GPU edge detection
//!
//! This library provides a capture-to-render pipeline: camera frames
//! stream from a capture backend into a shared latest-frame surface,
//! optionally pass through a CPU edge-detection transform, and are
//! drawn as a textured quad by a wgpu render loop. A controller ties
//! the halves together and reports frame rate and faults to whatever
//! shell embeds it.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Capture device abstraction (V4L2, test pattern)
//! - [`capture`]: Session lifecycle and the capture worker thread
//! - [`surface`]: Single-slot frame hand-off between capture and render
//! - [`transform`]: Pluggable frame transform (edge detection)
//! - [`render`]: Shader program, frame texture upload, FPS tracking
//! - [`controller`]: Composition root and shell-facing observer API
//! - [`config`]: User configuration handling
//!
//! # Example
//!
//! ```ignore
//! // Typically run via the driver binary:
//! // edgeview run --test-pattern --frames 120
//! ```

pub mod backends;
pub mod capture;
pub mod config;
pub mod constants;
pub mod controller;
pub mod errors;
pub mod render;
pub mod surface;
pub mod transform;

// Re-export commonly used types
pub use config::Config;
pub use controller::{PipelineController, PipelineObserver};
pub use errors::{CaptureError, FaultKind, RenderError, TransformError};
pub use surface::FrameSurface;
pub use transform::{EdgeDetect, FrameTransform};
