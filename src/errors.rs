// SPDX-License-Identifier: MPL-2.0

//! Error types for the capture-to-render pipeline

use std::fmt;

/// Result type alias for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Result type alias for render operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Capture-side errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// No device present, permission denied, or device busy.
    /// Fatal to `start()`; never retried automatically.
    DeviceUnavailable(String),
    /// Session configuration against the output surface failed.
    /// The session transitions to Faulted; restart is the caller's call.
    ConfigurationFailed(String),
    /// The device was revoked externally while streaming
    Disconnected,
    /// Device-reported fault during streaming; the code is preserved
    /// for diagnostics
    Device(i32),
    /// Transient streaming error (buffer dequeue, mmap, etc.)
    Stream(String),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::DeviceUnavailable(msg) => write!(f, "Device unavailable: {}", msg),
            CaptureError::ConfigurationFailed(msg) => write!(f, "Configuration failed: {}", msg),
            CaptureError::Disconnected => write!(f, "Capture device disconnected"),
            CaptureError::Device(code) => write!(f, "Device error (code {})", code),
            CaptureError::Stream(msg) => write!(f, "Stream error: {}", msg),
        }
    }
}

/// Shader stage identifier carried by compile errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

/// Render-side errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// A single shader stage failed to compile
    ShaderCompile { stage: ShaderStage, log: String },
    /// Both stages compiled but the combined program failed validation
    Link { log: String },
    /// GPU adapter or device acquisition failed
    InitFailed(String),
    /// A draw callback arrived before `on_surface_created` succeeded
    NotReady,
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::ShaderCompile { stage, log } => {
                write!(f, "{} shader compile error: {}", stage, log)
            }
            RenderError::Link { log } => write!(f, "Shader link error: {}", log),
            RenderError::InitFailed(msg) => write!(f, "Render initialization failed: {}", msg),
            RenderError::NotReady => write!(f, "Render loop not initialized"),
        }
    }
}

/// Failure of the pluggable frame transform.
///
/// Non-fatal by design: the pipeline degrades to raw pass-through for
/// the affected frame only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformError {
    pub reason: String,
}

impl TransformError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame transform failed: {}", self.reason)
    }
}

/// Fault classification reported upward through the controller.
///
/// These are the only error shapes that cross into the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// No camera found, permission denied, or device busy
    DeviceUnavailable,
    /// Session configuration failed; manual restart may be offered
    ConfigurationFailed,
    /// External device revocation; session closed cleanly
    CaptureDisconnected,
    /// Device-reported streaming fault with its diagnostic code
    CaptureError(i32),
    /// Streaming failed without a device error code
    StreamFailed,
    /// Shader compile/link failure at initialization; pipeline cannot render
    RenderInitFailed,
    /// The frame transform is failing; output degraded to raw pass-through
    TransformFailed,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::DeviceUnavailable => write!(f, "No camera available"),
            FaultKind::ConfigurationFailed => write!(f, "Camera configuration failed"),
            FaultKind::CaptureDisconnected => write!(f, "Camera disconnected"),
            FaultKind::CaptureError(code) => write!(f, "Camera error (code {})", code),
            FaultKind::StreamFailed => write!(f, "Camera stream failed"),
            FaultKind::RenderInitFailed => write!(f, "Renderer initialization failed"),
            FaultKind::TransformFailed => write!(f, "Frame transform failed"),
        }
    }
}

impl std::error::Error for CaptureError {}
impl std::error::Error for RenderError {}
impl std::error::Error for TransformError {}
