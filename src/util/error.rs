//! Error types for the voxtrace library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for voxtrace operations.
#[derive(Error, Debug)]
pub enum Error {
    /// No usable compute adapter or device
    #[error("Compute device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Adapter found, but below the capabilities the kernels need
    #[error("Unsupported compute device: {0}")]
    UnsupportedDevice(String),

    /// Kernel source failed validation; `log` holds the full compiler output
    #[error("Shader '{label}' failed to build:\n{log}")]
    ShaderBuild { label: String, log: String },

    /// Host scene could not be exported for upload
    #[error("Scene export failed: {0}")]
    SceneExport(String),

    /// Packed image needs more rows than the device allows
    #[error("Scene too large: {what} needs {rows} rows (device limit {limit})")]
    SceneTooLarge { what: &'static str, rows: u32, limit: u32 },

    /// Intersection requested before any scene was uploaded
    #[error("No scene resident on the compute device")]
    NoScene,

    /// Results could not be read back after a dispatch
    #[error("Readback failed: {0}")]
    Readback(String),

    /// Malformed request passed to a device call
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Sample index outside the frame buffer
    #[error("Pixel ({x}, {y}) outside {width}x{height} buffer")]
    GeometryMismatch { x: usize, y: usize, width: usize, height: usize },

    /// Invalid render parameters
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Parameter file does not exist or cannot be accessed
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a readback error from anything printable.
    pub fn readback(msg: impl Into<String>) -> Self {
        Self::Readback(msg.into())
    }

    /// Create an invalid input error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Result type alias for voxtrace operations.
pub type Result<T> = std::result::Result<T, Error>;
