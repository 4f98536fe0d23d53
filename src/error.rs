//! Error types for the frame-pipeline library.

use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur in the display-to-encoder pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A FourCC code with no entry in the pixel-format registry.
    #[error("Unknown pixel format: {0:#010x}")]
    UnknownPixelFormat(u32),

    /// Framebuffer dimensions are zero or otherwise unusable.
    #[error("Invalid framebuffer dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Offending width in pixels.
        width: u32,
        /// Offending height in pixels.
        height: u32,
    },

    /// The buffer has no CPU-readable bytes.
    #[error("Buffer not mappable: {0}")]
    Unmappable(&'static str),

    /// Encoding error.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Video codec error.
    #[error("Codec error: {0}")]
    Codec(String),

    /// The crate was built without the `open-h264` feature.
    #[error("H.264 support not compiled in")]
    H264Unavailable,

    /// Invalid operation or state.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}
