//! JPEG compression support for Tight encoding.
//!
//! TurboJPEG support is optional and can be enabled with the `turbojpeg`
//! feature; without it the Tight encoder silently degrades lossy quality
//! levels to lossless.

#[cfg(feature = "turbojpeg")]
pub mod turbojpeg;

#[cfg(feature = "turbojpeg")]
pub use turbojpeg::JpegCompressor;
