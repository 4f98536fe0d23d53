// Copyright 2026 The rfbpipe Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! FFI bindings to libjpeg-turbo's `TurboJPEG` API.
//!
//! This module provides a safe Rust wrapper around the `TurboJPEG` C API.
//! Compression goes into a caller-supplied fixed-capacity buffer
//! (`TJFLAG_NOREALLOC`): a tile whose JPEG representation would overflow
//! its output buffer is reported as a recoverable error instead of growing
//! the allocation, which is exactly the contract the Tight tile encoder
//! needs.

use crate::error::{PipelineError, Result};
use std::ffi::c_void;
use std::os::raw::{c_char, c_int, c_uchar, c_ulong};

/// RGB pixel format (red, green, blue).
const TJPF_RGB: c_int = 0;

/// 4:2:2 chrominance subsampling (2x1 subsampling).
const TJSAMP_422: c_int = 1;

/// Compress into the caller's buffer; never reallocate.
const TJFLAG_NOREALLOC: c_int = 1024;

// Opaque TurboJPEG handle
type TjHandle = *mut c_void;

#[link(name = "turbojpeg")]
extern "C" {
    fn tjInitCompress() -> TjHandle;
    fn tjDestroy(handle: TjHandle) -> c_int;
    fn tjCompress2(
        handle: TjHandle,
        src_buf: *const c_uchar,
        width: c_int,
        pitch: c_int,
        height: c_int,
        pixel_format: c_int,
        jpeg_buf: *mut *mut c_uchar,
        jpeg_size: *mut c_ulong,
        jpeg_subsamp: c_int,
        jpeg_qual: c_int,
        flags: c_int,
    ) -> c_int;
    fn tjGetErrorStr2(handle: TjHandle) -> *const c_char;
}

/// Safe wrapper for bounded-buffer `TurboJPEG` compression.
pub struct JpegCompressor {
    handle: TjHandle,
}

impl JpegCompressor {
    /// Creates a compressor instance.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Encoding`] when TurboJPEG cannot be initialised.
    pub fn new() -> Result<Self> {
        let handle = unsafe { tjInitCompress() };
        if handle.is_null() {
            return Err(PipelineError::Encoding(
                "failed to initialize TurboJPEG compressor".into(),
            ));
        }
        Ok(Self { handle })
    }

    /// Compresses RGB24 rows into `dst`, bounded by `dst`'s capacity.
    ///
    /// Uses 4:2:2 chrominance subsampling. On success `dst` holds exactly
    /// the JPEG bytes and their count is returned.
    ///
    /// # Arguments
    /// * `rgb` - tightly packed RGB data, 3 bytes per pixel
    /// * `width`/`height` - image dimensions in pixels
    /// * `quality` - JPEG quality (1-100)
    /// * `dst` - output buffer; its capacity is the hard size limit
    ///
    /// # Errors
    ///
    /// Mis-sized input, or TurboJPEG failure - including output that would
    /// exceed `dst`'s capacity.
    pub fn compress_rgb_into(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
        quality: u8,
        dst: &mut Vec<u8>,
    ) -> Result<usize> {
        let expected = width as usize * height as usize * 3;
        if rgb.len() != expected {
            return Err(PipelineError::Encoding(format!(
                "invalid RGB data size: expected {expected}, got {}",
                rgb.len()
            )));
        }

        let capacity = dst.capacity();
        dst.resize(capacity, 0);
        let mut jpeg_buf: *mut c_uchar = dst.as_mut_ptr();
        let mut jpeg_size = capacity as c_ulong;

        let result = unsafe {
            tjCompress2(
                self.handle,
                rgb.as_ptr(),
                width as c_int,
                0, // pitch = 0 means width * pixel_size
                height as c_int,
                TJPF_RGB,
                &mut jpeg_buf,
                &mut jpeg_size,
                TJSAMP_422,
                c_int::from(quality),
                TJFLAG_NOREALLOC,
            )
        };

        if result != 0 {
            dst.clear();
            return Err(PipelineError::Encoding(format!(
                "TurboJPEG compression failed: {}",
                self.error_string()
            )));
        }

        dst.truncate(jpeg_size as usize);
        Ok(jpeg_size as usize)
    }

    fn error_string(&self) -> String {
        unsafe {
            let c_str = tjGetErrorStr2(self.handle);
            if c_str.is_null() {
                return "unknown error".to_string();
            }
            std::ffi::CStr::from_ptr(c_str).to_string_lossy().into_owned()
        }
    }
}

impl Drop for JpegCompressor {
    fn drop(&mut self) {
        unsafe {
            tjDestroy(self.handle);
        }
    }
}

unsafe impl Send for JpegCompressor {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compressor_creation() {
        assert!(JpegCompressor::new().is_ok());
    }

    #[test]
    fn test_compress_rgb_into_buffer() {
        let mut compressor = JpegCompressor::new().unwrap();

        // A 16x16 red square.
        let rgb = [255u8, 0, 0].repeat(16 * 16);
        let mut dst = Vec::with_capacity(16 * 1024);
        let len = compressor.compress_rgb_into(&rgb, 16, 16, 90, &mut dst).unwrap();

        assert_eq!(dst.len(), len);
        // JPEG streams start with the SOI marker.
        assert_eq!(&dst[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_tiny_buffer_is_a_recoverable_error() {
        let mut compressor = JpegCompressor::new().unwrap();
        let rgb = [0u8; 16 * 16 * 3];
        let mut dst = Vec::with_capacity(8);
        assert!(compressor.compress_rgb_into(&rgb, 16, 16, 90, &mut dst).is_err());

        // The same compressor keeps working afterwards.
        let mut dst = Vec::with_capacity(16 * 1024);
        assert!(compressor.compress_rgb_into(&rgb, 16, 16, 90, &mut dst).is_ok());
    }

    #[test]
    fn test_wrong_input_size_rejected() {
        let mut compressor = JpegCompressor::new().unwrap();
        let mut dst = Vec::with_capacity(1024);
        assert!(compressor.compress_rgb_into(&[0u8; 10], 16, 16, 90, &mut dst).is_err());
    }
}
