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

//! Pixel-format registry keyed by DRM FourCC codes.
//!
//! Capture sources describe their buffers with little-endian FourCC codes
//! (`XR24`, `AB24`, ...); the encoders work on RFB [`PixelFormat`] records.
//! This module is the mapping between the two worlds.

use crate::error::{PipelineError, Result};
use crate::protocol::PixelFormat;
use std::fmt;

/// Builds a little-endian FourCC code from its four characters.
#[must_use]
pub const fn fourcc_code(a: u8, b: u8, c: u8, d: u8) -> u32 {
    (a as u32) | ((b as u32) << 8) | ((c as u32) << 16) | ((d as u32) << 24)
}

/// A DRM-style FourCC pixel-format code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fourcc(pub u32);

impl Fourcc {
    /// 32-bit `[31:0] x:R:G:B 8:8:8:8` little endian.
    pub const XRGB8888: Self = Self(fourcc_code(b'X', b'R', b'2', b'4'));
    /// 32-bit `[31:0] x:B:G:R 8:8:8:8` little endian.
    pub const XBGR8888: Self = Self(fourcc_code(b'X', b'B', b'2', b'4'));
    /// 32-bit `[31:0] A:R:G:B 8:8:8:8` little endian.
    pub const ARGB8888: Self = Self(fourcc_code(b'A', b'R', b'2', b'4'));
    /// 32-bit `[31:0] A:B:G:R 8:8:8:8` little endian.
    pub const ABGR8888: Self = Self(fourcc_code(b'A', b'B', b'2', b'4'));
    /// 16-bit `[15:0] R:G:B 5:6:5` little endian.
    pub const RGB565: Self = Self(fourcc_code(b'R', b'G', b'1', b'6'));

    /// Looks this code up in the registry and returns its RFB pixel format.
    ///
    /// # Errors
    ///
    /// [`PipelineError::UnknownPixelFormat`] for codes the pipeline does not
    /// carry.
    pub fn pixel_format(self) -> Result<PixelFormat> {
        let fmt = match self {
            Self::XRGB8888 | Self::ARGB8888 => PixelFormat {
                bits_per_pixel: 32,
                depth: 24,
                big_endian_flag: 0,
                true_colour_flag: 1,
                red_max: 255,
                green_max: 255,
                blue_max: 255,
                red_shift: 16,
                green_shift: 8,
                blue_shift: 0,
            },
            Self::XBGR8888 | Self::ABGR8888 => PixelFormat {
                bits_per_pixel: 32,
                depth: 24,
                big_endian_flag: 0,
                true_colour_flag: 1,
                red_max: 255,
                green_max: 255,
                blue_max: 255,
                red_shift: 0,
                green_shift: 8,
                blue_shift: 16,
            },
            Self::RGB565 => PixelFormat {
                bits_per_pixel: 16,
                depth: 16,
                big_endian_flag: 0,
                true_colour_flag: 1,
                red_max: 31,
                green_max: 63,
                blue_max: 31,
                red_shift: 11,
                green_shift: 5,
                blue_shift: 0,
            },
            Self(other) => return Err(PipelineError::UnknownPixelFormat(other)),
        };
        Ok(fmt)
    }

    /// Bytes per pixel for this code.
    ///
    /// # Errors
    ///
    /// [`PipelineError::UnknownPixelFormat`] for unregistered codes.
    pub fn bytes_per_pixel(self) -> Result<usize> {
        Ok(self.pixel_format()?.bytes_per_pixel())
    }
}

impl fmt::Display for Fourcc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0.to_le_bytes();
        for c in b {
            if c.is_ascii_graphic() {
                write!(f, "{}", c as char)?;
            } else {
                write!(f, "\\x{c:02x}")?;
            }
        }
        Ok(())
    }
}
