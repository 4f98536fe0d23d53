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

//! RFB (Remote Framebuffer) wire-format constants and records used by the
//! pipeline encoders.
//!
//! Only the pieces of RFC 6143 the frame pipeline itself emits live here: the
//! rectangle head, the two encoding numbers the pipeline produces, the Tight
//! control-byte layout and compact length field, and the pixel-format record
//! the encoders translate into. Session-level messages (handshake,
//! `ServerInit`, client messages) belong to the transport layer on top.

use bytes::{BufMut, BytesMut};

// Encoding Types

/// Encoding type: Tight.
///
/// Per-tile deflate or JPEG compression with four persistent zlib streams
/// (RFC 6143 section 7.7.4).
pub const ENCODING_TIGHT: i32 = 7;

/// Encoding type: Open H.264.
///
/// An H.264 elementary stream wrapped in RFB rectangles, as defined by the
/// RFB community wiki extension registry.
pub const ENCODING_OPEN_H264: i32 = 50;

// Tight control bytes (upper nibble of the first byte of a Tight rectangle)

/// Tight basic mode on zlib stream 0; streams 1..3 are `0x10`/`0x20`/`0x30`.
pub const TIGHT_BASIC_STREAM_0: u8 = 0x00;

/// Tight JPEG mode control byte.
pub const TIGHT_JPEG: u8 = 0x90;

/// Number of persistent zlib streams a Tight connection carries.
pub const TIGHT_STREAM_COUNT: usize = 4;

/// Returns the Tight basic-mode control byte selecting `stream`.
///
/// # Panics
///
/// Panics if `stream >= TIGHT_STREAM_COUNT`.
#[must_use]
pub fn tight_basic_control(stream: usize) -> u8 {
    assert!(stream < TIGHT_STREAM_COUNT);
    TIGHT_BASIC_STREAM_0 | ((stream as u8) << 4)
}

// Open H.264 rectangle flags

/// The encoder was reconfigured; the decoder must re-initialise its context
/// before consuming this rectangle's payload.
pub const OPEN_H264_FLAG_RESET_CONTEXT: u32 = 0x1;

/// Represents the pixel format framebuffer updates are encoded in.
///
/// This struct defines how pixel data is interpreted, including color depth,
/// endianness, and RGB component details. Instances come either from the
/// FourCC registry (the capture source's layout) or from the session layer
/// (the client's negotiated format).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelFormat {
    /// Number of bits per pixel.
    pub bits_per_pixel: u8,
    /// Depth of the pixel in bits.
    pub depth: u8,
    /// Flag indicating if the pixel data is big-endian (1) or little-endian (0).
    pub big_endian_flag: u8,
    /// Flag indicating if the pixel format is true-colour (1) or colormapped (0).
    pub true_colour_flag: u8,
    /// Maximum red color value.
    pub red_max: u16,
    /// Maximum green color value.
    pub green_max: u16,
    /// Maximum blue color value.
    pub blue_max: u16,
    /// Number of shifts to apply to get the red color component.
    pub red_shift: u8,
    /// Number of shifts to apply to get the green color component.
    pub green_shift: u8,
    /// Number of shifts to apply to get the blue color component.
    pub blue_shift: u8,
}

impl PixelFormat {
    /// Number of bytes one pixel occupies in this format.
    #[must_use]
    pub fn bytes_per_pixel(&self) -> usize {
        usize::from(self.bits_per_pixel) / 8
    }

    /// Number of bytes one pixel occupies in the Tight "compact" form.
    ///
    /// Tight transmits 24-bit true colour carried in 32 bits per pixel as
    /// three bytes; every other format is passed through unchanged.
    #[must_use]
    pub fn compact_bytes_per_pixel(&self) -> usize {
        if self.bits_per_pixel == 32
            && self.depth == 24
            && self.red_max == 255
            && self.green_max == 255
            && self.blue_max == 255
        {
            3
        } else {
            self.bytes_per_pixel()
        }
    }

    /// Validates that this pixel format is usable by the encoders.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if self.bits_per_pixel != 8
            && self.bits_per_pixel != 16
            && self.bits_per_pixel != 32
        {
            return false;
        }

        if self.depth == 0 || self.depth > 32 {
            return false;
        }

        // Only true-colour formats reach the pipeline; colormapped clients
        // are translated by the session layer before requesting updates.
        if self.true_colour_flag == 0 {
            return false;
        }

        self.red_shift < 32 && self.green_shift < 32 && self.blue_shift < 32
    }
}

/// Represents a rectangle header in a framebuffer update message.
///
/// Each framebuffer update can contain multiple rectangles, each with its own
/// encoding type. The rectangle header specifies the position, dimensions,
/// and encoding of the pixel data that follows.
#[derive(Debug, Clone, Copy)]
pub struct Rectangle {
    /// X coordinate of the top-left corner.
    pub x: u16,
    /// Y coordinate of the top-left corner.
    pub y: u16,
    /// Width of the rectangle in pixels.
    pub width: u16,
    /// Height of the rectangle in pixels.
    pub height: u16,
    /// The encoding type used for this rectangle's pixel data.
    pub encoding: i32,
}

impl Rectangle {
    /// Writes the rectangle header to a byte buffer.
    ///
    /// The header format is:
    /// - 2 bytes: x position
    /// - 2 bytes: y position
    /// - 2 bytes: width
    /// - 2 bytes: height
    /// - 4 bytes: encoding type (signed 32-bit integer)
    ///
    /// All fields are big-endian.
    pub fn write_header(&self, buf: &mut BytesMut) {
        buf.put_u16(self.x);
        buf.put_u16(self.y);
        buf.put_u16(self.width);
        buf.put_u16(self.height);
        buf.put_i32(self.encoding);
    }
}

/// Writes the Tight compact length field.
///
/// Variable-length integer: each byte carries 7 value bits, least-significant
/// group first, with the MSB as a continuation flag. Lengths up to 2^21 - 1
/// fit in the three bytes the protocol allows.
pub fn put_compact_length(buf: &mut BytesMut, len: usize) {
    debug_assert!(len < (1 << 21));
    if len < 128 {
        buf.put_u8(len as u8);
    } else if len < 16384 {
        buf.put_u8(((len & 0x7F) | 0x80) as u8);
        buf.put_u8((len >> 7) as u8);
    } else {
        buf.put_u8(((len & 0x7F) | 0x80) as u8);
        buf.put_u8((((len >> 7) & 0x7F) | 0x80) as u8);
        buf.put_u8((len >> 14) as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_length_one_byte() {
        let mut buf = BytesMut::new();
        put_compact_length(&mut buf, 0);
        assert_eq!(&buf[..], &[0x00]);

        buf.clear();
        put_compact_length(&mut buf, 127);
        assert_eq!(&buf[..], &[0x7F]);
    }

    #[test]
    fn test_compact_length_two_bytes() {
        let mut buf = BytesMut::new();
        put_compact_length(&mut buf, 128);
        assert_eq!(&buf[..], &[0x80, 0x01]);

        buf.clear();
        put_compact_length(&mut buf, 16383);
        assert_eq!(&buf[..], &[0xFF, 0x7F]);
    }

    #[test]
    fn test_compact_length_three_bytes() {
        let mut buf = BytesMut::new();
        put_compact_length(&mut buf, 16384);
        assert_eq!(&buf[..], &[0x80, 0x80, 0x01]);

        buf.clear();
        put_compact_length(&mut buf, (1 << 21) - 1);
        assert_eq!(&buf[..], &[0xFF, 0xFF, 0x7F]);
    }

    #[test]
    fn test_rectangle_header_is_big_endian() {
        let rect = Rectangle {
            x: 0x0102,
            y: 0x0304,
            width: 0x0506,
            height: 0x0708,
            encoding: ENCODING_OPEN_H264,
        };
        let mut buf = BytesMut::new();
        rect.write_header(&mut buf);
        assert_eq!(
            &buf[..],
            &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x00, 0x00, 0x00, 50]
        );
    }

    #[test]
    fn test_basic_control_bytes() {
        assert_eq!(tight_basic_control(0), 0x00);
        assert_eq!(tight_basic_control(1), 0x10);
        assert_eq!(tight_basic_control(2), 0x20);
        assert_eq!(tight_basic_control(3), 0x30);
    }

    #[test]
    fn test_compact_pixel_size() {
        let fmt = PixelFormat {
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
        };
        assert_eq!(fmt.compact_bytes_per_pixel(), 3);

        let fmt16 = PixelFormat {
            bits_per_pixel: 16,
            depth: 16,
            red_max: 31,
            green_max: 63,
            blue_max: 31,
            red_shift: 11,
            green_shift: 5,
            blue_shift: 0,
            ..fmt
        };
        assert_eq!(fmt16.compact_bytes_per_pixel(), 2);
    }
}
