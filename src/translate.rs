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

//! Pixel translation between the capture source's layout and the client's
//! negotiated format.
//!
//! The encoders work row-by-row: a source row in any registry format is
//! rewritten into the destination format, optionally in the Tight "compact"
//! 3-byte true-colour form, or into plain RGB24 for the JPEG and H.264
//! paths. Translation is direct per-pixel arithmetic; the optimizer turns
//! the shift/mask chains into tight loops without lookup tables.

use crate::protocol::PixelFormat;

/// Reads one pixel value from `px` according to `fmt`.
pub(crate) fn read_pixel(px: &[u8], fmt: &PixelFormat) -> u32 {
    match fmt.bits_per_pixel {
        8 => u32::from(px[0]),
        16 => {
            if fmt.big_endian_flag != 0 {
                u32::from(u16::from_be_bytes([px[0], px[1]]))
            } else {
                u32::from(u16::from_le_bytes([px[0], px[1]]))
            }
        }
        32 => {
            if fmt.big_endian_flag != 0 {
                u32::from_be_bytes([px[0], px[1], px[2], px[3]])
            } else {
                u32::from_le_bytes([px[0], px[1], px[2], px[3]])
            }
        }
        other => unreachable!("unsupported bits per pixel: {other}"),
    }
}

/// Extracts 8-bit RGB components from a pixel value in the given format.
pub(crate) fn extract_rgb(pixel: u32, fmt: &PixelFormat) -> (u8, u8, u8) {
    let r = (pixel >> fmt.red_shift) as u16 & fmt.red_max;
    let g = (pixel >> fmt.green_shift) as u16 & fmt.green_max;
    let b = (pixel >> fmt.blue_shift) as u16 & fmt.blue_max;
    (
        scale_component(r, fmt.red_max),
        scale_component(g, fmt.green_max),
        scale_component(b, fmt.blue_max),
    )
}

/// Scales a colour component from `0..=max` up to `0..=255`.
fn scale_component(value: u16, max: u16) -> u8 {
    if max == 0 {
        return 0;
    }
    ((u32::from(value) * 255) / u32::from(max)) as u8
}

/// Scales an 8-bit colour component down to `0..=max`.
fn downscale_component(value: u8, max: u16) -> u16 {
    ((u32::from(value) * u32::from(max) + 127) / 255) as u16
}

/// Appends one pixel in the destination format.
pub(crate) fn pack_pixel(dst: &mut Vec<u8>, r: u8, g: u8, b: u8, fmt: &PixelFormat) {
    let value = (u32::from(downscale_component(r, fmt.red_max)) << fmt.red_shift)
        | (u32::from(downscale_component(g, fmt.green_max)) << fmt.green_shift)
        | (u32::from(downscale_component(b, fmt.blue_max)) << fmt.blue_shift);
    match fmt.bits_per_pixel {
        8 => dst.push(value as u8),
        16 => {
            let bytes = if fmt.big_endian_flag != 0 {
                (value as u16).to_be_bytes()
            } else {
                (value as u16).to_le_bytes()
            };
            dst.extend_from_slice(&bytes);
        }
        32 => {
            let bytes = if fmt.big_endian_flag != 0 {
                value.to_be_bytes()
            } else {
                value.to_le_bytes()
            };
            dst.extend_from_slice(&bytes);
        }
        other => unreachable!("unsupported bits per pixel: {other}"),
    }
}

/// Translates one row of pixels from `src_fmt` into `dst_fmt`.
///
/// With `compact` set, 24-bit true colour is emitted as three `R G B` bytes
/// per pixel — the Tight wire form. The flag is ignored for formats that are
/// not compactable.
pub(crate) fn translate_row(
    dst: &mut Vec<u8>,
    src: &[u8],
    src_fmt: &PixelFormat,
    dst_fmt: &PixelFormat,
    compact: bool,
) {
    let src_bpp = src_fmt.bytes_per_pixel();
    let compact = compact && dst_fmt.compact_bytes_per_pixel() == 3;
    for px in src.chunks_exact(src_bpp) {
        let (r, g, b) = extract_rgb(read_pixel(px, src_fmt), src_fmt);
        if compact {
            dst.extend_from_slice(&[r, g, b]);
        } else {
            pack_pixel(dst, r, g, b, dst_fmt);
        }
    }
}

/// Translates one row of pixels from `src_fmt` into plain RGB24.
///
/// Used to hand rows to the JPEG compressor and the H.264 colour-space
/// conversion.
pub(crate) fn row_to_rgb(dst: &mut Vec<u8>, src: &[u8], src_fmt: &PixelFormat) {
    let src_bpp = src_fmt.bytes_per_pixel();
    for px in src.chunks_exact(src_bpp) {
        let (r, g, b) = extract_rgb(read_pixel(px, src_fmt), src_fmt);
        dst.extend_from_slice(&[r, g, b]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fourcc::Fourcc;

    #[test]
    fn test_extract_rgb_xrgb8888() {
        let fmt = Fourcc::XRGB8888.pixel_format().unwrap();
        // 0x00804020 stored little endian: B=0x20 G=0x40 R=0x80.
        let px = [0x20u8, 0x40, 0x80, 0x00];
        let (r, g, b) = extract_rgb(read_pixel(&px, &fmt), &fmt);
        assert_eq!((r, g, b), (0x80, 0x40, 0x20));
    }

    #[test]
    fn test_xrgb_to_rgb565() {
        let src_fmt = Fourcc::XRGB8888.pixel_format().unwrap();
        let dst_fmt = Fourcc::RGB565.pixel_format().unwrap();

        // Pure red.
        let src = [0x00u8, 0x00, 0xFF, 0x00];
        let mut dst = Vec::new();
        translate_row(&mut dst, &src, &src_fmt, &dst_fmt, false);
        assert_eq!(dst.len(), 2);
        assert_eq!(u16::from_le_bytes([dst[0], dst[1]]), 0xF800);
    }

    #[test]
    fn test_compact_row_is_rgb_bytes() {
        let src_fmt = Fourcc::XRGB8888.pixel_format().unwrap();
        let dst_fmt = Fourcc::XBGR8888.pixel_format().unwrap();

        let src = [0x30u8, 0x20, 0x10, 0x00, 0xFF, 0x00, 0x00, 0x00];
        let mut dst = Vec::new();
        translate_row(&mut dst, &src, &src_fmt, &dst_fmt, true);
        assert_eq!(&dst[..], &[0x10, 0x20, 0x30, 0x00, 0x00, 0xFF]);
    }

    #[test]
    fn test_identity_round_trip() {
        let fmt = Fourcc::XRGB8888.pixel_format().unwrap();
        let src = [0xAAu8, 0xBB, 0xCC, 0x00];
        let mut dst = Vec::new();
        translate_row(&mut dst, &src, &fmt, &fmt, false);
        assert_eq!(&dst[..], &src[..]);
    }

    #[test]
    fn test_scale_component() {
        assert_eq!(scale_component(0, 31), 0);
        assert_eq!(scale_component(31, 31), 255);
        assert_eq!(scale_component(128, 255), 128);
    }

    #[test]
    fn test_downscale_component() {
        assert_eq!(downscale_component(0, 31), 0);
        assert_eq!(downscale_component(255, 31), 31);
        assert_eq!(downscale_component(128, 255), 128);
    }

    #[test]
    fn test_row_to_rgb() {
        let fmt = Fourcc::XBGR8888.pixel_format().unwrap();
        // XBGR little endian: byte0=R byte1=G byte2=B.
        let src = [0x11u8, 0x22, 0x33, 0x00];
        let mut dst = Vec::new();
        row_to_rgb(&mut dst, &src, &fmt);
        assert_eq!(&dst[..], &[0x11, 0x22, 0x33]);
    }
}
