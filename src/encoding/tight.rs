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

//! VNC Tight encoding - tile-sharded and worker-parallel.
//!
//! # Architecture
//!
//! The frame is cut into 64x64 tiles. Tiles overlapping the damage region
//! are encoded by four shards running on the blocking pool, then a single
//! finalisation pass serialises the results in row-major grid order.
//!
//! Shard `i` owns exactly the tiles whose grid column satisfies
//! `x mod 4 == i`, and exclusively owns zlib stream `i`. The assignment is
//! fixed so each stream's deflate dictionary sees a consistent succession
//! of tiles from frame to frame - that inter-frame continuity is where
//! Tight's compression ratio comes from. Because shards are column-disjoint
//! the tile outputs need no locking; the destination buffer is only written
//! after every shard has joined.
//!
//! # Wire format per tile
//!
//! 1. **Basic** (lossless) - control byte `0x00 | stream << 4`
//!    - `[control][compact length][deflate bytes]`
//!    - Pixels travel in the destination format's compact form; the stream
//!      is flushed with `Z_SYNC_FLUSH` at tile end so the tile is
//!      self-contained while the dictionary persists.
//!
//! 2. **JPEG** (quality high/low) - control byte `0x90`
//!    - `[0x90][compact length][JPEG data]`
//!    - Self-contained per tile, 4:2:2 subsampling, quality 66 or 33.
//!
//! Each tile is preceded by a standard RFB rectangle head with encoding 7.

use bytes::{BufMut, BytesMut};
use flate2::{Compress, Compression, FlushCompress};
use log::debug;
use std::sync::Arc;

use crate::error::{PipelineError, Result};
use crate::framebuffer::Framebuffer;
use crate::protocol::{
    self, PixelFormat, Rectangle, ENCODING_TIGHT, TIGHT_STREAM_COUNT,
};
use crate::region::{Rect, Region};
use crate::translate;

/// Tile edge length of the encoding grid, in pixels.
pub const TIGHT_TILE_SIZE: u32 = 64;

/// Fixed capacity of one tile's output buffer.
///
/// Twice the raw size of a full 32-bit tile; deflate worst-case expansion
/// and every sane JPEG fit with room to spare. Overflowing it in basic mode
/// desynchronises the wire stream, which is unrecoverable.
const TILE_BUFFER_CAPACITY: usize = 2 * 64 * 64 * 4;

// Deflate level for basic tiles. Dictionary continuity matters more than
// per-tile effort at realtime rates.
const TIGHT_ZLIB_LEVEL: u32 = 1;

#[cfg(feature = "turbojpeg")]
const JPEG_QUALITY_HIGH: u8 = 66;
#[cfg(feature = "turbojpeg")]
const JPEG_QUALITY_LOW: u8 = 33;

/// Requested fidelity for a Tight frame.
///
/// The lossy levels use JPEG tiles when the crate is built with the
/// `turbojpeg` feature and silently degrade to lossless otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TightQuality {
    /// Deflate-compressed exact pixels.
    Lossless,
    /// JPEG quality 66.
    High,
    /// JPEG quality 33.
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TileState {
    Ready,
    Damaged,
    Encoded,
}

struct TileJob {
    index: usize,
    rect: Rect,
}

struct TileOutput {
    index: usize,
    control: u8,
    payload: Vec<u8>,
}

/// The Tight frame encoder.
///
/// One encoder serves one client connection: the four zlib streams mirror
/// decompressor state on the client side and persist across frames (and
/// resizes). Frames must not overlap; the `&mut self` borrow on
/// [`encode_frame`](Self::encode_frame) enforces that statically, and the
/// tile-state machine asserts it dynamically.
pub struct TightEncoder {
    width: u32,
    height: u32,
    grid_width: u32,
    grid_height: u32,
    tiles: Vec<TileState>,
    streams: [Option<Compress>; TIGHT_STREAM_COUNT],
}

impl TightEncoder {
    /// Creates an encoder for a `width` x `height` framebuffer.
    ///
    /// # Errors
    ///
    /// Zero dimensions.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidDimensions { width, height });
        }
        let grid_width = width.div_ceil(TIGHT_TILE_SIZE);
        let grid_height = height.div_ceil(TIGHT_TILE_SIZE);
        Ok(Self {
            width,
            height,
            grid_width,
            grid_height,
            tiles: vec![TileState::Ready; (grid_width * grid_height) as usize],
            streams: std::array::from_fn(|_| {
                Some(Compress::new(Compression::new(TIGHT_ZLIB_LEVEL), true))
            }),
        })
    }

    /// Resizes the tile grid. A no-op when unchanged. The zlib streams
    /// persist - the client's decompressors survive a desktop resize.
    ///
    /// # Errors
    ///
    /// Zero dimensions.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidDimensions { width, height });
        }
        if (self.width, self.height) == (width, height) {
            return Ok(());
        }
        self.width = width;
        self.height = height;
        self.grid_width = width.div_ceil(TIGHT_TILE_SIZE);
        self.grid_height = height.div_ceil(TIGHT_TILE_SIZE);
        self.tiles = vec![TileState::Ready; (self.grid_width * self.grid_height) as usize];
        Ok(())
    }

    /// Encodes one frame's damaged tiles into a Tight update payload.
    ///
    /// Returns immediately-awaitable work: the damaged tiles are encoded by
    /// four shards on the blocking pool and the future resolves with the
    /// serialised buffer once the frame is complete. The buffer starts with
    /// the rectangle count as a big-endian u16, followed by one Tight
    /// rectangle per damaged tile in row-major grid order.
    ///
    /// # Errors
    ///
    /// Reported before any work is scheduled: an invalid destination
    /// format, a framebuffer that does not match the encoder geometry, or
    /// an unmappable framebuffer. In all cases the frame is dropped and the
    /// encoder stays usable.
    ///
    /// # Panics
    ///
    /// Called while a previous frame has not drained, or on a tile-buffer
    /// overflow in basic mode - the wire stream cannot recover from either.
    pub async fn encode_frame(
        &mut self,
        dst_fmt: &PixelFormat,
        fb: &Arc<Framebuffer>,
        src_fmt: &PixelFormat,
        damage: &Region,
        quality: TightQuality,
    ) -> Result<BytesMut> {
        if !dst_fmt.is_valid() || !src_fmt.is_valid() {
            return Err(PipelineError::Encoding("invalid pixel format".into()));
        }
        if (fb.width(), fb.height()) != (self.width, self.height) {
            return Err(PipelineError::InvalidOperation(format!(
                "framebuffer is {}x{}, encoder is {}x{}",
                fb.width(),
                fb.height(),
                self.width,
                self.height
            )));
        }
        assert!(
            self.tiles.iter().all(|t| *t == TileState::Ready),
            "tight: encode_frame called before the previous frame drained"
        );
        // Fail before scheduling anything if the pixels are unreadable.
        fb.map()?;

        #[cfg(not(feature = "turbojpeg"))]
        let quality = {
            if quality != TightQuality::Lossless {
                debug!("tight: JPEG support not built, forcing lossless");
            }
            TightQuality::Lossless
        };

        // Damage application.
        let mut n_rects = 0usize;
        for index in 0..self.tiles.len() {
            if damage.intersects_rect(&self.tile_rect(index)) {
                self.tiles[index] = TileState::Damaged;
                n_rects += 1;
            }
        }

        let mut dst = BytesMut::with_capacity(2 + n_rects * 64);
        dst.put_u16(n_rects as u16);
        if n_rects == 0 {
            return Ok(dst);
        }

        // Shard scheduling: stream i takes grid columns with x mod 4 == i,
        // row-major within the subset.
        let mut handles = Vec::with_capacity(TIGHT_STREAM_COUNT);
        for stream_idx in 0..TIGHT_STREAM_COUNT {
            let mut jobs = Vec::new();
            for ty in 0..self.grid_height {
                for tx in (stream_idx as u32..self.grid_width).step_by(TIGHT_STREAM_COUNT) {
                    let index = (ty * self.grid_width + tx) as usize;
                    if self.tiles[index] == TileState::Damaged {
                        jobs.push(TileJob { index, rect: self.tile_rect(index) });
                    }
                }
            }
            if jobs.is_empty() {
                continue;
            }
            let stream = self.streams[stream_idx]
                .take()
                .expect("tight: zlib stream already checked out");
            let fb = Arc::clone(fb);
            let src_fmt = src_fmt.clone();
            let dst_fmt = dst_fmt.clone();
            handles.push((
                stream_idx,
                tokio::task::spawn_blocking(move || {
                    encode_shard(&fb, &src_fmt, &dst_fmt, quality, &jobs, stream, stream_idx)
                }),
            ));
        }

        // Join all shards, then serialise - the single-writer finish step.
        let mut outputs: Vec<Option<TileOutput>> = Vec::new();
        outputs.resize_with(self.tiles.len(), || None);
        for (stream_idx, handle) in handles {
            let (stream, shard_outputs) =
                handle.await.expect("tight: encode worker panicked");
            self.streams[stream_idx] = Some(stream);
            for output in shard_outputs {
                let index = output.index;
                self.tiles[index] = TileState::Encoded;
                outputs[index] = Some(output);
            }
        }

        for index in 0..self.tiles.len() {
            let Some(output) = outputs[index].take() else {
                continue;
            };
            let rect = self.tile_rect(index);
            Rectangle {
                x: rect.x as u16,
                y: rect.y as u16,
                width: rect.width as u16,
                height: rect.height as u16,
                encoding: ENCODING_TIGHT,
            }
            .write_header(&mut dst);
            dst.put_u8(output.control);
            protocol::put_compact_length(&mut dst, output.payload.len());
            dst.extend_from_slice(&output.payload);
            self.tiles[index] = TileState::Ready;
        }

        debug!(
            "tight: {n_rects} rect(s), {} bytes, quality {quality:?}",
            dst.len()
        );
        Ok(dst)
    }

    fn tile_rect(&self, index: usize) -> Rect {
        let tx = index as u32 % self.grid_width;
        let ty = index as u32 / self.grid_width;
        Rect::new(
            tx * TIGHT_TILE_SIZE,
            ty * TIGHT_TILE_SIZE,
            TIGHT_TILE_SIZE.min(self.width - tx * TIGHT_TILE_SIZE),
            TIGHT_TILE_SIZE.min(self.height - ty * TIGHT_TILE_SIZE),
        )
    }
}

fn encode_shard(
    fb: &Framebuffer,
    src_fmt: &PixelFormat,
    dst_fmt: &PixelFormat,
    quality: TightQuality,
    jobs: &[TileJob],
    mut stream: Compress,
    stream_idx: usize,
) -> (Compress, Vec<TileOutput>) {
    let data = fb.map().expect("mapping verified before scheduling");
    let stride = fb.stride_bytes();

    #[cfg(feature = "turbojpeg")]
    let mut jpeg = if quality == TightQuality::Lossless {
        None
    } else {
        match crate::jpeg::JpegCompressor::new() {
            Ok(compressor) => Some(compressor),
            Err(e) => {
                log::warn!("tight: TurboJPEG init failed ({e}), tiles fall back to basic mode");
                None
            }
        }
    };

    let mut outputs = Vec::with_capacity(jobs.len());
    for job in jobs {
        let (control, payload) = match quality {
            TightQuality::Lossless => {
                encode_tile_basic(data, stride, src_fmt, dst_fmt, &job.rect, &mut stream, stream_idx)
            }
            #[cfg(feature = "turbojpeg")]
            TightQuality::High | TightQuality::Low => {
                let jpeg_quality = if quality == TightQuality::High {
                    JPEG_QUALITY_HIGH
                } else {
                    JPEG_QUALITY_LOW
                };
                let result = jpeg
                    .as_mut()
                    .ok_or_else(|| PipelineError::Encoding("JPEG compressor unavailable".into()))
                    .and_then(|j| encode_tile_jpeg(j, data, stride, src_fmt, &job.rect, jpeg_quality));
                match result {
                    Ok(encoded) => encoded,
                    Err(e) => {
                        log::warn!("tight: JPEG tile failed ({e}), falling back to basic");
                        encode_tile_basic(
                            data, stride, src_fmt, dst_fmt, &job.rect, &mut stream, stream_idx,
                        )
                    }
                }
            }
            #[cfg(not(feature = "turbojpeg"))]
            TightQuality::High | TightQuality::Low => {
                unreachable!("lossy quality forced to lossless without JPEG support")
            }
        };
        outputs.push(TileOutput { index: job.index, control, payload });
    }

    (stream, outputs)
}

fn encode_tile_basic(
    data: &[u8],
    stride: usize,
    src_fmt: &PixelFormat,
    dst_fmt: &PixelFormat,
    rect: &Rect,
    stream: &mut Compress,
    stream_idx: usize,
) -> (u8, Vec<u8>) {
    let src_bpp = src_fmt.bytes_per_pixel();
    let row_bytes = rect.width as usize * src_bpp;
    let mut rows =
        Vec::with_capacity(rect.width as usize * rect.height as usize * dst_fmt.compact_bytes_per_pixel());
    for y in rect.y..rect.bottom() {
        let offset = y as usize * stride + rect.x as usize * src_bpp;
        translate::translate_row(&mut rows, &data[offset..offset + row_bytes], src_fmt, dst_fmt, true);
    }
    (protocol::tight_basic_control(stream_idx), deflate_tile(stream, &rows))
}

/// Runs one tile's pixel rows through the shard's persistent stream with a
/// sync flush, so the compressed bytes are self-contained but the
/// dictionary carries over to the next tile on the same stream.
fn deflate_tile(stream: &mut Compress, input: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; TILE_BUFFER_CAPACITY];
    let before_in = stream.total_in();
    let before_out = stream.total_out();
    stream
        .compress(input, &mut out, FlushCompress::Sync)
        .expect("tight: zlib stream error");
    let consumed = (stream.total_in() - before_in) as usize;
    let written = (stream.total_out() - before_out) as usize;
    assert!(
        consumed == input.len(),
        "tight: tile output buffer overflow ({written} of {TILE_BUFFER_CAPACITY} bytes used, \
         {consumed}/{} consumed)",
        input.len()
    );
    out.truncate(written);
    out
}

#[cfg(feature = "turbojpeg")]
fn encode_tile_jpeg(
    jpeg: &mut crate::jpeg::JpegCompressor,
    data: &[u8],
    stride: usize,
    src_fmt: &PixelFormat,
    rect: &Rect,
    quality: u8,
) -> Result<(u8, Vec<u8>)> {
    let src_bpp = src_fmt.bytes_per_pixel();
    let row_bytes = rect.width as usize * src_bpp;
    let mut rgb = Vec::with_capacity(rect.width as usize * rect.height as usize * 3);
    for y in rect.y..rect.bottom() {
        let offset = y as usize * stride + rect.x as usize * src_bpp;
        translate::row_to_rgb(&mut rgb, &data[offset..offset + row_bytes], src_fmt);
    }
    let mut payload = Vec::with_capacity(TILE_BUFFER_CAPACITY);
    jpeg.compress_rgb_into(&rgb, rect.width, rect.height, quality, &mut payload)?;
    Ok((protocol::TIGHT_JPEG, payload))
}
