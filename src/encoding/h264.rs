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

//! Serial H.264 elementary-stream encoder over a frame queue.
//!
//! One dedicated blocking-pool thread owns the codec for its whole
//! lifetime - the OpenH264 handle never crosses threads. Frames are fed
//! through an unbounded channel while the producer's buffer is held, so
//! packet order always matches feed order and at most one encode is in
//! flight. Redundant-frame elision is the producer's job.
//!
//! Failed frames are dropped with a debug log; the stream continues with
//! the next feed. `request_keyframe` sets a latch consumed by the next
//! frame that enters encoding, queued or not.

use crate::error::{PipelineError, Result};
use crate::fourcc::Fourcc;
use crate::framebuffer::Framebuffer;
use crate::protocol::PixelFormat;
use crate::translate;
use log::{debug, error};
use openh264::encoder::{Encoder, EncoderConfig};
use openh264::formats::YUVBuffer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Closure receiving each encoded packet, in feed order.
pub type PacketHandler = Box<dyn Fn(&[u8]) + Send + Sync>;

/// Handle to the encoder worker. Dropping it stops the worker once the
/// queue drains.
pub struct H264Encoder {
    tx: mpsc::UnboundedSender<Arc<Framebuffer>>,
    keyframe: Arc<AtomicBool>, // Atomic - latch set by callers, swapped by the worker
}

impl H264Encoder {
    /// Spawns the encoder worker targeting `width` x `height` frames in
    /// `format`. Must be called from a tokio runtime context.
    ///
    /// Codec construction happens on the worker thread; if it fails, the
    /// failure is logged and every queued frame is released unencoded.
    ///
    /// # Errors
    ///
    /// Zero dimensions or an unregistered format.
    pub fn new(
        width: u32,
        height: u32,
        format: Fourcc,
        on_packet: PacketHandler,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidDimensions { width, height });
        }
        let src_fmt = format.pixel_format()?;

        let (tx, mut rx) = mpsc::unbounded_channel::<Arc<Framebuffer>>();
        let keyframe = Arc::new(AtomicBool::new(false));
        let latch = Arc::clone(&keyframe);
        let handle = tokio::runtime::Handle::current();

        tokio::task::spawn_blocking(move || {
            // 4:2:0 needs even dimensions.
            let (enc_w, enc_h) = (width & !1, height & !1);
            let mut encoder = match Encoder::with_config(EncoderConfig::new(enc_w, enc_h)) {
                Ok(encoder) => encoder,
                Err(e) => {
                    error!("h264: encoder init failed: {e}");
                    while let Some(fb) = handle.block_on(rx.recv()) {
                        fb.release();
                    }
                    return;
                }
            };

            while let Some(fb) = handle.block_on(rx.recv()) {
                let force_keyframe = latch.swap(false, Ordering::AcqRel);
                match encode_one(&mut encoder, &fb, &src_fmt, enc_w, enc_h, force_keyframe) {
                    Ok(packet) if !packet.is_empty() => on_packet(&packet),
                    Ok(_) => debug!("h264: encoder produced no output for frame"),
                    Err(e) => debug!("h264: dropping frame: {e}"),
                }
                fb.release();
            }
        });

        Ok(Self { tx, keyframe })
    }

    /// Enqueues a frame for encoding, holding it until the worker is done
    /// with its pixels.
    ///
    /// # Errors
    ///
    /// The worker is gone (codec init failed and the queue drained, or the
    /// runtime is shutting down).
    pub fn feed(&self, fb: Arc<Framebuffer>) -> Result<()> {
        fb.hold();
        self.tx.send(fb).map_err(|send_error| {
            send_error.0.release();
            PipelineError::Codec("encoder worker is gone".into())
        })
    }

    /// Requests that the next frame entering encoding be a keyframe. The
    /// latch clears once consumed.
    pub fn request_keyframe(&self) {
        self.keyframe.store(true, Ordering::Release);
    }
}

fn encode_one(
    encoder: &mut Encoder,
    fb: &Framebuffer,
    src_fmt: &PixelFormat,
    width: u32,
    height: u32,
    keyframe: bool,
) -> Result<Vec<u8>> {
    let data = fb.map()?;
    if fb.width() < width || fb.height() < height {
        return Err(PipelineError::Codec(format!(
            "framebuffer {}x{} smaller than encoder target {width}x{height}",
            fb.width(),
            fb.height()
        )));
    }

    let stride = fb.stride_bytes();
    let row_bytes = width as usize * src_fmt.bytes_per_pixel();
    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height {
        let offset = y as usize * stride;
        translate::row_to_rgb(&mut rgb, &data[offset..offset + row_bytes], src_fmt);
    }

    let yuv = YUVBuffer::with_rgb(width as usize, height as usize, &rgb);
    if keyframe {
        encoder.force_intra_frame(true);
    }
    let bitstream = encoder
        .encode(&yuv)
        .map_err(|e| PipelineError::Codec(e.to_string()))?;
    Ok(bitstream.to_vec())
}
