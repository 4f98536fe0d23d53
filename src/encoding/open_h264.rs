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

//! Open H.264 rectangle framing.
//!
//! The framer sits between the raw H.264 encoder and the session layer:
//! encoder packets accumulate in a pending vector, and `read` drains them
//! into one RFB rectangle - count, head, then an 8-byte
//! `{u32 length, u32 flags}` header and the elementary-stream bytes. Flag
//! bit 0 tells the client to reset its decoder; it is latched whenever the
//! underlying encoder is rebuilt (geometry or format change) and cleared
//! after one emission.

use bytes::{BufMut, BytesMut};
use crate::error::Result;
use crate::fourcc::Fourcc;
use crate::framebuffer::Framebuffer;
use crate::protocol::{Rectangle, ENCODING_OPEN_H264, OPEN_H264_FLAG_RESET_CONTEXT};
use std::sync::{Arc, Mutex};

#[cfg(feature = "open-h264")]
use crate::encoding::h264::H264Encoder;
#[cfg(feature = "open-h264")]
use log::debug;
#[cfg(not(feature = "open-h264"))]
use crate::error::PipelineError;

struct FramerState {
    pending: BytesMut,
    needs_reset: bool,
}

struct FramerShared {
    state: Mutex<FramerState>,
    on_ready: Box<dyn Fn() + Send + Sync>,
}

impl FramerShared {
    fn handle_packet(&self, packet: &[u8]) {
        self.state.lock().unwrap().pending.extend_from_slice(packet);
        (self.on_ready)();
    }
}

/// Wraps H.264 encoder output as Open H.264 rectangles.
pub struct OpenH264Framer {
    width: u32,
    height: u32,
    format: Fourcc,
    shared: Arc<FramerShared>,
    #[cfg(feature = "open-h264")]
    encoder: Option<H264Encoder>,
}

impl OpenH264Framer {
    /// Creates a framer. `on_ready` fires every time a packet lands in the
    /// pending buffer - the signal that the display has new content to
    /// offer clients.
    ///
    /// The encoder itself is built on the first fed frame (and rebuilt on
    /// geometry change), so the initial dimensions may be zero.
    pub fn new<F>(width: u32, height: u32, format: Fourcc, on_ready: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            width,
            height,
            format,
            shared: Arc::new(FramerShared {
                state: Mutex::new(FramerState {
                    pending: BytesMut::new(),
                    needs_reset: false,
                }),
                on_ready: Box::new(on_ready),
            }),
            #[cfg(feature = "open-h264")]
            encoder: None,
        }
    }

    /// The geometry the framer is currently configured for.
    #[must_use]
    pub fn geometry(&self) -> (u32, u32, Fourcc) {
        (self.width, self.height, self.format)
    }

    /// Feeds one frame to the underlying encoder, rebuilding it first when
    /// the frame's geometry or format differs from the framer's. A rebuild
    /// latches the reset-context flag for the next emitted rectangle.
    ///
    /// # Errors
    ///
    /// [`PipelineError::H264Unavailable`] without the `open-h264` feature;
    /// otherwise encoder construction or feed failures.
    pub fn feed_frame(&mut self, fb: &Arc<Framebuffer>) -> Result<()> {
        #[cfg(feature = "open-h264")]
        {
            let geometry = (fb.width(), fb.height(), fb.format());
            if self.encoder.is_none() || geometry != self.geometry() {
                (self.width, self.height, self.format) = geometry;
                let shared = Arc::clone(&self.shared);
                let encoder = H264Encoder::new(
                    self.width,
                    self.height,
                    self.format,
                    Box::new(move |packet: &[u8]| shared.handle_packet(packet)),
                )?;
                self.encoder = Some(encoder);
                self.shared.state.lock().unwrap().needs_reset = true;
                debug!(
                    "open-h264: encoder configured for {}x{} {}",
                    self.width, self.height, self.format
                );
            }
            self.encoder
                .as_ref()
                .expect("encoder just configured")
                .feed(Arc::clone(fb))
        }
        #[cfg(not(feature = "open-h264"))]
        {
            let _ = fb;
            Err(PipelineError::H264Unavailable)
        }
    }

    /// Drains pending packets into `out` as one Open H.264 rectangle.
    ///
    /// Returns `false` (leaving `out` alone) when nothing is pending.
    /// Otherwise `out` is replaced with: rectangle count 1, a rectangle
    /// head for `(0, 0, width, height)` with encoding 50, the big-endian
    /// `{u32 length, u32 flags}` header, and the payload. The reset flag is
    /// emitted at most once per encoder rebuild.
    pub fn read(&mut self, out: &mut BytesMut) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        if state.pending.is_empty() {
            return false;
        }

        out.clear();
        out.put_u16(1);
        Rectangle {
            x: 0,
            y: 0,
            width: self.width as u16,
            height: self.height as u16,
            encoding: ENCODING_OPEN_H264,
        }
        .write_header(out);
        out.put_u32(state.pending.len() as u32);
        let flags = if state.needs_reset {
            OPEN_H264_FLAG_RESET_CONTEXT
        } else {
            0
        };
        out.put_u32(flags);
        out.extend_from_slice(&state.pending);

        state.pending.clear();
        state.needs_reset = false;
        true
    }

    /// Requests a keyframe from the underlying encoder, if one exists.
    pub fn request_keyframe(&self) {
        #[cfg(feature = "open-h264")]
        if let Some(encoder) = &self.encoder {
            encoder.request_keyframe();
        }
    }

    #[cfg(test)]
    pub(crate) fn test_push_packet(&self, packet: &[u8]) {
        self.shared.handle_packet(packet);
    }

    #[cfg(test)]
    pub(crate) fn test_reconfigure(&mut self, width: u32, height: u32, format: Fourcc) {
        (self.width, self.height, self.format) = (width, height, format);
        self.shared.state.lock().unwrap().needs_reset = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn framer(width: u32, height: u32) -> (OpenH264Framer, Arc<AtomicUsize>) {
        let ready = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ready);
        let framer = OpenH264Framer::new(width, height, Fourcc::XRGB8888, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (framer, ready)
    }

    fn parse_head(out: &[u8], payload: &[u8], flags: u32, width: u16, height: u16) {
        assert_eq!(&out[0..2], &[0, 1]); // one rectangle
        assert_eq!(u16::from_be_bytes([out[2], out[3]]), 0);
        assert_eq!(u16::from_be_bytes([out[4], out[5]]), 0);
        assert_eq!(u16::from_be_bytes([out[6], out[7]]), width);
        assert_eq!(u16::from_be_bytes([out[8], out[9]]), height);
        assert_eq!(
            i32::from_be_bytes(out[10..14].try_into().unwrap()),
            ENCODING_OPEN_H264
        );
        assert_eq!(
            u32::from_be_bytes(out[14..18].try_into().unwrap()),
            payload.len() as u32
        );
        assert_eq!(u32::from_be_bytes(out[18..22].try_into().unwrap()), flags);
        assert_eq!(&out[22..], payload);
    }

    #[test]
    fn test_read_with_nothing_pending() {
        let (mut framer, _) = framer(640, 480);
        let mut out = BytesMut::new();
        assert!(!framer.read(&mut out));
        assert!(out.is_empty());
    }

    #[test]
    fn test_framing_layout_and_reset_latch() {
        let (mut framer, ready) = framer(640, 480);
        framer.test_reconfigure(640, 480, Fourcc::XRGB8888);

        framer.test_push_packet(&[1, 2, 3, 4]);
        assert_eq!(ready.load(Ordering::SeqCst), 1);

        let mut out = BytesMut::new();
        assert!(framer.read(&mut out));
        parse_head(&out, &[1, 2, 3, 4], OPEN_H264_FLAG_RESET_CONTEXT, 640, 480);

        // Nothing pending: read reports no data and leaves `out` alone.
        let before = out.len();
        assert!(!framer.read(&mut out));
        assert_eq!(out.len(), before);

        // The reset flag was consumed with the first rectangle.
        framer.test_push_packet(&[9, 9]);
        assert!(framer.read(&mut out));
        parse_head(&out, &[9, 9], 0, 640, 480);
    }

    #[test]
    fn test_packets_coalesce_between_reads() {
        let (mut framer, ready) = framer(16, 16);
        framer.test_push_packet(&[1, 2]);
        framer.test_push_packet(&[3]);
        assert_eq!(ready.load(Ordering::SeqCst), 2);

        let mut out = BytesMut::new();
        assert!(framer.read(&mut out));
        parse_head(&out, &[1, 2, 3], 0, 16, 16);
    }

    #[test]
    fn test_reconfigure_relatches_reset() {
        let (mut framer, _) = framer(640, 480);
        framer.test_reconfigure(640, 480, Fourcc::XRGB8888);
        framer.test_push_packet(&[1]);
        let mut out = BytesMut::new();
        framer.read(&mut out);
        parse_head(&out, &[1], OPEN_H264_FLAG_RESET_CONTEXT, 640, 480);

        framer.test_push_packet(&[2]);
        framer.read(&mut out);
        parse_head(&out, &[2], 0, 640, 480);

        // Geometry change: exactly one more reset-flagged rectangle.
        framer.test_reconfigure(800, 600, Fourcc::XRGB8888);
        framer.test_push_packet(&[3]);
        framer.read(&mut out);
        parse_head(&out, &[3], OPEN_H264_FLAG_RESET_CONTEXT, 800, 600);

        framer.test_push_packet(&[4]);
        framer.read(&mut out);
        parse_head(&out, &[4], 0, 800, 600);
    }
}
