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

//! The display aggregator: one capture source's path into the encoders.
//!
//! A display owns a damage refinery, a resampler, and an Open H.264 framer,
//! and keeps the latest normalised frame as its "current buffer" for the
//! Tight path. [`Display::feed_buffer`] is the producer's single entry
//! point; completion of the pipeline surfaces as a `damage_region`
//! notification on the session sink. The sink is held weakly - the session
//! owns its displays, never the other way around.

use crate::damage::DamageRefinery;
use crate::encoding::open_h264::OpenH264Framer;
use crate::error::Result;
use crate::events::UpdateSink;
use crate::fourcc::Fourcc;
use crate::framebuffer::Framebuffer;
use crate::region::Region;
use crate::resample::Resampler;
use crate::transform::transform_region;
use bytes::BytesMut;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

type ServerRef = Arc<Mutex<Option<Weak<dyn UpdateSink>>>>;

struct DisplayState {
    refinery: DamageRefinery,
    current: Option<Arc<Framebuffer>>,
}

/// One logical display fed by an external capture source.
pub struct Display {
    position: (u32, u32),
    resampler: Resampler,
    state: Arc<Mutex<DisplayState>>,
    framer: Mutex<OpenH264Framer>,
    server: ServerRef,
    h264_supported: AtomicBool, // Atomic - written per feed, read by the session layer
}

impl Display {
    /// Creates a display at `(x, y)` in the composed output space.
    ///
    /// The position is carried for multi-display composition; the pipeline
    /// itself is position-agnostic. Must be called from a tokio runtime
    /// context.
    #[must_use]
    pub fn new(x: u32, y: u32) -> Arc<Self> {
        let server: ServerRef = Arc::new(Mutex::new(None));
        let notify = Arc::clone(&server);
        let framer = OpenH264Framer::new(0, 0, Fourcc::XRGB8888, move || {
            if let Some(sink) = notify.lock().unwrap().as_ref().and_then(Weak::upgrade) {
                sink.process_update_requests();
            }
        });
        Arc::new(Self {
            position: (x, y),
            resampler: Resampler::new(),
            state: Arc::new(Mutex::new(DisplayState {
                refinery: DamageRefinery::new(),
                current: None,
            })),
            framer: Mutex::new(framer),
            server,
            h264_supported: AtomicBool::new(false),
        })
    }

    /// Attaches the session sink receiving this display's notifications.
    pub fn set_server(&self, sink: &Arc<dyn UpdateSink>) {
        *self.server.lock().unwrap() = Some(Arc::downgrade(sink));
    }

    /// The attached session sink, if it is still alive.
    #[must_use]
    pub fn get_server(&self) -> Option<Arc<dyn UpdateSink>> {
        self.server.lock().unwrap().as_ref().and_then(Weak::upgrade)
    }

    /// Position of this display in the composed output space.
    #[must_use]
    pub fn position(&self) -> (u32, u32) {
        self.position
    }

    /// Whether the last fed buffer was eligible for the H.264 path.
    #[must_use]
    pub fn h264_supported(&self) -> bool {
        self.h264_supported.load(Ordering::Acquire)
    }

    /// The latest normalised frame, held by the display for the Tight path.
    #[must_use]
    pub fn buffer(&self) -> Option<Arc<Framebuffer>> {
        self.state.lock().unwrap().current.clone()
    }

    /// Feeds one captured frame and its damage hint into the pipeline.
    ///
    /// GPU buffers with identity transform go to the H.264 framer (when the
    /// codec is built in). The hint is then refined against the previous
    /// frame, mapped through the buffer's transform, and handed to the
    /// resampler; once the normalised frame is ready it becomes the current
    /// buffer and the session sink is notified with the refined damage.
    ///
    /// Two concurrent calls on one display are a contract violation; the
    /// caller serialises feeds.
    ///
    /// # Errors
    ///
    /// Unknown pixel formats, or a buffer that is neither H.264-eligible
    /// nor CPU-mappable. A GPU-only frame that took the H.264 path reports
    /// success even though the CPU path was skipped.
    pub fn feed_buffer(&self, fb: Arc<Framebuffer>, damage: &Region) -> Result<()> {
        let eligible =
            cfg!(feature = "open-h264") && fb.is_gpu() && fb.transform().is_identity();
        self.h264_supported.store(eligible, Ordering::Release);
        if eligible {
            if let Err(e) = self.framer.lock().unwrap().feed_frame(&fb) {
                warn!("display: H.264 feed failed: {e}");
            }
        }

        if let Err(e) = fb.map() {
            if eligible {
                // Unmappable GPU frame: the video path has it; nothing for
                // the refinery or Tight to read.
                debug!("display: GPU frame without CPU mapping, skipping refinement");
                return Ok(());
            }
            return Err(e);
        }

        let transformed = {
            let mut state = self.state.lock().unwrap();
            state.refinery.resize(fb.width(), fb.height());
            let refined = state.refinery.refine(damage, &fb)?;
            transform_region(&refined, fb.transform(), fb.width(), fb.height())
        };

        let state = Arc::clone(&self.state);
        let server = Arc::clone(&self.server);
        self.resampler.feed(fb, transformed, move |out_fb, region| {
            out_fb.hold();
            let previous = state.lock().unwrap().current.replace(out_fb);
            if let Some(previous) = previous {
                previous.release();
            }
            if let Some(sink) = server.lock().unwrap().as_ref().and_then(Weak::upgrade) {
                sink.damage_region(&region);
            }
        })
    }

    /// Drains pending H.264 packets into `out` as one Open H.264
    /// rectangle; see [`OpenH264Framer::read`]. Returns `false` when there
    /// is nothing to send.
    pub fn read_h264(&self, out: &mut BytesMut) -> bool {
        self.framer.lock().unwrap().read(out)
    }

    /// Asks the H.264 encoder for a keyframe on its next frame.
    pub fn request_h264_keyframe(&self) {
        self.framer.lock().unwrap().request_keyframe();
    }
}

impl Drop for Display {
    fn drop(&mut self) {
        // The display's hold on the current buffer ends with it.
        if let Some(current) = self.state.lock().unwrap().current.take() {
            current.release();
        }
    }
}
