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

//! Orientation normalisation for incoming framebuffers.
//!
//! Encoders only ever see identity-transform buffers. The resampler takes a
//! possibly rotated/flipped frame, copies it into a pool-owned upright
//! buffer on the blocking pool, and delivers the result through a
//! completion closure. Identity inputs pass through by reference without a
//! copy. The closure always runs from a runtime task — never before `feed`
//! returns — and the callee takes whatever refs and holds it needs.

use crate::error::Result;
use crate::fb_pool::FbPool;
use crate::fourcc::Fourcc;
use crate::framebuffer::Framebuffer;
use crate::region::Region;
use log::warn;
use std::sync::Arc;

// Same swapchain depth per geometry as the encoders downstream expect.
const POOL_DEPTH: usize = 3;

/// Normalises buffer orientation ahead of encoding.
pub struct Resampler {
    pool: Arc<FbPool>,
}

impl Resampler {
    /// Creates a resampler with an empty output pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pool: FbPool::new(Fourcc::XRGB8888, 0, 0, POOL_DEPTH),
        }
    }

    /// Feeds one frame. `done(out_fb, damage)` is invoked from a runtime
    /// task once the normalised buffer is ready; for identity inputs
    /// `out_fb` is the input buffer itself. The input is held for the
    /// duration of the copy.
    ///
    /// # Errors
    ///
    /// Unregistered pixel formats fail synchronously and the frame is
    /// dropped. Copy failures after scheduling are logged and dropped.
    pub fn feed<F>(&self, fb: Arc<Framebuffer>, damage: Region, done: F) -> Result<()>
    where
        F: FnOnce(Arc<Framebuffer>, Region) + Send + 'static,
    {
        if fb.transform().is_identity() {
            tokio::spawn(async move {
                done(fb, damage);
            });
            return Ok(());
        }

        let (out_w, out_h) = fb.transform().output_size(fb.width(), fb.height());
        self.pool.resize(fb.format(), out_w, out_h);

        fb.hold();
        let pool = Arc::clone(&self.pool);
        tokio::spawn(async move {
            let src = Arc::clone(&fb);
            let copied =
                tokio::task::spawn_blocking(move || copy_transformed(&src, &pool)).await;
            fb.release();
            match copied {
                Ok(Ok(out)) => done(out, damage),
                Ok(Err(e)) => warn!("resampler: dropping frame: {e}"),
                Err(e) => warn!("resampler: copy worker failed: {e}"),
            }
        });
        Ok(())
    }
}

impl Default for Resampler {
    fn default() -> Self {
        Self::new()
    }
}

fn copy_transformed(src: &Framebuffer, pool: &Arc<FbPool>) -> Result<Arc<Framebuffer>> {
    let data = src.map()?;
    let bpp = src.format().bytes_per_pixel()?;
    let transform = src.transform();
    let (width, height) = (src.width(), src.height());
    let (out_w, _) = transform.output_size(width, height);

    let src_stride = src.stride_bytes();
    let dst_stride = out_w as usize * bpp;
    let mut out = pool.take_storage()?;

    for y in 0..height {
        let row = y as usize * src_stride;
        for x in 0..width {
            let (ox, oy) = transform.apply_point(x, y, width, height);
            let s = row + x as usize * bpp;
            let d = oy as usize * dst_stride + ox as usize * bpp;
            out[d..d + bpp].copy_from_slice(&data[s..s + bpp]);
        }
    }

    pool.adopt_storage(out)
}
