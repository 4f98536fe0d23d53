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

//! Damage refinement: turning a caller's damage hint into the rectangles
//! that actually changed.
//!
//! Capture sources over-report damage (many report the full frame every
//! time). The refinery keeps a per-tile content digest of the previous
//! frame and drops hinted tiles whose pixels did not change, so the
//! encoders only ever see real changes. The refined region never exceeds
//! the hint.

use crate::error::Result;
use crate::framebuffer::Framebuffer;
use crate::region::{Rect, Region};
use xxhash_rust::xxh64::Xxh64;

/// Tile edge length of the refinement grid, in pixels.
pub const DAMAGE_TILE_SIZE: u32 = 32;

/// Per-tile hash state tracking the previously refined frame.
#[derive(Debug, Default)]
pub struct DamageRefinery {
    width: u32,
    height: u32,
    grid_width: u32,
    grid_height: u32,
    hashes: Vec<Option<u64>>,
}

impl DamageRefinery {
    /// Creates an unsized refinery; call [`resize`](Self::resize) before
    /// refining.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sizes the grid to `width` x `height`. A no-op when the dimensions
    /// are unchanged; otherwise every stored hash is forgotten.
    pub fn resize(&mut self, width: u32, height: u32) {
        if (self.width, self.height) == (width, height) {
            return;
        }
        self.width = width;
        self.height = height;
        self.grid_width = width.div_ceil(DAMAGE_TILE_SIZE);
        self.grid_height = height.div_ceil(DAMAGE_TILE_SIZE);
        self.hashes = vec![None; (self.grid_width * self.grid_height) as usize];
    }

    /// Refines `hint` against the previous frame using `fb`'s pixels.
    ///
    /// Every tile intersecting the hint is re-hashed; tiles whose digest
    /// changed (or was never stored) contribute their bounding rectangle to
    /// the result and update the stored digest. Tiles outside the hint are
    /// untouched. Partial tiles at the right/bottom edges digest only their
    /// actual pixels.
    ///
    /// # Errors
    ///
    /// Propagates an unmappable framebuffer.
    ///
    /// # Panics
    ///
    /// The refinery must be sized to the framebuffer first.
    pub fn refine(&mut self, hint: &Region, fb: &Framebuffer) -> Result<Region> {
        assert_eq!(
            (fb.width(), fb.height()),
            (self.width, self.height),
            "damage refinery not sized to the framebuffer"
        );

        let mut out = Region::new();
        if hint.is_empty() {
            return Ok(out);
        }

        let data = fb.map()?;
        let bpp = fb.format().bytes_per_pixel()?;
        let stride = fb.stride_bytes();

        for ty in 0..self.grid_height {
            for tx in 0..self.grid_width {
                let tile = Rect::new(
                    tx * DAMAGE_TILE_SIZE,
                    ty * DAMAGE_TILE_SIZE,
                    DAMAGE_TILE_SIZE.min(self.width - tx * DAMAGE_TILE_SIZE),
                    DAMAGE_TILE_SIZE.min(self.height - ty * DAMAGE_TILE_SIZE),
                );
                if !hint.intersects_rect(&tile) {
                    continue;
                }
                let digest = hash_tile(data, stride, bpp, &tile);
                let slot = &mut self.hashes[(ty * self.grid_width + tx) as usize];
                if *slot != Some(digest) {
                    *slot = Some(digest);
                    out.add_rect(tile);
                }
            }
        }

        Ok(out)
    }
}

fn hash_tile(data: &[u8], stride: usize, bpp: usize, tile: &Rect) -> u64 {
    let mut hasher = Xxh64::new(0);
    let row_bytes = tile.width as usize * bpp;
    let mut offset = tile.y as usize * stride + tile.x as usize * bpp;
    for _ in 0..tile.height {
        hasher.update(&data[offset..offset + row_bytes]);
        offset += stride;
    }
    hasher.digest()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fourcc::Fourcc;
    use crate::transform::Transform;
    use std::sync::Arc;

    fn fb_with(width: u32, height: u32, pixels: Vec<u8>) -> Arc<Framebuffer> {
        Framebuffer::from_memory(width, height, Fourcc::XRGB8888, Transform::Normal, pixels)
            .unwrap()
    }

    #[test]
    fn test_first_refinement_keeps_full_hint() {
        let mut refinery = DamageRefinery::new();
        refinery.resize(64, 64);
        let fb = fb_with(64, 64, vec![0u8; 64 * 64 * 4]);
        let out = refinery.refine(&Region::full(64, 64), &fb).unwrap();
        // 2x2 tile grid, all without prior hashes.
        assert_eq!(out.rects().len(), 4);
    }

    #[test]
    fn test_identical_frame_refines_to_empty() {
        let mut refinery = DamageRefinery::new();
        refinery.resize(64, 64);
        let fb = fb_with(64, 64, vec![0u8; 64 * 64 * 4]);
        refinery.refine(&Region::full(64, 64), &fb).unwrap();
        let again = refinery.refine(&Region::full(64, 64), &fb).unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn test_changed_pixel_is_caught() {
        let mut refinery = DamageRefinery::new();
        refinery.resize(64, 64);
        let fb = fb_with(64, 64, vec![0u8; 64 * 64 * 4]);
        refinery.refine(&Region::full(64, 64), &fb).unwrap();

        // Flip one pixel at (40, 10): tile column 1, row 0.
        let mut pixels = vec![0u8; 64 * 64 * 4];
        pixels[(10 * 64 + 40) * 4] = 0xFF;
        let fb2 = fb_with(64, 64, pixels);
        let out = refinery.refine(&Region::full(64, 64), &fb2).unwrap();
        assert_eq!(out.rects(), &[Rect::new(32, 0, 32, 32)]);
    }

    #[test]
    fn test_tiles_outside_hint_untouched() {
        let mut refinery = DamageRefinery::new();
        refinery.resize(64, 64);
        let fb = fb_with(64, 64, vec![0u8; 64 * 64 * 4]);

        // Hint only the left column of tiles.
        let hint = Region::from(Rect::new(0, 0, 32, 64));
        let out = refinery.refine(&hint, &fb).unwrap();
        assert_eq!(out.rects().len(), 2);

        // The right column was never hashed, so a full hint now reports it.
        let out = refinery.refine(&Region::full(64, 64), &fb).unwrap();
        assert_eq!(out.rects(), &[Rect::new(32, 0, 32, 32), Rect::new(32, 32, 32, 32)]);
    }

    #[test]
    fn test_partial_edge_tiles() {
        let mut refinery = DamageRefinery::new();
        refinery.resize(40, 40);
        let fb = fb_with(40, 40, vec![0u8; 40 * 40 * 4]);
        let out = refinery.refine(&Region::full(40, 40), &fb).unwrap();
        assert!(out.rects().contains(&Rect::new(32, 32, 8, 8)));

        // Identical partial tiles refine to empty, like full ones.
        let again = refinery.refine(&Region::full(40, 40), &fb).unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn test_resize_resets_state() {
        let mut refinery = DamageRefinery::new();
        refinery.resize(64, 64);
        let fb = fb_with(64, 64, vec![0u8; 64 * 64 * 4]);
        refinery.refine(&Region::full(64, 64), &fb).unwrap();

        refinery.resize(32, 32);
        let small = fb_with(32, 32, vec![0u8; 32 * 32 * 4]);
        let out = refinery.refine(&Region::full(32, 32), &small).unwrap();
        assert!(!out.is_empty());
    }
}
