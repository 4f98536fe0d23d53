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

//! Buffer orientation transforms and their region math.
//!
//! Capture sources deliver buffers in output-native orientation; the
//! pipeline normalises everything to identity before encoding. A transform
//! describes how source coordinates map to normalised coordinates: an
//! optional x-axis mirror followed by a counted quarter-turn clockwise
//! rotation.

use crate::region::{Rect, Region};

/// Buffer orientation, matching the eight output transforms of the
/// wl_output protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transform {
    /// No transform.
    #[default]
    Normal,
    /// 90 degrees clockwise.
    Rotated90,
    /// 180 degrees.
    Rotated180,
    /// 270 degrees clockwise.
    Rotated270,
    /// X-axis mirror.
    Flipped,
    /// X-axis mirror, then 90 degrees clockwise.
    Flipped90,
    /// X-axis mirror, then 180 degrees.
    Flipped180,
    /// X-axis mirror, then 270 degrees clockwise.
    Flipped270,
}

impl Transform {
    /// True for the identity transform.
    #[must_use]
    pub fn is_identity(self) -> bool {
        self == Self::Normal
    }

    /// True when the transform swaps width and height.
    #[must_use]
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Self::Rotated90 | Self::Rotated270 | Self::Flipped90 | Self::Flipped270
        )
    }

    /// Dimensions of the transformed buffer.
    #[must_use]
    pub fn output_size(self, width: u32, height: u32) -> (u32, u32) {
        if self.swaps_dimensions() {
            (height, width)
        } else {
            (width, height)
        }
    }

    /// The transform undoing this one.
    ///
    /// Rotations invert to the opposite quarter turn; mirrored variants are
    /// their own inverse (conjugating a rotation by a mirror reverses it).
    #[must_use]
    pub fn inverse(self) -> Self {
        match self {
            Self::Rotated90 => Self::Rotated270,
            Self::Rotated270 => Self::Rotated90,
            other => other,
        }
    }

    fn mirrored(self) -> bool {
        matches!(
            self,
            Self::Flipped | Self::Flipped90 | Self::Flipped180 | Self::Flipped270
        )
    }

    fn quarter_turns(self) -> u32 {
        match self {
            Self::Normal | Self::Flipped => 0,
            Self::Rotated90 | Self::Flipped90 => 1,
            Self::Rotated180 | Self::Flipped180 => 2,
            Self::Rotated270 | Self::Flipped270 => 3,
        }
    }

    /// Maps a rectangle from source space (`width` x `height`) into the
    /// transformed space.
    #[must_use]
    pub fn apply_rect(self, rect: Rect, width: u32, height: u32) -> Rect {
        let r = if self.mirrored() {
            Rect { x: width - rect.x - rect.width, ..rect }
        } else {
            rect
        };
        match self.quarter_turns() {
            0 => r,
            1 => Rect::new(height - r.y - r.height, r.x, r.height, r.width),
            2 => Rect::new(width - r.x - r.width, height - r.y - r.height, r.width, r.height),
            3 => Rect::new(r.y, width - r.x - r.width, r.height, r.width),
            _ => unreachable!(),
        }
    }

    /// Maps a single pixel coordinate from source space into the transformed
    /// space.
    #[must_use]
    pub fn apply_point(self, x: u32, y: u32, width: u32, height: u32) -> (u32, u32) {
        let r = self.apply_rect(Rect::new(x, y, 1, 1), width, height);
        (r.x, r.y)
    }
}

/// Maps a whole damage region from source space (`width` x `height`) into
/// the transformed space.
#[must_use]
pub fn transform_region(region: &Region, transform: Transform, width: u32, height: u32) -> Region {
    if transform.is_identity() {
        return region.clone();
    }
    let mut out = Region::new();
    for rect in region {
        out.add_rect(transform.apply_rect(*rect, width, height));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Transform; 8] = [
        Transform::Normal,
        Transform::Rotated90,
        Transform::Rotated180,
        Transform::Rotated270,
        Transform::Flipped,
        Transform::Flipped90,
        Transform::Flipped180,
        Transform::Flipped270,
    ];

    #[test]
    fn test_rotate_90_rect() {
        // A 2x1 rect in the top-left of a 4x3 buffer lands in the top-right
        // column of the rotated 3x4 buffer.
        let out = Transform::Rotated90.apply_rect(Rect::new(0, 0, 2, 1), 4, 3);
        assert_eq!(out, Rect::new(2, 0, 1, 2));
    }

    #[test]
    fn test_flipped_mirror_only() {
        let out = Transform::Flipped.apply_rect(Rect::new(1, 2, 3, 4), 10, 10);
        assert_eq!(out, Rect::new(6, 2, 3, 4));
    }

    #[test]
    fn test_round_trip_all_transforms() {
        let (w, h) = (100, 80);
        let rect = Rect::new(3, 5, 7, 11);
        for t in ALL {
            let out = t.apply_rect(rect, w, h);
            let (ow, oh) = t.output_size(w, h);
            let back = t.inverse().apply_rect(out, ow, oh);
            assert_eq!(back, rect, "{t:?} does not round-trip");
        }
    }

    #[test]
    fn test_region_round_trip() {
        let (w, h) = (64, 48);
        let mut region = Region::new();
        region.add_rect(Rect::new(0, 0, 32, 32));
        region.add_rect(Rect::new(32, 16, 16, 32));
        for t in ALL {
            let out = transform_region(&region, t, w, h);
            let (ow, oh) = t.output_size(w, h);
            let back = transform_region(&out, t.inverse(), ow, oh);
            assert_eq!(back.rects().len(), region.rects().len());
            for rect in &region {
                assert!(back.rects().contains(rect));
            }
        }
    }

    #[test]
    fn test_point_mapping_corners() {
        // 180 degrees sends the top-left pixel to the bottom-right.
        assert_eq!(Transform::Rotated180.apply_point(0, 0, 4, 3), (3, 2));
        assert_eq!(Transform::Rotated90.apply_point(0, 0, 4, 3), (2, 0));
    }
}
