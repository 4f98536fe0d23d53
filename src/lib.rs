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


//! # rfbpipe
//!
//! The server-side frame pipeline of an RFB (VNC) display server: from a
//! captured framebuffer to encoded rectangle bytes.
//!
//! This library is the display-to-encoder core a VNC server builds on. It
//! takes the stream of pixel buffers an external capture source produces,
//! works out what actually changed, normalises orientation, and encodes
//! the changes as RFB "Tight" (RFC 6143 section 7.7.4) or "Open H.264"
//! rectangle payloads for the surrounding transport layer to multiplex to
//! viewers. The session state machine, sockets, authentication, and
//! per-client scheduling live in that surrounding layer, not here.
//!
//! ## Features
//!
//! - **Framebuffer lifecycle**: reference counting plus an independent
//!   "hold" count with a release hook, so capture sources know exactly
//!   when their pixels are free to reuse
//! - **Damage refinement**: per-tile content hashing drops regions that
//!   were reported damaged but did not change
//! - **Transform normalisation**: all eight output orientations
//! - **Tight encoding**: four persistent zlib streams, column-sharded
//!   across the worker pool; optional JPEG tiles via the `turbojpeg`
//!   feature
//! - **Open H.264**: serial video encoding with keyframe control and
//!   decoder reset signalling via the `open-h264` feature
//! - **Async**: built on Tokio; producers never block on the pipeline
//!
//! ## Quick Start
//!
//! ```no_run
//! use rfbpipe::{Display, Fourcc, Framebuffer, Region, Transform, UpdateSink};
//! use std::sync::Arc;
//!
//! struct Sink;
//!
//! impl UpdateSink for Sink {
//!     fn damage_region(&self, region: &Region) {
//!         // Schedule client updates covering `region`.
//!     }
//!     fn process_update_requests(&self) {
//!         // New H.264 packets are pending.
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let display = Display::new(0, 0);
//!     let sink: Arc<dyn UpdateSink> = Arc::new(Sink);
//!     display.set_server(&sink);
//!
//!     // One captured frame, 640x480 XRGB8888.
//!     let pixels = vec![0u8; 640 * 480 * 4];
//!     let fb = Framebuffer::from_memory(
//!         640,
//!         480,
//!         Fourcc::XRGB8888,
//!         Transform::Normal,
//!         pixels,
//!     )?;
//!     display.feed_buffer(fb, &Region::full(640, 480))?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Capture source               │
//! │     framebuffers + damage hints         │
//! └──────────────────┬──────────────────────┘
//!                    │ feed_buffer
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │               Display                   │
//! │                                         │
//! │  damage refinery ─ resampler ─ framer   │
//! └───────┬──────────────────────┬──────────┘
//!         │ current buffer       │ packets
//!         ▼                      ▼
//! ┌───────────────┐      ┌───────────────┐
//! │ Tight encoder │      │ Open H.264    │
//! │ 4 zlib shards │      │ framing       │
//! └───────┬───────┘      └───────┬───────┘
//!         └──────────┬───────────┘
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │    Session layer (not this crate)       │
//! │  update scheduling · sockets · auth     │
//! └─────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod damage;
pub mod display;
pub mod encoding;
pub mod error;
pub mod events;
pub mod fb_pool;
pub mod fourcc;
pub mod framebuffer;
pub mod protocol;
pub mod region;
pub mod resample;
pub mod transform;

// Internal modules
mod translate;
pub mod jpeg;

// Re-exports
pub use damage::DamageRefinery;
pub use display::Display;
pub use encoding::{OpenH264Framer, TightEncoder, TightQuality};
pub use error::{PipelineError, Result};
pub use events::UpdateSink;
pub use fb_pool::FbPool;
pub use fourcc::Fourcc;
pub use framebuffer::{Framebuffer, GpuBuffer};
pub use protocol::PixelFormat;
pub use region::{Rect, Region};
pub use resample::Resampler;
pub use transform::{transform_region, Transform};

#[cfg(feature = "open-h264")]
pub use encoding::H264Encoder;

#[cfg(feature = "turbojpeg")]
pub use jpeg::JpegCompressor;
