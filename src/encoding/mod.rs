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

//! Encoders producing RFB rectangle payloads.
//!
//! Two encodings are implemented: Tight (per-tile deflate/JPEG) and
//! Open H.264 (a wrapped video elementary stream). Everything else a full
//! server advertises is the transport layer's concern.

pub mod open_h264;
pub mod tight;

#[cfg(feature = "open-h264")]
pub mod h264;

pub use open_h264::OpenH264Framer;
pub use tight::{TightEncoder, TightQuality};

#[cfg(feature = "open-h264")]
pub use h264::H264Encoder;
