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

//! End-to-end pipeline tests: capture feed through display to encoder.

use rfbpipe::{
    Display, Fourcc, Framebuffer, GpuBuffer, Rect, Region, TightEncoder, TightQuality,
    Transform, UpdateSink,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

struct TestSink {
    damage: mpsc::UnboundedSender<Region>,
}

impl UpdateSink for TestSink {
    fn damage_region(&self, region: &Region) {
        let _ = self.damage.send(region.clone());
    }

    fn process_update_requests(&self) {}
}

// The display only holds the sink weakly; the caller keeps the Arc alive.
fn attach_sink(display: &Display) -> (Arc<dyn UpdateSink>, mpsc::UnboundedReceiver<Region>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink: Arc<dyn UpdateSink> = Arc::new(TestSink { damage: tx });
    display.set_server(&sink);
    (sink, rx)
}

fn solid_fb(width: u32, height: u32, pixel: [u8; 4]) -> Arc<Framebuffer> {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for _ in 0..width * height {
        data.extend_from_slice(&pixel);
    }
    Framebuffer::from_memory(width, height, Fourcc::XRGB8888, Transform::Normal, data).unwrap()
}

#[tokio::test]
async fn feed_buffer_publishes_identity_frame() {
    let display = Display::new(0, 0);
    let (_sink, mut damage_rx) = attach_sink(&display);

    let fb = solid_fb(4, 4, [0, 0, 0, 0xFF]);
    display
        .feed_buffer(Arc::clone(&fb), &Region::full(4, 4))
        .unwrap();

    let region = damage_rx.recv().await.unwrap();
    assert_eq!(region.rects(), &[Rect::new(0, 0, 4, 4)]);

    // Identity system-memory frames pass through by reference and stay
    // held as the display's current buffer.
    let current = display.buffer().unwrap();
    assert!(Arc::ptr_eq(&current, &fb));
    assert_eq!(fb.holds(), 1);
    assert!(!display.h264_supported());
}

#[tokio::test]
async fn identical_refeed_notifies_empty_damage() {
    let display = Display::new(0, 0);
    let (_sink, mut damage_rx) = attach_sink(&display);

    let fb = solid_fb(64, 64, [1, 2, 3, 0]);
    display
        .feed_buffer(Arc::clone(&fb), &Region::full(64, 64))
        .unwrap();
    let first = damage_rx.recv().await.unwrap();
    assert!(!first.is_empty());

    display
        .feed_buffer(Arc::clone(&fb), &Region::full(64, 64))
        .unwrap();
    let second = damage_rx.recv().await.unwrap();
    assert!(second.is_empty(), "unchanged frame must refine to no damage");
}

#[tokio::test]
async fn replaced_buffer_is_released_to_producer() {
    let display = Display::new(0, 0);
    let (_sink, mut damage_rx) = attach_sink(&display);

    let first = solid_fb(4, 4, [10, 10, 10, 0]);
    let released = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&released);
    first.on_release(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    display
        .feed_buffer(Arc::clone(&first), &Region::full(4, 4))
        .unwrap();
    damage_rx.recv().await.unwrap();
    assert_eq!(released.load(Ordering::SeqCst), 0);

    let second = solid_fb(4, 4, [20, 20, 20, 0]);
    display
        .feed_buffer(second, &Region::full(4, 4))
        .unwrap();
    damage_rx.recv().await.unwrap();

    assert_eq!(first.holds(), 0);
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rotated_feed_normalises_current_buffer() {
    let display = Display::new(0, 0);
    let (_sink, mut damage_rx) = attach_sink(&display);

    let mut data = vec![0u8; 4 * 2 * 4];
    data[0] = 0x42; // mark the source origin pixel
    let fb =
        Framebuffer::from_memory(4, 2, Fourcc::XRGB8888, Transform::Rotated90, data).unwrap();
    display.feed_buffer(fb, &Region::full(4, 2)).unwrap();

    let region = damage_rx.recv().await.unwrap();
    assert_eq!(region.rects(), &[Rect::new(0, 0, 2, 4)]);

    let current = display.buffer().unwrap();
    assert_eq!((current.width(), current.height()), (2, 4));
    assert!(current.transform().is_identity());
    // Source (0,0) lands at (1,0) under a quarter turn clockwise.
    let pixels = current.map().unwrap();
    assert_eq!(pixels[4], 0x42);
}

#[tokio::test]
async fn current_buffer_feeds_tight_encoder() {
    let display = Display::new(0, 0);
    let (_sink, mut damage_rx) = attach_sink(&display);

    let fb = solid_fb(128, 128, [0x10, 0x20, 0x30, 0]);
    display.feed_buffer(fb, &Region::full(128, 128)).unwrap();
    let region = damage_rx.recv().await.unwrap();

    let current = display.buffer().unwrap();
    let fmt = current.format().pixel_format().unwrap();
    let mut encoder = TightEncoder::new(128, 128).unwrap();
    let payload = encoder
        .encode_frame(&fmt, &current, &fmt, &region, TightQuality::Lossless)
        .await
        .unwrap();

    // 2x2 tile grid, all four tiles damaged on the first frame.
    assert_eq!(u16::from_be_bytes([payload[0], payload[1]]), 4);
}

#[tokio::test]
async fn mapped_gpu_buffer_takes_cpu_path() {
    let display = Display::new(0, 0);
    let (_sink, mut damage_rx) = attach_sink(&display);

    let fb = Framebuffer::from_gpu_buffer(
        4,
        4,
        Fourcc::XRGB8888,
        0,
        Transform::Normal,
        GpuBuffer {
            handle: 1,
            stride: 16,
            offset: 0,
            mapped: Some(vec![0u8; 64].into_boxed_slice()),
        },
    )
    .unwrap();

    display
        .feed_buffer(Arc::clone(&fb), &Region::full(4, 4))
        .unwrap();
    let region = damage_rx.recv().await.unwrap();
    assert!(!region.is_empty());
    assert!(Arc::ptr_eq(&display.buffer().unwrap(), &fb));

    // Without the open-h264 feature every buffer reports unsupported; with
    // it, a normal-transform GPU buffer is the eligible case.
    assert_eq!(display.h264_supported(), cfg!(feature = "open-h264"));
}

#[cfg(not(feature = "open-h264"))]
#[tokio::test]
async fn unmappable_system_path_is_an_error() {
    let display = Display::new(0, 0);
    let (_sink, _damage_rx) = attach_sink(&display);

    let fb = Framebuffer::from_gpu_buffer(
        4,
        4,
        Fourcc::XRGB8888,
        0,
        Transform::Normal,
        GpuBuffer { handle: 1, stride: 16, offset: 0, mapped: None },
    )
    .unwrap();

    // No codec built in and no CPU mapping: nothing can consume the frame.
    assert!(display.feed_buffer(fb, &Region::full(4, 4)).is_err());
}
