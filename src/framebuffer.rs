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

//! Framebuffer objects and their reference/hold lifecycle.
//!
//! A [`Framebuffer`] owns one frame of pixels plus its metadata. Two
//! independent counts govern it:
//!
//! - **References** are memory lifetime and map onto [`Arc`]: the object is
//!   freed when the last clone drops.
//! - **Hold** is pipeline possession: while `hold > 0` the producer must
//!   treat the pixels as in-use and may read but not mutate them. Each
//!   transition back to zero fires the release hook, telling the producer
//!   the pipeline is done with the frame.
//!
//! The counts are deliberately not merged: a producer may keep a reference
//! long after the pipeline released the pixels, and the pipeline may hold a
//! buffer whose producer already dropped its own reference. Everything
//! besides the counters is immutable after construction.

use crate::error::{PipelineError, Result};
use crate::fb_pool::FbPool;
use crate::fourcc::Fourcc;
use crate::transform::Transform;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Hook invoked each time the hold count returns to zero.
pub type ReleaseHook = Box<dyn Fn() + Send + Sync>;

/// Descriptor for a GPU buffer object handed over by the capture source.
///
/// Importing the object into a CPU mapping needs the graphics stack, which
/// lives outside this crate; producers that want the CPU paths (Tight,
/// software H.264) supply the mapped bytes themselves.
#[derive(Debug)]
pub struct GpuBuffer {
    /// Opaque driver handle for the buffer object.
    pub handle: u64,
    /// Row stride in bytes.
    pub stride: u32,
    /// Byte offset of the first pixel inside the object.
    pub offset: u32,
    /// CPU-visible copy of the pixels, when the producer mapped the object.
    pub mapped: Option<Box<[u8]>>,
}

#[derive(Debug)]
enum Storage {
    System(Vec<u8>),
    Gpu(GpuBuffer),
}

/// One frame of pixels with metadata and the ref/hold lifecycle.
pub struct Framebuffer {
    width: u32,
    height: u32,
    format: Fourcc,
    bytes_per_pixel: usize,
    modifier: u64,
    transform: Transform,
    storage: Storage,
    hold: AtomicUsize, // Atomic - bumped from pipeline tasks, read by producer
    release_hook: Mutex<Option<ReleaseHook>>,
    pool: Option<Weak<FbPool>>,
}

impl Framebuffer {
    /// Creates a framebuffer over producer-supplied system memory.
    ///
    /// # Errors
    ///
    /// Zero dimensions, an unregistered FourCC, or storage smaller than the
    /// geometry requires.
    pub fn from_memory(
        width: u32,
        height: u32,
        format: Fourcc,
        transform: Transform,
        data: Vec<u8>,
    ) -> Result<Arc<Self>> {
        let bytes_per_pixel = Self::validate(width, height, format)?;
        let need = width as usize * height as usize * bytes_per_pixel;
        if data.len() < need {
            return Err(PipelineError::InvalidOperation(format!(
                "framebuffer storage is {} bytes, geometry needs {need}",
                data.len()
            )));
        }
        Ok(Arc::new(Self {
            width,
            height,
            format,
            bytes_per_pixel,
            modifier: 0,
            transform,
            storage: Storage::System(data),
            hold: AtomicUsize::new(0),
            release_hook: Mutex::new(None),
            pool: None,
        }))
    }

    /// Creates a framebuffer over a GPU buffer object.
    ///
    /// # Errors
    ///
    /// Zero dimensions, an unregistered FourCC, or a mapping smaller than
    /// the geometry requires.
    pub fn from_gpu_buffer(
        width: u32,
        height: u32,
        format: Fourcc,
        modifier: u64,
        transform: Transform,
        buffer: GpuBuffer,
    ) -> Result<Arc<Self>> {
        let bytes_per_pixel = Self::validate(width, height, format)?;
        if let Some(mapped) = &buffer.mapped {
            let need = buffer.stride as usize * height as usize;
            if mapped.len() < need {
                return Err(PipelineError::InvalidOperation(format!(
                    "GPU mapping is {} bytes, geometry needs {need}",
                    mapped.len()
                )));
            }
        }
        Ok(Arc::new(Self {
            width,
            height,
            format,
            bytes_per_pixel,
            modifier,
            transform,
            storage: Storage::Gpu(buffer),
            hold: AtomicUsize::new(0),
            release_hook: Mutex::new(None),
            pool: None,
        }))
    }

    pub(crate) fn new_pooled(
        width: u32,
        height: u32,
        format: Fourcc,
        data: Vec<u8>,
        pool: Weak<FbPool>,
    ) -> Result<Arc<Self>> {
        let bytes_per_pixel = Self::validate(width, height, format)?;
        Ok(Arc::new(Self {
            width,
            height,
            format,
            bytes_per_pixel,
            modifier: 0,
            transform: Transform::Normal,
            storage: Storage::System(data),
            hold: AtomicUsize::new(0),
            release_hook: Mutex::new(None),
            pool: Some(pool),
        }))
    }

    fn validate(width: u32, height: u32, format: Fourcc) -> Result<usize> {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidDimensions { width, height });
        }
        format.bytes_per_pixel()
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// FourCC pixel-format code.
    #[must_use]
    pub fn format(&self) -> Fourcc {
        self.format
    }

    /// Buffer orientation relative to the normalised output.
    #[must_use]
    pub fn transform(&self) -> Transform {
        self.transform
    }

    /// DRM format modifier (0 for system memory).
    #[must_use]
    pub fn modifier(&self) -> u64 {
        self.modifier
    }

    /// Row stride in bytes.
    #[must_use]
    pub fn stride_bytes(&self) -> usize {
        match &self.storage {
            Storage::System(_) => self.width as usize * self.bytes_per_pixel,
            Storage::Gpu(buf) => buf.stride as usize,
        }
    }

    /// True for GPU buffer objects.
    #[must_use]
    pub fn is_gpu(&self) -> bool {
        matches!(self.storage, Storage::Gpu(_))
    }

    /// Borrows the readable pixel bytes. Idempotent for system memory; for
    /// GPU buffers this returns the producer-supplied mapping.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Unmappable`] for a GPU buffer without a mapping.
    pub fn map(&self) -> Result<&[u8]> {
        match &self.storage {
            Storage::System(data) => Ok(data),
            Storage::Gpu(buf) => buf
                .mapped
                .as_deref()
                .ok_or(PipelineError::Unmappable("GPU buffer without producer mapping")),
        }
    }

    /// Marks the buffer as possessed by the pipeline.
    pub fn hold(&self) {
        self.hold.fetch_add(1, Ordering::AcqRel);
    }

    /// Releases one unit of pipeline possession; the release hook fires on
    /// the transition back to zero.
    ///
    /// # Panics
    ///
    /// Panics on a release without a matching hold.
    pub fn release(&self) {
        let prev = self.hold.fetch_sub(1, Ordering::AcqRel);
        assert!(prev > 0, "framebuffer released without a matching hold");
        if prev == 1 {
            let hook = self.release_hook.lock().unwrap();
            if let Some(hook) = hook.as_ref() {
                hook();
            }
        }
    }

    /// Current hold count.
    #[must_use]
    pub fn holds(&self) -> usize {
        self.hold.load(Ordering::Acquire)
    }

    /// Installs the hook invoked each time the hold count reaches zero.
    pub fn on_release<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.release_hook.lock().unwrap() = Some(Box::new(hook));
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        let holds = self.hold.load(Ordering::Acquire);
        assert!(
            holds == 0,
            "framebuffer dropped with {holds} outstanding holds; \
             the release hook contract cannot be honoured"
        );
        if let Some(pool) = self.pool.as_ref().and_then(Weak::upgrade) {
            if let Storage::System(data) = std::mem::replace(&mut self.storage, Storage::System(Vec::new())) {
                pool.recycle(data);
            }
        }
    }
}
