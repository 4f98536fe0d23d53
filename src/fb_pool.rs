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

//! Bounded recycling of framebuffer pixel storage.
//!
//! Per-frame allocation churn is the enemy of a steady pipeline; the pool
//! keeps a small number of returned allocations and hands them back out for
//! the next frame. Pooled framebuffers return their storage automatically
//! when dropped. The pool is keyed to one geometry at a time; changing it
//! drains the free list.

use crate::error::Result;
use crate::fourcc::Fourcc;
use crate::framebuffer::Framebuffer;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

struct PoolInner {
    format: Fourcc,
    width: u32,
    height: u32,
    free: VecDeque<Vec<u8>>,
}

/// A bounded pool of reusable framebuffer storage.
pub struct FbPool {
    inner: Mutex<PoolInner>, // Free-list and geometry; locked only on get/put
    max_buffers: usize,
}

impl FbPool {
    /// Creates a pool for the given geometry keeping at most `max_buffers`
    /// free allocations.
    #[must_use]
    pub fn new(format: Fourcc, width: u32, height: u32, max_buffers: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(PoolInner {
                format,
                width,
                height,
                free: VecDeque::with_capacity(max_buffers),
            }),
            max_buffers,
        })
    }

    /// Re-keys the pool to a new geometry. A no-op when unchanged;
    /// otherwise the free list is drained.
    pub fn resize(&self, format: Fourcc, width: u32, height: u32) {
        let mut inner = self.inner.lock().unwrap();
        if (inner.format, inner.width, inner.height) == (format, width, height) {
            return;
        }
        inner.format = format;
        inner.width = width;
        inner.height = height;
        inner.free.clear();
    }

    /// Takes one allocation sized for the current geometry, recycled when
    /// possible. Recycled contents are stale; callers overwrite every pixel.
    ///
    /// # Errors
    ///
    /// Zero geometry or an unregistered format.
    pub(crate) fn take_storage(&self) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock().unwrap();
        let size = Self::storage_size(&inner)?;
        if let Some(data) = inner.free.pop_front() {
            debug_assert_eq!(data.len(), size);
            return Ok(data);
        }
        Ok(vec![0u8; size])
    }

    /// Wraps filled storage as a pooled framebuffer with identity transform.
    pub(crate) fn adopt_storage(self: &Arc<Self>, data: Vec<u8>) -> Result<Arc<Framebuffer>> {
        let (format, width, height) = {
            let inner = self.inner.lock().unwrap();
            (inner.format, inner.width, inner.height)
        };
        Framebuffer::new_pooled(width, height, format, data, Arc::downgrade(self))
    }

    /// Creates a zero-initialised pooled framebuffer.
    ///
    /// # Errors
    ///
    /// Zero geometry or an unregistered format.
    pub fn create_buffer(self: &Arc<Self>) -> Result<Arc<Framebuffer>> {
        let data = self.take_storage()?;
        self.adopt_storage(data)
    }

    pub(crate) fn recycle(&self, data: Vec<u8>) {
        let mut inner = self.inner.lock().unwrap();
        let Ok(size) = Self::storage_size(&inner) else {
            return;
        };
        if data.len() == size && inner.free.len() < self.max_buffers {
            inner.free.push_back(data);
        }
    }

    fn storage_size(inner: &PoolInner) -> Result<usize> {
        let bpp = inner.format.bytes_per_pixel()?;
        Ok(inner.width as usize * inner.height as usize * bpp)
    }
}
