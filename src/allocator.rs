// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    buffer::BufferId,
    egl::Card,
    error::{Error, Result},
    format::{FourCC, Size},
    texture::DmaBufImage,
};
use dma_heap::{Heap, HeapKind};
use gbm::BufferObjectFlags;
use std::{
    collections::HashMap,
    os::fd::OwnedFd,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Memory handed out by a [`BufferAllocator`].
#[derive(Debug)]
pub struct Allocation {
    pub fd: OwnedFd,
    /// Offset of the first pixel inside the dma-buf
    pub offset: u32,
    /// Bytes between the starts of two rows
    pub stride: u32,
    /// Bytes from `offset` to the end of the image
    pub length: u32,
}

/// Source of GPU-writable dma-buf memory for exported output buffers.
pub trait BufferAllocator {
    fn allocate(&mut self, size: Size, format: FourCC) -> Result<Allocation>;

    /// Releases device resources held between allocations. Memory already
    /// handed out stays valid; the next allocation reopens what it needs.
    fn close(&mut self) {}
}

/// Allocates linear, render-capable buffer objects through GBM.
///
/// The render node is opened on the first allocation and held, separately
/// from the converter's rendering session, until [`BufferAllocator::close`].
/// Only the exported dma-buf is kept: the buffer object is destroyed right
/// away, the kernel keeps the memory alive while any descriptor references
/// it.
pub struct GbmAllocator {
    path: PathBuf,
    device: Option<gbm::Device<Card>>,
}

impl GbmAllocator {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            device: None,
        }
    }

    fn device(&mut self) -> Result<&gbm::Device<Card>> {
        if self.device.is_none() {
            let (card, path) = Card::open_with_fallback(&self.path)?;
            let device = gbm::Device::new(card)
                .map_err(|e| Error::Allocation(format!("gbm device on {}: {e}", path.display())))?;
            debug!("GBM allocator opened on {}", path.display());
            self.device = Some(device);
        }
        self.device
            .as_ref()
            .ok_or_else(|| Error::Allocation("GBM device unavailable".to_string()))
    }
}

impl BufferAllocator for GbmAllocator {
    fn allocate(&mut self, size: Size, format: FourCC) -> Result<Allocation> {
        let drm = format
            .drm_format()
            .ok_or_else(|| Error::Allocation(format!("no DRM format for {format}")))?;
        let device = self.device()?;
        let bo = device
            .create_buffer_object::<()>(
                size.width,
                size.height,
                drm,
                BufferObjectFlags::RENDERING | BufferObjectFlags::LINEAR,
            )
            .map_err(|e| Error::Allocation(format!("gbm_bo_create {size} {format}: {e}")))?;
        let fd = bo
            .fd()
            .map_err(|e| Error::Allocation(format!("gbm_bo_get_fd: {e}")))?;
        let offset = bo
            .offset(0)
            .map_err(|e| Error::Allocation(format!("gbm_bo_get_offset: {e}")))?;
        let stride = bo
            .stride()
            .map_err(|e| Error::Allocation(format!("gbm_bo_get_stride: {e}")))?;
        let length = stride.checked_mul(size.height).ok_or_else(|| {
            Error::Allocation(format!("{size} with stride {stride} exceeds 4 GiB"))
        })?;
        Ok(Allocation {
            fd,
            offset,
            stride,
            length,
        })
    }

    fn close(&mut self) {
        if self.device.take().is_some() {
            debug!("GBM allocator closed {}", self.path.display());
        }
    }
}

/// Allocates tightly packed buffers from a Linux DMA heap.
pub struct HeapAllocator {
    heap: Heap,
}

impl HeapAllocator {
    pub fn new(kind: HeapKind) -> Result<Self> {
        let heap = Heap::new(kind)
            .map_err(|e| Error::Allocation(format!("dma heap unavailable: {e}")))?;
        Ok(Self { heap })
    }
}

impl BufferAllocator for HeapAllocator {
    fn allocate(&mut self, size: Size, format: FourCC) -> Result<Allocation> {
        let bpp = format
            .bytes_per_pixel()
            .ok_or_else(|| Error::Allocation(format!("unsupported format {format}")))?;
        let length = size
            .width
            .checked_mul(bpp)
            .and_then(|stride| stride.checked_mul(size.height))
            .ok_or_else(|| Error::Allocation(format!("{size} {format} exceeds 4 GiB")))?;
        let stride = size.width * bpp;
        let fd = self
            .heap
            .allocate(length as usize)
            .map_err(|e| Error::Allocation(format!("dma heap allocation of {length}: {e}")))?;
        Ok(Allocation {
            fd,
            offset: 0,
            stride,
            length,
        })
    }
}

/// GPU side of an exported output buffer.
pub struct RenderTarget {
    pub size: Size,
    pub format: FourCC,
    /// Row pitch reported by the allocator
    pub pitch: u32,
    pub offset: u32,
    /// Imported image, `None` until first use or after the session stopped.
    pub binding: Option<DmaBufImage>,
}

/// Exported output buffers keyed by buffer identity.
#[derive(Default)]
pub struct RenderTargets {
    records: HashMap<BufferId, RenderTarget>,
}

impl RenderTargets {
    pub fn insert(&mut self, id: BufferId, target: RenderTarget) -> Result<()> {
        if self.records.contains_key(&id) {
            return Err(Error::InvalidArgument(format!(
                "buffer {id} already has a render target"
            )));
        }
        self.records.insert(id, target);
        Ok(())
    }

    pub fn get_mut(&mut self, id: BufferId) -> Option<&mut RenderTarget> {
        self.records.get_mut(&id)
    }

    pub fn contains(&self, id: BufferId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Takes every live binding out of the table, leaving the records.
    pub fn take_bindings(&mut self) -> Vec<DmaBufImage> {
        self.records
            .values_mut()
            .filter_map(|r| r.binding.take())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        buffer::{FrameBuffer, Plane},
        format::ABGR8888,
    };
    use std::fs::File;

    fn target() -> RenderTarget {
        RenderTarget {
            size: Size::new(64, 32),
            format: ABGR8888,
            pitch: 256,
            offset: 0,
            binding: None,
        }
    }

    fn buffer() -> FrameBuffer {
        let fd = OwnedFd::from(File::open("/dev/null").unwrap());
        FrameBuffer::new(vec![Plane::new(fd, 0, 256 * 32)])
    }

    #[test]
    fn test_one_record_per_buffer() {
        let a = buffer();
        let b = buffer();
        let mut targets = RenderTargets::default();
        targets.insert(a.id(), target()).unwrap();
        targets.insert(b.id(), target()).unwrap();
        assert!(targets.insert(a.id(), target()).is_err());
        assert_eq!(targets.len(), 2);
        assert!(targets.contains(a.id()));
        assert!(targets.contains(b.id()));
    }

    #[test]
    fn test_take_bindings_keeps_records() {
        let a = buffer();
        let mut targets = RenderTargets::default();
        targets.insert(a.id(), target()).unwrap();
        assert!(targets.take_bindings().is_empty());
        assert_eq!(targets.len(), 1);
        assert!(targets.get_mut(a.id()).is_some_and(|t| t.binding.is_none()));
    }

    #[test]
    fn test_gbm_close_before_open() {
        let mut alloc = GbmAllocator::new("/dev/dri/does-not-exist");
        alloc.close();
        assert!(alloc.device.is_none());
    }

    #[test]
    fn test_heap_rejects_oversized_frame() {
        // skipped where the system heap is not exposed
        if let Ok(mut heap) = HeapAllocator::new(HeapKind::System) {
            let err = heap.allocate(Size::new(70000, 70000), ABGR8888).unwrap_err();
            assert!(matches!(err, Error::Allocation(_)));
        }
    }

    #[test]
    fn test_missing_gbm_node() {
        let mut alloc = GbmAllocator::new("/dev/dri/does-not-exist");
        let err = alloc.allocate(Size::new(64, 64), ABGR8888).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
