// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use dma_buf::DmaBuf;
use std::{
    error::Error,
    fmt, io,
    os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd},
    sync::atomic::{AtomicU64, Ordering},
};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of a [`FrameBuffer`].
///
/// Only ever compared, never resolved back to the buffer. Identities are
/// unique for the lifetime of the process.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferId(u64);

impl BufferId {
    fn next() -> Self {
        BufferId(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum FrameStatus {
    #[default]
    Success,
    Error,
    Cancelled,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaneMetadata {
    pub bytes_used: u32,
}

/// Per-frame metadata filled in by whoever produced the frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameMetadata {
    pub status: FrameStatus,
    pub sequence: u32,
    /// Capture time in nanoseconds
    pub timestamp: u64,
    pub planes: Vec<PlaneMetadata>,
}

/// One memory plane of a frame, a dma-buf and the window inside it.
#[derive(Debug)]
pub struct Plane {
    pub fd: OwnedFd,
    pub offset: u32,
    pub length: u32,
}

impl Plane {
    pub fn new(fd: OwnedFd, offset: u32, length: u32) -> Self {
        Self { fd, offset, length }
    }
}

/// A frame made of dma-buf planes plus its metadata.
///
/// The buffer owns its file descriptors. It is deliberately not `Clone`:
/// moving a `FrameBuffer` is the only way to hand the descriptors over, and
/// duplicates must be requested explicitly through [`FrameBuffer::dmabuf`].
pub struct FrameBuffer {
    id: BufferId,
    planes: Vec<Plane>,
    metadata: FrameMetadata,
    cookie: u64,
}

impl FrameBuffer {
    pub fn new(planes: Vec<Plane>) -> Self {
        Self::with_cookie(planes, 0)
    }

    pub fn with_cookie(planes: Vec<Plane>, cookie: u64) -> Self {
        let metadata = FrameMetadata {
            planes: vec![PlaneMetadata::default(); planes.len()],
            ..Default::default()
        };
        Self {
            id: BufferId::next(),
            planes,
            metadata,
            cookie,
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn metadata(&self) -> &FrameMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut FrameMetadata {
        &mut self.metadata
    }

    pub fn cookie(&self) -> u64 {
        self.cookie
    }

    pub fn set_cookie(&mut self, cookie: u64) {
        self.cookie = cookie;
    }

    pub fn plane_fd(&self, index: usize) -> Option<BorrowedFd<'_>> {
        self.planes.get(index).map(|p| p.fd.as_fd())
    }

    /// Hands the planes, and with them the file descriptors, to the caller.
    pub fn into_planes(self) -> Vec<Plane> {
        self.planes
    }

    /// Returns a [`DmaBuf`] over a duplicate of the plane's descriptor, for CPU
    /// access through `memory_map`.
    pub fn dmabuf(&self, index: usize) -> io::Result<DmaBuf> {
        let plane = self.planes.get(index).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("buffer {} has no plane {index}", self.id),
            )
        })?;
        Ok(DmaBuf::from(plane.fd.try_clone()?))
    }

    /// Maps a plane and runs `f` over the bytes the metadata marks as used.
    pub fn read_plane<R>(
        &self,
        index: usize,
        f: impl Fn(&[u8]) -> R,
    ) -> Result<R, Box<dyn Error>> {
        let plane = self.planes.get(index).ok_or("no such plane")?;
        let offset = plane.offset as usize;
        let used = self
            .metadata
            .planes
            .get(index)
            .map_or(plane.length, |m| m.bytes_used) as usize;
        let mem = self.dmabuf(index)?.memory_map()?;
        let out = mem.read(
            |data: &[u8], _: Option<()>| {
                let end = (offset + used).min(data.len());
                Ok(f(&data[offset.min(end)..end]))
            },
            None,
        )?;
        Ok(out)
    }

    /// Maps a plane and lets `f` fill it.
    pub fn write_plane(
        &self,
        index: usize,
        f: impl Fn(&mut [u8]),
    ) -> Result<(), Box<dyn Error>> {
        let plane = self.planes.get(index).ok_or("no such plane")?;
        let offset = plane.offset as usize;
        let length = plane.length as usize;
        let mut mem = self.dmabuf(index)?.memory_map()?;
        mem.write(
            |data: &mut [u8], _: Option<()>| {
                let end = (offset + length).min(data.len());
                f(&mut data[offset.min(end)..end]);
                Ok(())
            },
            None,
        )?;
        Ok(())
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("id", &self.id)
            .field(
                "planes",
                &self
                    .planes
                    .iter()
                    .map(|p| (p.fd.as_raw_fd(), p.offset, p.length))
                    .collect::<Vec<_>>(),
            )
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl fmt::Display for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "buffer {} planes:{}", self.id, self.planes.len())
    }
}
