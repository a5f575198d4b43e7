// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Physically contiguous buffers shared between the camera, the 2D engine
//! and the CPU.

use std::{
    ffi::c_void,
    fmt, io,
    os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd},
    ptr::{null_mut, NonNull},
    slice::{from_raw_parts, from_raw_parts_mut},
};

use dma_buf::{DmaBuf, MappedDmaBuf};
use dma_heap::{Heap, HeapKind};
use libc::{mmap, munmap, off_t, MAP_FAILED, MAP_SHARED, PROT_READ, PROT_WRITE};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Shared memory mapping of a device buffer, unmapped on drop.
///
/// # Safety
///
/// While the API is safe, concurrent access from hardware and CPU can lead to
/// race conditions. Ensure hardware operations complete before CPU access.
#[derive(Debug)]
pub struct MappedRegion {
    ptr: NonNull<u8>,
    len: usize,
}

impl MappedRegion {
    /// Maps `len` bytes of `fd` starting at `offset`, read and write.
    pub fn map(fd: BorrowedFd<'_>, len: usize, offset: u64) -> io::Result<Self> {
        if len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot map zero bytes",
            ));
        }
        let ptr = unsafe {
            mmap(
                null_mut(),
                len,
                PROT_READ | PROT_WRITE,
                MAP_SHARED,
                fd.as_raw_fd(),
                offset as off_t,
            )
        };
        if ptr == MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let ptr = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))?;
        Ok(Self { ptr, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_slice_mut(&mut self) -> &mut [u8] {
        unsafe { from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl AsRef<[u8]> for MappedRegion {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsMut<[u8]> for MappedRegion {
    fn as_mut(&mut self) -> &mut [u8] {
        self.as_slice_mut()
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        if unsafe { munmap(self.ptr.as_ptr().cast::<c_void>(), self.len) } != 0 {
            warn!("munmap of {} bytes failed: {}", self.len, io::Error::last_os_error());
        }
    }
}

/// Device buffer with a host mapping.
pub trait DmaRegion: AsFd {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn as_slice(&self) -> &[u8];

    fn as_slice_mut(&mut self) -> &mut [u8];

    /// Makes device writes visible to the CPU before it reads the buffer.
    fn cpu_access_begin(&self) -> Result<()> {
        Ok(())
    }

    /// Flushes CPU writes and hands the buffer back to the device.
    fn cpu_access_end(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Source of physically backed buffers.
pub trait DmaAllocator {
    type Buffer: DmaRegion;

    /// Allocates and maps `len` bytes. Zero is rejected.
    fn allocate(&self, len: usize) -> Result<Self::Buffer>;
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DmaHeapKind {
    /// Contiguous memory allocator, required by engines without an IOMMU.
    #[default]
    Cma,
    System,
}

/// Linux dma-heap allocator.
#[derive(Copy, Clone, Debug, Default)]
pub struct DmaHeap {
    kind: DmaHeapKind,
}

impl DmaHeap {
    pub fn new(kind: DmaHeapKind) -> Self {
        Self { kind }
    }
}

impl DmaAllocator for DmaHeap {
    type Buffer = DmaBuffer;

    fn allocate(&self, len: usize) -> Result<DmaBuffer> {
        let failure = |reason: String| Error::AllocationFailure {
            op: "dma_heap_allocate",
            size: len,
            reason,
        };
        if len == 0 {
            return Err(failure("zero length".to_string()));
        }
        let kind = match self.kind {
            DmaHeapKind::Cma => HeapKind::Cma,
            DmaHeapKind::System => HeapKind::System,
        };
        let heap = Heap::new(kind).map_err(|e| failure(e.to_string()))?;
        let fd = heap.allocate(len).map_err(|e| failure(e.to_string()))?;
        let map = MappedRegion::map(fd.as_fd(), len, 0).map_err(|e| failure(e.to_string()))?;
        let dup = fd.try_clone().map_err(|e| failure(e.to_string()))?;
        let sync = DmaBuf::from(dup)
            .memory_map()
            .map_err(|e| failure(e.to_string()))?;
        debug!("allocated {len} bytes from {:?} heap as fd {}", self.kind, fd.as_raw_fd());
        Ok(DmaBuffer { map, sync, fd })
    }
}

/// Buffer from a [`DmaHeap`]; unmapped then closed on drop.
///
/// CPU access is bracketed with the dma-buf sync ioctls through a second
/// mapping owned by [`MappedDmaBuf`].
pub struct DmaBuffer {
    // Declared first so the mappings go before the descriptor.
    map: MappedRegion,
    sync: MappedDmaBuf,
    fd: OwnedFd,
}

impl DmaBuffer {
    fn sync_failed(op: &'static str, e: impl fmt::Display) -> Error {
        Error::CaptureError {
            op,
            source: io::Error::other(e.to_string()),
        }
    }
}

impl fmt::Debug for DmaBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DmaBuffer")
            .field("fd", &self.fd)
            .field("len", &self.map.len())
            .finish()
    }
}

impl AsFd for DmaBuffer {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl DmaRegion for DmaBuffer {
    fn len(&self) -> usize {
        self.map.len()
    }

    fn as_slice(&self) -> &[u8] {
        self.map.as_slice()
    }

    fn as_slice_mut(&mut self) -> &mut [u8] {
        self.map.as_slice_mut()
    }

    fn cpu_access_begin(&self) -> Result<()> {
        self.sync
            .read(|_: &[u8], _: Option<()>| Ok(()), None)
            .map_err(|e| Self::sync_failed("dma_buf_sync_start", e))
    }

    fn cpu_access_end(&mut self) -> Result<()> {
        self.sync
            .readwrite(|_: &mut [u8], _: Option<()>| Ok(()), None)
            .map_err(|e| Self::sync_failed("dma_buf_sync_end", e))
    }
}
