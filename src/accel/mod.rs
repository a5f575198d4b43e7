// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Hardware 2D engine interface.
//!
//! The engine only operates on buffers it knows about, so every buffer is
//! imported first and the returned handle must be released afterwards.
//! Handles come from a small process-wide pool; [`ImportedHandle`] ties the
//! release to scope exit so no error path can leak one.

use std::os::fd::{AsRawFd, BorrowedFd};

use tracing::debug;

use crate::{
    buffer::{PixelBuffer, Rect},
    error::{Error, Result},
    format::PixelFormat,
};

pub mod g2d;

pub use g2d::{G2d, G2dConfig};

/// Accelerator-side handle of an imported buffer.
pub type HandleId = u32;

/// Geometry the accelerator needs to interpret an imported buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SurfaceDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl From<&PixelBuffer<'_>> for SurfaceDesc {
    fn from(buf: &PixelBuffer<'_>) -> Self {
        SurfaceDesc {
            width: buf.width(),
            height: buf.height(),
            format: buf.format(),
        }
    }
}

/// Broker for a 2D accelerator and its buffer-handle pool.
///
/// Implementations use interior mutability; an accelerator is driven from a
/// single thread.
pub trait Accelerator {
    fn name(&self) -> &'static str;

    /// Whether the engine can read and write `format` surfaces.
    fn supports(&self, format: PixelFormat) -> bool;

    /// Registers a DMA buffer by file descriptor.
    fn import_fd(&self, fd: BorrowedFd<'_>, desc: SurfaceDesc) -> Result<HandleId>;

    /// Registers plain host memory. The engine may stage it, in which case
    /// [`Accelerator::read_back`] copies results out again.
    fn import_host(&self, data: &[u8], desc: SurfaceDesc) -> Result<HandleId>;

    /// Returns a handle to the pool. Unknown handles are ignored.
    fn release(&self, handle: HandleId);

    /// Fills `area` with `color` (one byte per channel, replicated).
    fn fill(&self, dst: HandleId, area: Rect, color: u32) -> Result<()>;

    /// Scaled copy with colorspace conversion when formats differ.
    fn blit(&self, src: HandleId, src_rect: Rect, dst: HandleId, dst_rect: Rect) -> Result<()>;

    /// Draws the outline of `area` with a color packed by [`rgba_word`].
    fn rectangle(&self, dst: HandleId, area: Rect, color: u32, thickness: u32) -> Result<()>;

    /// Copies the current contents of a host-imported handle into `out`.
    fn read_back(&self, handle: HandleId, out: &mut [u8]) -> Result<()>;

    /// Handles currently registered.
    fn outstanding(&self) -> usize;
}

/// Imported buffer handle, released when dropped.
pub struct ImportedHandle<'a, A: Accelerator + ?Sized> {
    accel: &'a A,
    handle: HandleId,
    staged: bool,
}

impl<'a, A: Accelerator + ?Sized> ImportedHandle<'a, A> {
    /// Imports `buf` by descriptor when it has one, by host address
    /// otherwise.
    pub fn import(accel: &'a A, buf: &PixelBuffer<'_>, op: &'static str) -> Result<Self> {
        let desc = SurfaceDesc::from(buf);
        let (handle, staged) = match buf.fd() {
            Some(fd) => {
                let handle = accel.import_fd(fd, desc).map_err(|e| Error::HandleImportError {
                    op,
                    fd: Some(fd.as_raw_fd()),
                    reason: e.to_string(),
                })?;
                (handle, false)
            }
            None => {
                let data = buf.data().map_err(|e| Error::HandleImportError {
                    op,
                    fd: None,
                    reason: e.to_string(),
                })?;
                let handle = accel.import_host(data, desc)?;
                (handle, true)
            }
        };
        debug!("{} imported {buf} as handle {handle}", accel.name());
        Ok(Self {
            accel,
            handle,
            staged,
        })
    }

    pub fn id(&self) -> HandleId {
        self.handle
    }

    /// Whether results must be copied back into host memory.
    pub fn is_staged(&self) -> bool {
        self.staged
    }
}

impl<A: Accelerator + ?Sized> Drop for ImportedHandle<'_, A> {
    fn drop(&mut self) {
        self.accel.release(self.handle);
        debug!("{} released handle {}", self.accel.name(), self.handle);
    }
}

/// Replicates one byte across the four channels of a fill color.
pub const fn splat(value: u8) -> u32 {
    u32::from_ne_bytes([value; 4])
}

/// Packs a `0xRRGGBB` color as opaque R, G, B, A bytes in memory order.
pub const fn rgba_word(color: u32) -> u32 {
    let [_, r, g, b] = color.to_be_bytes();
    u32::from_le_bytes([r, g, b, 0xff])
}
