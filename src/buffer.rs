// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use core::fmt;
use std::os::fd::{AsRawFd, BorrowedFd};

use crate::{
    error::{Error, Result},
    format::{size_of, PixelFormat},
};

/// Rectangle specification for crop and placement operations.
///
/// Defines a rectangular region within an image for cropping,
/// region-of-interest resizing or letterbox placement.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    /// X coordinate of top-left corner
    pub x: i32,
    /// Y coordinate of top-left corner
    pub y: i32,
    /// Width of the rectangle in pixels
    pub width: i32,
    /// Height of the rectangle in pixels
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a whole `width` x `height` canvas.
    pub const fn full(width: u32, height: u32) -> Self {
        Rect::new(0, 0, width as i32, height as i32)
    }

    pub const fn right(&self) -> i32 {
        self.x + self.width
    }

    pub const fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub const fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Intersection with a `width` x `height` canvas anchored at the origin.
    pub fn clamp_to(&self, width: u32, height: u32) -> Rect {
        let x = self.x.clamp(0, width as i32);
        let y = self.y.clamp(0, height as i32);
        let right = self.right().clamp(0, width as i32);
        let bottom = self.bottom().clamp(0, height as i32);
        Rect::new(x, y, (right - x).max(0), (bottom - y).max(0))
    }

    /// The four edges of an outline `thickness` pixels wide, drawn inside
    /// the rectangle: top, bottom, left, right.
    pub fn outline(&self, thickness: u32) -> [Rect; 4] {
        let t = (thickness.min(i32::MAX as u32) as i32)
            .min(self.width)
            .min(self.height)
            .max(0);
        [
            Rect::new(self.x, self.y, self.width, t),
            Rect::new(self.x, self.bottom() - t, self.width, t),
            Rect::new(self.x, self.y, t, self.height),
            Rect::new(self.right() - t, self.y, t, self.height),
        ]
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "({},{} {}x{})",
            self.x, self.y, self.width, self.height
        )
    }
}

/// Host memory that is not owned by the buffer.
#[derive(Debug)]
pub enum HostMemory<'a> {
    Shared(&'a [u8]),
    Exclusive(&'a mut [u8]),
}

impl HostMemory<'_> {
    fn as_slice(&self) -> &[u8] {
        match self {
            HostMemory::Shared(s) => s,
            HostMemory::Exclusive(s) => s,
        }
    }

    fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        match self {
            HostMemory::Shared(_) => None,
            HostMemory::Exclusive(s) => Some(s),
        }
    }
}

/// Where the pixels of a [`PixelBuffer`] live.
///
/// Only `Owned` storage is released by the buffer; borrowed host memory and
/// device descriptors belong to whoever lent them.
#[derive(Debug)]
pub enum Storage<'a> {
    /// Dimensions are known but nothing has been attached yet.
    Unpopulated,
    /// Allocation owned and freed by the buffer.
    Owned(Vec<u8>),
    /// Host memory lent by the caller.
    Borrowed(HostMemory<'a>),
    /// Kernel or accelerator buffer, optionally mapped into the process.
    Device {
        fd: BorrowedFd<'a>,
        host: Option<HostMemory<'a>>,
    },
}

/// Decoded image or captured frame.
///
/// The byte size is never stored: it is derived from the dimensions and the
/// format on every call, and every attached storage is checked to be at
/// least that large.
///
/// # Example
///
/// ```
/// use edgefirst_frameprep::{buffer::PixelBuffer, format::PixelFormat};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let img = PixelBuffer::alloc(100, 50, PixelFormat::Rgb888)?;
/// assert_eq!(img.byte_size(), 15000);
/// assert!(img.is_owned());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PixelBuffer<'a> {
    width: u32,
    height: u32,
    format: PixelFormat,
    storage: Storage<'a>,
}

impl<'a> PixelBuffer<'a> {
    /// Creates an unpopulated buffer, validating the geometry.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Result<Self> {
        size_of(format, width, height)?;
        Ok(Self {
            width,
            height,
            format,
            storage: Storage::Unpopulated,
        })
    }

    /// Creates a buffer backed by a zeroed allocation it owns.
    pub fn alloc(width: u32, height: u32, format: PixelFormat) -> Result<PixelBuffer<'static>> {
        let mut buf = PixelBuffer::new(width, height, format)?;
        buf.allocate()?;
        Ok(buf)
    }

    pub fn from_vec(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<PixelBuffer<'static>> {
        let buf = PixelBuffer::new(width, height, format)?;
        buf.check_len(data.len(), "from_vec")?;
        Ok(PixelBuffer {
            storage: Storage::Owned(data),
            ..buf
        })
    }

    pub fn from_slice(width: u32, height: u32, format: PixelFormat, data: &'a [u8]) -> Result<Self> {
        let buf = PixelBuffer::new(width, height, format)?;
        buf.check_len(data.len(), "from_slice")?;
        Ok(PixelBuffer {
            storage: Storage::Borrowed(HostMemory::Shared(data)),
            ..buf
        })
    }

    pub fn from_slice_mut(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: &'a mut [u8],
    ) -> Result<Self> {
        let buf = PixelBuffer::new(width, height, format)?;
        buf.check_len(data.len(), "from_slice_mut")?;
        Ok(PixelBuffer {
            storage: Storage::Borrowed(HostMemory::Exclusive(data)),
            ..buf
        })
    }

    /// Wraps a DMA or kernel buffer, with its host mapping when one exists.
    pub fn from_device(
        width: u32,
        height: u32,
        format: PixelFormat,
        fd: BorrowedFd<'a>,
        host: Option<HostMemory<'a>>,
    ) -> Result<Self> {
        let buf = PixelBuffer::new(width, height, format)?;
        if let Some(host) = &host {
            buf.check_len(host.as_slice().len(), "from_device")?;
        }
        Ok(PixelBuffer {
            storage: Storage::Device { fd, host },
            ..buf
        })
    }

    fn check_len(&self, len: usize, op: &'static str) -> Result<()> {
        let need = self.byte_size();
        if len < need {
            return Err(Error::geometry(
                op,
                format!("{self} needs {need} bytes but storage holds {len}"),
            ));
        }
        Ok(())
    }

    /// Attaches a fresh owned allocation sized for the current geometry.
    pub fn allocate(&mut self) -> Result<()> {
        let size = self.byte_size();
        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|e| Error::AllocationFailure {
                op: "allocate",
                size,
                reason: e.to_string(),
            })?;
        data.resize(size, 0);
        self.storage = Storage::Owned(data);
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn byte_size(&self) -> usize {
        // Geometry was validated on construction.
        size_of(self.format, self.width, self.height).unwrap_or(0)
    }

    pub fn storage(&self) -> &Storage<'a> {
        &self.storage
    }

    pub fn is_populated(&self) -> bool {
        !matches!(self.storage, Storage::Unpopulated)
    }

    pub fn is_owned(&self) -> bool {
        matches!(self.storage, Storage::Owned(_))
    }

    pub fn fd(&self) -> Option<BorrowedFd<'_>> {
        match &self.storage {
            Storage::Device { fd, .. } => Some(*fd),
            _ => None,
        }
    }

    /// Host view of the pixels, trimmed to [`PixelBuffer::byte_size`].
    pub fn data(&self) -> Result<&[u8]> {
        let size = self.byte_size();
        let data = match &self.storage {
            Storage::Owned(v) => v.as_slice(),
            Storage::Borrowed(h) => h.as_slice(),
            Storage::Device { host: Some(h), .. } => h.as_slice(),
            Storage::Device { fd, host: None } => {
                return Err(Error::HandleImportError {
                    op: "data",
                    fd: Some(fd.as_raw_fd()),
                    reason: "device buffer has no host mapping".to_string(),
                })
            }
            Storage::Unpopulated => return Err(self.unpopulated("data")),
        };
        Ok(&data[..size])
    }

    pub fn data_mut(&mut self) -> Result<&mut [u8]> {
        let size = self.byte_size();
        if !self.is_populated() {
            return Err(self.unpopulated("data_mut"));
        }
        let data = match &mut self.storage {
            Storage::Owned(v) => v.as_mut_slice(),
            Storage::Borrowed(h) | Storage::Device { host: Some(h), .. } => {
                h.as_mut_slice().ok_or(Error::ReadOnly { op: "data_mut" })?
            }
            Storage::Device { fd, host: None } => {
                return Err(Error::HandleImportError {
                    op: "data_mut",
                    fd: Some(fd.as_raw_fd()),
                    reason: "device buffer has no host mapping".to_string(),
                })
            }
            Storage::Unpopulated => return Err(Error::ReadOnly { op: "data_mut" }),
        };
        Ok(&mut data[..size])
    }

    fn unpopulated(&self, op: &'static str) -> Error {
        Error::AllocationFailure {
            op,
            size: self.byte_size(),
            reason: format!("{self} has no storage attached"),
        }
    }

    /// Releases the buffer, returning the owned allocation if there is one.
    pub fn into_vec(self) -> Option<Vec<u8>> {
        match self.storage {
            Storage::Owned(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for PixelBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match &self.storage {
            Storage::Unpopulated => "unpopulated".to_string(),
            Storage::Owned(_) => "owned".to_string(),
            Storage::Borrowed(_) => "borrowed".to_string(),
            Storage::Device { fd, .. } => format!("fd:{}", fd.as_raw_fd()),
        };
        write!(
            f,
            "{}x{} {} {}",
            self.width, self.height, self.format, kind
        )
    }
}
