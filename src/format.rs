// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use core::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Four character code identifying a pixel layout, as used by V4L2.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl From<FourCC> for u32 {
    fn from(value: FourCC) -> Self {
        u32::from_le_bytes(value.0)
    }
}

impl From<u32> for FourCC {
    fn from(value: u32) -> Self {
        FourCC(value.to_le_bytes())
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for c in self.0 {
            let c = if c.is_ascii_graphic() { c as char } else { '.' };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl FromStr for FourCC {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let code: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| Error::unsupported("fourcc", s))?;
        Ok(FourCC(code))
    }
}

/// 8-bit single channel luma
pub const GREY: FourCC = FourCC(*b"GREY");

/// RGB 24-bit pixel format (8 bits per channel, no alpha)
pub const RGB3: FourCC = FourCC(*b"RGB3");

/// BGR 24-bit pixel format (8 bits per channel, no alpha)
pub const BGR3: FourCC = FourCC(*b"BGR3");

/// RGBA 32-bit pixel format (8 bits per channel, with alpha)
pub const RGBA: FourCC = FourCC(*b"AB24");

/// NV12 4:2:0 YUV semi-planar format (UV interleaved)
pub const NV12: FourCC = FourCC(*b"NV12");

/// NV21 4:2:0 YUV semi-planar format (VU interleaved)
pub const NV21: FourCC = FourCC(*b"NV21");

/// YUYV 4:2:2 YUV packed format (common camera output format)
pub const YUYV: FourCC = FourCC(*b"YUYV");

/// Pixel layouts understood by the conversion engine.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Gray8,
    Rgb888,
    Bgr888,
    Rgba8888,
    Nv12,
    Nv21,
    Yuyv,
}

impl PixelFormat {
    pub const fn fourcc(self) -> FourCC {
        match self {
            PixelFormat::Gray8 => GREY,
            PixelFormat::Rgb888 => RGB3,
            PixelFormat::Bgr888 => BGR3,
            PixelFormat::Rgba8888 => RGBA,
            PixelFormat::Nv12 => NV12,
            PixelFormat::Nv21 => NV21,
            PixelFormat::Yuyv => YUYV,
        }
    }

    /// Bytes per pixel for packed formats, `None` for semi-planar ones.
    pub const fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            PixelFormat::Gray8 => Some(1),
            PixelFormat::Rgb888 | PixelFormat::Bgr888 => Some(3),
            PixelFormat::Rgba8888 => Some(4),
            PixelFormat::Yuyv => Some(2),
            PixelFormat::Nv12 | PixelFormat::Nv21 => None,
        }
    }

    pub const fn is_semiplanar(self) -> bool {
        matches!(self, PixelFormat::Nv12 | PixelFormat::Nv21)
    }

    /// Formats whose channels are independent 8-bit samples, so they can be
    /// interpolated and drawn on channel by channel.
    pub const fn is_interleaved_rgb(self) -> bool {
        matches!(
            self,
            PixelFormat::Gray8 | PixelFormat::Rgb888 | PixelFormat::Bgr888 | PixelFormat::Rgba8888
        )
    }

    /// Bytes in one row of the first plane.
    pub const fn row_stride(self, width: u32) -> usize {
        match self.bytes_per_pixel() {
            Some(bpp) => bpp * width as usize,
            None => width as usize,
        }
    }
}

impl TryFrom<FourCC> for PixelFormat {
    type Error = Error;

    fn try_from(value: FourCC) -> Result<Self> {
        Ok(match value {
            GREY => PixelFormat::Gray8,
            RGB3 => PixelFormat::Rgb888,
            BGR3 => PixelFormat::Bgr888,
            RGBA => PixelFormat::Rgba8888,
            NV12 => PixelFormat::Nv12,
            NV21 => PixelFormat::Nv21,
            YUYV => PixelFormat::Yuyv,
            other => return Err(Error::unsupported("fourcc", other)),
        })
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            PixelFormat::Gray8 => "GRAY8",
            PixelFormat::Rgb888 => "RGB888",
            PixelFormat::Bgr888 => "BGR888",
            PixelFormat::Rgba8888 => "RGBA8888",
            PixelFormat::Nv12 => "NV12",
            PixelFormat::Nv21 => "NV21",
            PixelFormat::Yuyv => "YUYV",
        };
        f.write_str(name)
    }
}

/// Number of bytes an image of `format` and the given dimensions occupies.
///
/// This is the only place buffer sizes are derived; every allocation and
/// every copy in the crate is bounded by it.
///
/// # Errors
///
/// - `InvalidGeometry` when a dimension is zero, when the size overflows,
///   or when a chroma-subsampled format gets an odd dimension (NV12/NV21
///   need even width and height, YUYV an even width).
pub fn size_of(format: PixelFormat, width: u32, height: u32) -> Result<usize> {
    const OP: &str = "size_of";
    if width == 0 || height == 0 {
        return Err(Error::geometry(
            OP,
            format!("{format} {width}x{height} has no pixels"),
        ));
    }
    match format {
        PixelFormat::Nv12 | PixelFormat::Nv21 if width % 2 != 0 || height % 2 != 0 => {
            return Err(Error::geometry(
                OP,
                format!("{format} {width}x{height} needs even dimensions"),
            ));
        }
        PixelFormat::Yuyv if width % 2 != 0 => {
            return Err(Error::geometry(
                OP,
                format!("{format} {width}x{height} needs an even width"),
            ));
        }
        _ => {}
    }

    let pixels = (width as usize).checked_mul(height as usize);
    let size = match format.bytes_per_pixel() {
        Some(bpp) => pixels.and_then(|p| p.checked_mul(bpp)),
        None => pixels.and_then(|p| p.checked_mul(3)).map(|p| p / 2),
    };
    size.ok_or_else(|| Error::geometry(OP, format!("{format} {width}x{height} overflows")))
}
