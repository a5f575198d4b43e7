// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Image files in and out.
//!
//! Decoded images are always RGB channel order. JPEG goes through
//! turbojpeg; every other extension is handled by the `image` crate.

use std::path::Path;

use image::ColorType;
use tracing::debug;
use turbojpeg::OwnedBuf;

use crate::{
    buffer::PixelBuffer,
    error::{Error, Result},
    format::PixelFormat,
};

/// Quality used by [`encode`] for JPEG files.
pub const JPEG_QUALITY: i32 = 100;

/// Decodes an image file into GRAY8, RGB888 or RGBA8888.
pub fn decode(path: impl AsRef<Path>) -> Result<PixelBuffer<'static>> {
    let path = path.as_ref();
    let img = image::open(path)?;
    let (width, height) = (img.width(), img.height());
    let color = img.color();
    let buf = if !color.has_color() && !color.has_alpha() {
        PixelBuffer::from_vec(width, height, PixelFormat::Gray8, img.into_luma8().into_raw())?
    } else if color.has_alpha() {
        PixelBuffer::from_vec(width, height, PixelFormat::Rgba8888, img.into_rgba8().into_raw())?
    } else {
        PixelBuffer::from_vec(width, height, PixelFormat::Rgb888, img.into_rgb8().into_raw())?
    };
    debug!("decoded {} as {buf}", path.display());
    Ok(buf)
}

/// Writes `buf` to `path`, choosing the codec from the extension.
///
/// BGR888 input is reordered to RGB first.
pub fn encode(path: impl AsRef<Path>, buf: &PixelBuffer<'_>) -> Result<()> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if ext == "jpg" || ext == "jpeg" {
        let jpeg = encode_jpeg(buf, JPEG_QUALITY)?;
        std::fs::write(path, &jpeg[..])?;
    } else {
        let (data, color) = match buf.format() {
            PixelFormat::Gray8 => (buf.data()?.to_vec(), ColorType::L8),
            PixelFormat::Rgb888 => (buf.data()?.to_vec(), ColorType::Rgb8),
            PixelFormat::Rgba8888 => (buf.data()?.to_vec(), ColorType::Rgba8),
            PixelFormat::Bgr888 => (
                buf.data()?
                    .chunks_exact(3)
                    .flat_map(|p| [p[2], p[1], p[0]])
                    .collect(),
                ColorType::Rgb8,
            ),
            other => return Err(Error::unsupported("encode", other)),
        };
        image::save_buffer(path, &data, buf.width(), buf.height(), color)?;
    }
    debug!("encoded {buf} to {}", path.display());
    Ok(())
}

/// Compresses an interleaved buffer to JPEG.
///
/// # Example
///
/// ```
/// use edgefirst_frameprep::{buffer::PixelBuffer, codec::encode_jpeg, format::PixelFormat};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let img = PixelBuffer::alloc(640, 480, PixelFormat::Rgba8888)?;
/// let jpeg = encode_jpeg(&img, 90)?;
/// println!("Compressed to {} bytes", jpeg.len());
/// # Ok(())
/// # }
/// ```
pub fn encode_jpeg(buf: &PixelBuffer<'_>, quality: i32) -> Result<OwnedBuf> {
    let (format, subsamp) = match buf.format() {
        PixelFormat::Gray8 => (turbojpeg::PixelFormat::GRAY, turbojpeg::Subsamp::Gray),
        PixelFormat::Rgb888 => (turbojpeg::PixelFormat::RGB, turbojpeg::Subsamp::Sub2x2),
        PixelFormat::Bgr888 => (turbojpeg::PixelFormat::BGR, turbojpeg::Subsamp::Sub2x2),
        PixelFormat::Rgba8888 => (turbojpeg::PixelFormat::RGBA, turbojpeg::Subsamp::Sub2x2),
        other => return Err(Error::unsupported("encode_jpeg", other)),
    };
    let img = turbojpeg::Image {
        width: buf.width() as usize,
        height: buf.height() as usize,
        format,
        pixels: buf.data()?,
        pitch: buf.format().row_stride(buf.width()),
    };
    Ok(turbojpeg::compress(img, quality, subsamp)?)
}
