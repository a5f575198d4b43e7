// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! CPU colorspace conversion at native resolution.
//!
//! YUV input uses BT.601 limited range coefficients, which is what UVC and
//! MIPI camera sensors deliver.

use crate::{
    buffer::PixelBuffer,
    error::{Error, Result},
    format::PixelFormat,
};

fn clamp(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = 1.164 * (y as f32 - 16.0);
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;
    [
        clamp(c + 1.596 * e),
        clamp(c - 0.392 * d - 0.813 * e),
        clamp(c + 2.017 * d),
    ]
}

/// BT.601 luma of an RGB triple.
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    clamp(0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32)
}

/// Converts any supported format into a new RGB888 buffer.
pub fn to_rgb888(src: &PixelBuffer<'_>) -> Result<PixelBuffer<'static>> {
    let (width, height) = (src.width(), src.height());
    let (w, h) = (width as usize, height as usize);
    let data = src.data()?;
    let mut rgb = Vec::with_capacity(w * h * 3);

    match src.format() {
        PixelFormat::Rgb888 => rgb.extend_from_slice(data),
        PixelFormat::Bgr888 => {
            for px in data.chunks_exact(3) {
                rgb.extend_from_slice(&[px[2], px[1], px[0]]);
            }
        }
        PixelFormat::Rgba8888 => {
            for px in data.chunks_exact(4) {
                rgb.extend_from_slice(&px[..3]);
            }
        }
        PixelFormat::Gray8 => {
            for &y in data {
                rgb.extend_from_slice(&[y, y, y]);
            }
        }
        PixelFormat::Yuyv => {
            for px in data.chunks_exact(4) {
                rgb.extend_from_slice(&yuv_to_rgb(px[0], px[1], px[3]));
                rgb.extend_from_slice(&yuv_to_rgb(px[2], px[1], px[3]));
            }
        }
        format @ (PixelFormat::Nv12 | PixelFormat::Nv21) => {
            let (luma_plane, chroma) = data.split_at(w * h);
            for row in 0..h {
                let chroma_row = &chroma[(row / 2) * w..];
                for col in 0..w {
                    let pair = &chroma_row[(col / 2) * 2..];
                    let (u, v) = match format {
                        PixelFormat::Nv12 => (pair[0], pair[1]),
                        _ => (pair[1], pair[0]),
                    };
                    rgb.extend_from_slice(&yuv_to_rgb(luma_plane[row * w + col], u, v));
                }
            }
        }
    }
    PixelBuffer::from_vec(width, height, PixelFormat::Rgb888, rgb)
}

/// Converts `src` into a new buffer of an interleaved `target` format.
///
/// # Errors
///
/// `UnsupportedFormat` when `target` is a YUV format.
pub fn convert(src: &PixelBuffer<'_>, target: PixelFormat) -> Result<PixelBuffer<'static>> {
    if !target.is_interleaved_rgb() {
        return Err(Error::unsupported("colorspace_convert", target));
    }
    if src.format() == target {
        return PixelBuffer::from_vec(src.width(), src.height(), target, src.data()?.to_vec());
    }
    let rgb = to_rgb888(src)?;
    if target == PixelFormat::Rgb888 {
        return Ok(rgb);
    }
    let (width, height) = (rgb.width(), rgb.height());
    let pixels = rgb.data()?.chunks_exact(3);
    let data: Vec<u8> = match target {
        PixelFormat::Bgr888 => pixels.flat_map(|p| [p[2], p[1], p[0]]).collect(),
        PixelFormat::Rgba8888 => pixels.flat_map(|p| [p[0], p[1], p[2], 0xff]).collect(),
        _ => pixels.map(|p| luma(p[0], p[1], p[2])).collect(),
    };
    PixelBuffer::from_vec(width, height, target, data)
}
