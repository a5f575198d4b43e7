// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use image::{
    imageops::{self, FilterType},
    ImageBuffer, Luma, Pixel, Rgb, Rgba,
};

use super::{prepare_dst, require_source, resolve_rect, ConversionBackend};
use crate::{
    buffer::{PixelBuffer, Rect},
    error::{Error, Result},
    format::PixelFormat,
};

/// Whether the software path handles `src` into `dst`: the same interleaved
/// format, or RGB and BGR swapped.
pub fn accepts(src: PixelFormat, dst: PixelFormat) -> bool {
    (src == dst && src.is_interleaved_rgb()) || is_swap(src, dst)
}

fn is_swap(src: PixelFormat, dst: PixelFormat) -> bool {
    matches!(
        (src, dst),
        (PixelFormat::Rgb888, PixelFormat::Bgr888) | (PixelFormat::Bgr888, PixelFormat::Rgb888)
    )
}

/// CPU raster backend using bilinear interpolation.
#[derive(Copy, Clone, Debug, Default)]
pub struct SoftwareBackend;

impl ConversionBackend for SoftwareBackend {
    fn name(&self) -> &'static str {
        "software"
    }

    fn convert(
        &self,
        src: &PixelBuffer<'_>,
        src_crop: Option<Rect>,
        dst: &mut PixelBuffer<'_>,
        dst_place: Option<Rect>,
        fill: u8,
    ) -> Result<()> {
        const OP: &str = "software_convert";
        let (src_format, dst_format) = (src.format(), dst.format());
        if !accepts(src_format, dst_format) {
            return Err(Error::unsupported(OP, format!("{src_format} -> {dst_format}")));
        }
        require_source(src, OP)?;
        let src_crop = resolve_rect(src_crop, src.width(), src.height(), OP)?;
        prepare_dst(dst)?;
        let (dst_w, dst_h) = (dst.width(), dst.height());
        let dst_place = resolve_rect(dst_place, dst_w, dst_h, OP)?;

        let (place_w, place_h) = (dst_place.width as u32, dst_place.height as u32);
        let src_data = src.data()?;
        let mut patch = match src_format.bytes_per_pixel() {
            Some(1) => scale::<Luma<u8>>(src_data, src.width(), src_crop, place_w, place_h)?,
            Some(3) => scale::<Rgb<u8>>(src_data, src.width(), src_crop, place_w, place_h)?,
            Some(4) => scale::<Rgba<u8>>(src_data, src.width(), src_crop, place_w, place_h)?,
            _ => return Err(Error::unsupported(OP, src_format)),
        };
        if is_swap(src_format, dst_format) {
            for px in patch.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
        }

        let bpp = dst_format.row_stride(1);
        let stride = dst_format.row_stride(dst_w);
        let row_len = place_w as usize * bpp;
        let out = dst.data_mut()?;
        if dst_place != Rect::full(dst_w, dst_h) {
            out.fill(fill);
        }
        for (row, line) in patch.chunks_exact(row_len).enumerate() {
            let start = (dst_place.y as usize + row) * stride + dst_place.x as usize * bpp;
            out[start..start + row_len].copy_from_slice(line);
        }
        Ok(())
    }
}

/// Copies `crop` out of a packed image and resizes it to `out_w` x `out_h`.
fn scale<P>(data: &[u8], width: u32, crop: Rect, out_w: u32, out_h: u32) -> Result<Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let bpp = P::CHANNEL_COUNT as usize;
    let stride = width as usize * bpp;
    let row_len = crop.width as usize * bpp;
    let mut region = Vec::with_capacity(row_len * crop.height as usize);
    for row in crop.y..crop.bottom() {
        let start = row as usize * stride + crop.x as usize * bpp;
        region.extend_from_slice(&data[start..start + row_len]);
    }
    let (crop_w, crop_h) = (crop.width as u32, crop.height as u32);
    if (crop_w, crop_h) == (out_w, out_h) {
        return Ok(region);
    }
    let img = ImageBuffer::<P, Vec<u8>>::from_raw(crop_w, crop_h, region).ok_or_else(|| {
        Error::geometry("software_scale", format!("crop {crop} exceeds source data"))
    })?;
    Ok(imageops::resize(&img, out_w, out_h, FilterType::Triangle).into_raw())
}
