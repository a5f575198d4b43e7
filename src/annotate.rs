// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! In-place drawing of detection boxes and labels.
//!
//! Colors are `0xRRGGBB`. GRAY8 buffers receive the luma of the color and
//! RGBA8888 buffers an opaque alpha.

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{ImageBuffer, Luma, Pixel, Rgb, Rgba};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use tracing::debug;

use crate::{
    accel::{rgba_word, Accelerator, ImportedHandle},
    buffer::{PixelBuffer, Rect},
    colorspace::luma,
    convert::AcceleratedConfig,
    error::{Error, Result},
    format::PixelFormat,
};

pub const RED: u32 = 0xff0000;
pub const GREEN: u32 = 0x00ff00;
pub const BLUE: u32 = 0x0000ff;
pub const WHITE: u32 = 0xffffff;
pub const BLACK: u32 = 0x000000;
pub const YELLOW: u32 = 0xffff00;

const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
];

/// Draws onto a populated buffer in place.
pub trait Annotator {
    /// Outlines the `w` x `h` box at `x`, `y`. Parts outside the buffer are
    /// clipped.
    #[allow(clippy::too_many_arguments)]
    fn draw_rect(
        &self,
        buf: &mut PixelBuffer<'_>,
        x: i32,
        y: i32,
        w: u32,
        h: u32,
        color: u32,
        thickness: u32,
    ) -> Result<()>;

    /// Renders `text` with its top left corner at `x`, `y`; `font_size` is
    /// the glyph height in pixels.
    fn draw_text(
        &self,
        buf: &mut PixelBuffer<'_>,
        text: &str,
        x: i32,
        y: i32,
        color: u32,
        font_size: f32,
    ) -> Result<()>;
}

fn check_format(buf: &PixelBuffer<'_>, op: &'static str) -> Result<()> {
    match buf.format() {
        PixelFormat::Gray8 | PixelFormat::Rgb888 | PixelFormat::Rgba8888 => Ok(()),
        other => Err(Error::unsupported(op, other)),
    }
}

fn check_box(w: u32, h: u32, thickness: u32, op: &'static str) -> Result<Rect> {
    if w == 0 || h == 0 || thickness == 0 {
        return Err(Error::geometry(
            op,
            format!("{w}x{h} box with thickness {thickness}"),
        ));
    }
    if w > i32::MAX as u32 || h > i32::MAX as u32 {
        return Err(Error::geometry(op, format!("{w}x{h} box overflows")));
    }
    Ok(Rect::new(0, 0, w as i32, h as i32))
}

/// Hands the pixels to `draw` as an image of `P` and writes the result back.
fn paint<P, F>(buf: &mut PixelBuffer<'_>, op: &'static str, draw: F) -> Result<()>
where
    P: Pixel<Subpixel = u8> + 'static,
    F: FnOnce(&mut ImageBuffer<P, Vec<u8>>),
{
    let (width, height) = (buf.width(), buf.height());
    let data = buf.data_mut()?;
    let mut img = ImageBuffer::<P, Vec<u8>>::from_raw(width, height, data.to_vec())
        .ok_or_else(|| Error::geometry(op, format!("{width}x{height} exceeds buffer")))?;
    draw(&mut img);
    data.copy_from_slice(img.as_raw());
    Ok(())
}

fn channels(color: u32) -> [u8; 3] {
    let [_, r, g, b] = color.to_be_bytes();
    [r, g, b]
}

fn fill_edges<P>(img: &mut ImageBuffer<P, Vec<u8>>, area: Rect, thickness: u32, color: P)
where
    P: Pixel<Subpixel = u8> + 'static,
{
    for edge in area.outline(thickness) {
        if edge.is_empty() {
            continue;
        }
        let rect = imageproc::rect::Rect::at(edge.x, edge.y)
            .of_size(edge.width as u32, edge.height as u32);
        draw_filled_rect_mut(img, rect, color);
    }
}

/// CPU annotator built on `imageproc`.
#[derive(Default)]
pub struct SoftwareAnnotator {
    font: Option<FontVec>,
}

impl SoftwareAnnotator {
    /// Annotator without a font; text drawing fails with `Font`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_font_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| Error::Font {
            reason: format!("{}: {e}", path.display()),
        })?;
        let font = FontVec::try_from_vec(bytes).map_err(|e| Error::Font {
            reason: format!("{}: {e}", path.display()),
        })?;
        debug!("loaded font {}", path.display());
        Ok(Self { font: Some(font) })
    }

    /// Loads the first DejaVu Sans found in the usual system locations.
    pub fn with_system_font() -> Result<Self> {
        SYSTEM_FONTS
            .iter()
            .map(Path::new)
            .find(|p| p.exists())
            .map(Self::with_font_file)
            .unwrap_or_else(|| {
                Err(Error::Font {
                    reason: format!("none of {SYSTEM_FONTS:?} exist"),
                })
            })
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }
}

impl Annotator for SoftwareAnnotator {
    fn draw_rect(
        &self,
        buf: &mut PixelBuffer<'_>,
        x: i32,
        y: i32,
        w: u32,
        h: u32,
        color: u32,
        thickness: u32,
    ) -> Result<()> {
        const OP: &str = "draw_rect";
        check_format(buf, OP)?;
        let size = check_box(w, h, thickness, OP)?;
        let area = Rect::new(x, y, size.width, size.height);
        let [r, g, b] = channels(color);
        match buf.format() {
            PixelFormat::Gray8 => paint::<Luma<u8>, _>(buf, OP, |img| {
                fill_edges(img, area, thickness, Luma([luma(r, g, b)]))
            }),
            PixelFormat::Rgba8888 => paint::<Rgba<u8>, _>(buf, OP, |img| {
                fill_edges(img, area, thickness, Rgba([r, g, b, 0xff]))
            }),
            _ => paint::<Rgb<u8>, _>(buf, OP, |img| {
                fill_edges(img, area, thickness, Rgb([r, g, b]))
            }),
        }
    }

    fn draw_text(
        &self,
        buf: &mut PixelBuffer<'_>,
        text: &str,
        x: i32,
        y: i32,
        color: u32,
        font_size: f32,
    ) -> Result<()> {
        const OP: &str = "draw_text";
        check_format(buf, OP)?;
        let font = self.font.as_ref().ok_or_else(|| Error::Font {
            reason: "no font loaded".to_string(),
        })?;
        if !font_size.is_finite() || font_size <= 0.0 {
            return Err(Error::geometry(OP, format!("font size {font_size}")));
        }
        let scale = PxScale::from(font_size);
        let [r, g, b] = channels(color);
        match buf.format() {
            PixelFormat::Gray8 => paint::<Luma<u8>, _>(buf, OP, |img| {
                draw_text_mut(img, Luma([luma(r, g, b)]), x, y, scale, font, text)
            }),
            PixelFormat::Rgba8888 => paint::<Rgba<u8>, _>(buf, OP, |img| {
                draw_text_mut(img, Rgba([r, g, b, 0xff]), x, y, scale, font, text)
            }),
            _ => paint::<Rgb<u8>, _>(buf, OP, |img| {
                draw_text_mut(img, Rgb([r, g, b]), x, y, scale, font, text)
            }),
        }
    }
}

/// Draws rectangles on the 2D engine. Text is always rendered on the cpu.
///
/// Misaligned buffers are refused with `AlignmentError`, never drawn in
/// software behind the caller's back.
pub struct AcceleratedAnnotator<'a, A: Accelerator + ?Sized> {
    accel: &'a A,
    config: AcceleratedConfig,
    text: &'a SoftwareAnnotator,
}

impl<'a, A: Accelerator + ?Sized> AcceleratedAnnotator<'a, A> {
    pub fn new(accel: &'a A, config: AcceleratedConfig, text: &'a SoftwareAnnotator) -> Self {
        Self {
            accel,
            config,
            text,
        }
    }
}

impl<A: Accelerator + ?Sized> Annotator for AcceleratedAnnotator<'_, A> {
    fn draw_rect(
        &self,
        buf: &mut PixelBuffer<'_>,
        x: i32,
        y: i32,
        w: u32,
        h: u32,
        color: u32,
        thickness: u32,
    ) -> Result<()> {
        const OP: &str = "accelerated_draw_rect";
        check_format(buf, OP)?;
        self.config.check_width(buf.width(), OP)?;
        if !self.accel.supports(buf.format()) {
            return Err(Error::unsupported(OP, buf.format()));
        }
        let size = check_box(w, h, thickness, OP)?;
        let area = Rect::new(x, y, size.width, size.height);

        let handle = ImportedHandle::import(self.accel, buf, OP)?;
        self.accel
            .rectangle(handle.id(), area, rgba_word(color), thickness)?;
        if handle.is_staged() {
            self.accel.read_back(handle.id(), buf.data_mut()?)?;
        }
        Ok(())
    }

    fn draw_text(
        &self,
        buf: &mut PixelBuffer<'_>,
        text: &str,
        x: i32,
        y: i32,
        color: u32,
        font_size: f32,
    ) -> Result<()> {
        self.text.draw_text(buf, text, x, y, color, font_size)
    }
}
