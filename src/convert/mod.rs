// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Crop, scale, pad and recolor pixel buffers.
//!
//! A [`ConversionBackend`] is picked once when the pipeline is configured.
//! [`Converter`] wraps it with the software path so requests the hardware
//! refuses for alignment reasons still complete.

use tracing::debug;

use crate::{
    buffer::{PixelBuffer, Rect},
    colorspace,
    error::{Error, Result},
    format::PixelFormat,
    geometry::{GeometryPlanner, LetterboxPlan},
};

pub mod accelerated;
pub mod software;

pub use accelerated::{AcceleratedBackend, AcceleratedConfig};
pub use software::SoftwareBackend;

/// One way of executing a crop + scale + pad.
pub trait ConversionBackend {
    fn name(&self) -> &'static str;

    /// Resizes `src_crop` of `src` into `dst_place` of `dst`, filling the
    /// rest of `dst` with `fill` when the placement does not cover it.
    ///
    /// Missing rectangles default to the whole buffer; out of bounds
    /// rectangles are clamped. An unpopulated `dst` is allocated.
    fn convert(
        &self,
        src: &PixelBuffer<'_>,
        src_crop: Option<Rect>,
        dst: &mut PixelBuffer<'_>,
        dst_place: Option<Rect>,
        fill: u8,
    ) -> Result<()>;

    /// Plans and executes an aspect preserving resize of all of `src`.
    fn letterbox(
        &self,
        planner: &GeometryPlanner,
        src: &PixelBuffer<'_>,
        dst: &mut PixelBuffer<'_>,
        fill: u8,
    ) -> Result<LetterboxPlan> {
        let plan = planner.plan(src.width(), src.height(), dst.width(), dst.height())?;
        self.convert(src, Some(plan.src_crop), dst, Some(plan.dst_place), fill)?;
        Ok(plan)
    }
}

pub(crate) fn require_source(src: &PixelBuffer<'_>, op: &'static str) -> Result<()> {
    if !src.is_populated() {
        return Err(Error::geometry(op, format!("source {src} is unpopulated")));
    }
    Ok(())
}

pub(crate) fn prepare_dst(dst: &mut PixelBuffer<'_>) -> Result<()> {
    if !dst.is_populated() {
        dst.allocate()?;
        debug!("allocated destination {dst}");
    }
    Ok(())
}

/// Defaults `rect` to the whole canvas and clamps it to the canvas.
pub(crate) fn resolve_rect(
    rect: Option<Rect>,
    width: u32,
    height: u32,
    op: &'static str,
) -> Result<Rect> {
    let requested = rect.unwrap_or(Rect::full(width, height));
    let clamped = requested.clamp_to(width, height);
    if clamped.is_empty() {
        return Err(Error::geometry(
            op,
            format!("{requested} does not intersect {width}x{height}"),
        ));
    }
    Ok(clamped)
}

/// Primary backend plus the software path for alignment fallbacks.
///
/// The software path converts YUV and mismatched sources on the CPU before
/// resizing, so it accepts anything a camera delivers.
pub struct Converter<'a> {
    primary: Option<Box<dyn ConversionBackend + 'a>>,
    fallback: SoftwareBackend,
    planner: GeometryPlanner,
}

impl<'a> Converter<'a> {
    pub fn new(primary: Box<dyn ConversionBackend + 'a>, planner: GeometryPlanner) -> Self {
        Self {
            primary: Some(primary),
            fallback: SoftwareBackend,
            planner,
        }
    }

    /// Converter that only uses the software path.
    pub fn software(planner: GeometryPlanner) -> Self {
        Self {
            primary: None,
            fallback: SoftwareBackend,
            planner,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match &self.primary {
            Some(primary) => primary.name(),
            None => self.fallback.name(),
        }
    }

    pub fn planner(&self) -> &GeometryPlanner {
        &self.planner
    }

    /// Letterboxes all of `src` into `dst`.
    ///
    /// # Example
    ///
    /// ```
    /// use edgefirst_frameprep::{
    ///     buffer::PixelBuffer, convert::Converter, format::PixelFormat,
    ///     geometry::GeometryPlanner,
    /// };
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let src = PixelBuffer::alloc(800, 600, PixelFormat::Rgb888)?;
    /// let mut dst = PixelBuffer::new(640, 640, PixelFormat::Rgb888)?;
    /// let plan = Converter::software(GeometryPlanner::default()).letterbox(&src, &mut dst, 114)?;
    /// assert_eq!(plan.y_pad, 80);
    /// assert_eq!(dst.data()?[0], 114);
    /// # Ok(())
    /// # }
    /// ```
    pub fn letterbox(
        &self,
        src: &PixelBuffer<'_>,
        dst: &mut PixelBuffer<'_>,
        fill: u8,
    ) -> Result<LetterboxPlan> {
        let plan = self
            .planner
            .plan(src.width(), src.height(), dst.width(), dst.height())?;
        self.convert(src, Some(plan.src_crop), dst, Some(plan.dst_place), fill)?;
        Ok(plan)
    }

    /// Runs the primary backend, rerouting to software only when the
    /// hardware refuses the widths.
    pub fn convert(
        &self,
        src: &PixelBuffer<'_>,
        src_crop: Option<Rect>,
        dst: &mut PixelBuffer<'_>,
        dst_place: Option<Rect>,
        fill: u8,
    ) -> Result<()> {
        let Some(primary) = &self.primary else {
            return self.convert_fallback(src, src_crop, dst, dst_place, fill);
        };
        match primary.convert(src, src_crop, dst, dst_place, fill) {
            Err(Error::AlignmentError {
                op,
                width,
                alignment,
            }) => {
                debug!(
                    "{op}: width {width} not a multiple of {alignment}, using {}",
                    self.fallback.name()
                );
                self.convert_fallback(src, src_crop, dst, dst_place, fill)
            }
            res => res,
        }
    }

    fn convert_fallback(
        &self,
        src: &PixelBuffer<'_>,
        src_crop: Option<Rect>,
        dst: &mut PixelBuffer<'_>,
        dst_place: Option<Rect>,
        fill: u8,
    ) -> Result<()> {
        if software::accepts(src.format(), dst.format()) {
            return self.fallback.convert(src, src_crop, dst, dst_place, fill);
        }
        let target = match dst.format() {
            f if f.is_interleaved_rgb() => f,
            _ => PixelFormat::Rgb888,
        };
        // The crop is in source pixels and a full frame colorspace pass
        // keeps the resolution, so it carries over unchanged.
        let recolored = colorspace::convert(src, target)?;
        self.fallback
            .convert(&recolored, src_crop, dst, dst_place, fill)
    }
}
