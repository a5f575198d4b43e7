// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Letterbox planning.
//!
//! Pure arithmetic: given source and destination dimensions the planner
//! decides the scale, the padding and the two rectangles a conversion
//! backend needs. No buffer is touched here.

use tracing::debug;

use crate::{
    buffer::Rect,
    error::{Error, Result},
};

/// Planner tuning.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PlannerConfig {
    /// Allow shrinking the resized dimension by a few pixels so it lands on
    /// the alignment quanta below.
    pub allow_slight_change: bool,
    /// Resized widths are snapped down to a multiple of this.
    pub width_quantum: u32,
    /// Resized heights and leading pads are snapped down to a multiple of
    /// this.
    pub height_quantum: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            allow_slight_change: true,
            width_quantum: 4,
            height_quantum: 2,
        }
    }
}

/// Result of letterbox planning.
///
/// `x_pad`/`y_pad` are the leading offsets of the placement on the
/// destination; `scale` maps source pixels to destination pixels.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LetterboxPlan {
    pub scale: f32,
    pub x_pad: u32,
    pub y_pad: u32,
    /// Region read from the source image.
    pub src_crop: Rect,
    /// Region written on the destination image.
    pub dst_place: Rect,
}

impl LetterboxPlan {
    /// Maps a rectangle in destination coordinates back onto the source
    /// image, clamped to the source crop.
    pub fn to_source(&self, rect: Rect) -> Rect {
        let map_x = |x: i32| ((x - self.x_pad as i32) as f32 / self.scale).round() as i32;
        let map_y = |y: i32| ((y - self.y_pad as i32) as f32 / self.scale).round() as i32;
        let left = (map_x(rect.x) + self.src_crop.x).clamp(self.src_crop.x, self.src_crop.right());
        let top = (map_y(rect.y) + self.src_crop.y).clamp(self.src_crop.y, self.src_crop.bottom());
        let right =
            (map_x(rect.right()) + self.src_crop.x).clamp(self.src_crop.x, self.src_crop.right());
        let bottom =
            (map_y(rect.bottom()) + self.src_crop.y).clamp(self.src_crop.y, self.src_crop.bottom());
        Rect::new(left, top, right - left, bottom - top)
    }

    /// Maps a rectangle in source coordinates onto the destination.
    pub fn to_destination(&self, rect: Rect) -> Rect {
        let map_x = |x: i32| ((x - self.src_crop.x) as f32 * self.scale).round() as i32;
        let map_y = |y: i32| ((y - self.src_crop.y) as f32 * self.scale).round() as i32;
        let left = map_x(rect.x) + self.x_pad as i32;
        let top = map_y(rect.y) + self.y_pad as i32;
        Rect::new(
            left,
            top,
            map_x(rect.right()) + self.x_pad as i32 - left,
            map_y(rect.bottom()) + self.y_pad as i32 - top,
        )
    }
}

/// Computes letterbox plans.
///
/// # Example
///
/// ```
/// use edgefirst_frameprep::geometry::GeometryPlanner;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let plan = GeometryPlanner::default().plan(800, 600, 640, 640)?;
/// assert_eq!(plan.scale, 0.8);
/// assert_eq!((plan.x_pad, plan.y_pad), (0, 80));
/// assert_eq!(plan.dst_place.height, 480);
/// # Ok(())
/// # }
/// ```
#[derive(Copy, Clone, Debug, Default)]
pub struct GeometryPlanner {
    config: PlannerConfig,
}

impl GeometryPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plans a letterbox of the whole source image onto the destination.
    pub fn plan(&self, src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Result<LetterboxPlan> {
        self.plan_region(src_w, src_h, Rect::full(src_w, src_h), dst_w, dst_h)
    }

    /// Plans a letterbox of the `crop` region of the source image.
    ///
    /// The crop is clamped to the source bounds first.
    pub fn plan_region(
        &self,
        src_w: u32,
        src_h: u32,
        crop: Rect,
        dst_w: u32,
        dst_h: u32,
    ) -> Result<LetterboxPlan> {
        const OP: &str = "plan";
        if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
            return Err(Error::geometry(
                OP,
                format!("{src_w}x{src_h} -> {dst_w}x{dst_h} has an empty side"),
            ));
        }
        let src_crop = crop.clamp_to(src_w, src_h);
        if src_crop.is_empty() {
            return Err(Error::geometry(
                OP,
                format!("crop {crop} lies outside {src_w}x{src_h}"),
            ));
        }
        let (crop_w, crop_h) = (src_crop.width as u32, src_crop.height as u32);

        let scale_w = dst_w as f32 / crop_w as f32;
        let scale_h = dst_h as f32 / crop_h as f32;
        let fill_width = scale_w < scale_h;
        let scale = scale_w.min(scale_h);

        let (mut resize_w, mut resize_h) = (dst_w, dst_h);
        // Equal scales fill both axes, so neither side is snapped.
        if scale_w != scale_h {
            if fill_width {
                resize_h = self.fit(crop_h, scale, dst_h, self.config.height_quantum);
            } else {
                resize_w = self.fit(crop_w, scale, dst_w, self.config.width_quantum);
            }
        }
        if resize_w == 0 || resize_h == 0 {
            return Err(Error::geometry(
                OP,
                format!(
                    "{crop_w}x{crop_h} scaled by {scale} collapses to {resize_w}x{resize_h}"
                ),
            ));
        }

        let (mut x_pad, mut y_pad) = (0, 0);
        if fill_width {
            y_pad = self.leading_pad(dst_h - resize_h);
        } else {
            x_pad = self.leading_pad(dst_w - resize_w);
        }

        let plan = LetterboxPlan {
            scale,
            x_pad,
            y_pad,
            src_crop,
            dst_place: Rect::new(x_pad as i32, y_pad as i32, resize_w as i32, resize_h as i32),
        };
        debug!(
            "letterbox {crop_w}x{crop_h} -> {dst_w}x{dst_h}: scale={} place={}",
            plan.scale, plan.dst_place
        );
        Ok(plan)
    }

    /// Scaled length of the axis that does not fill the destination.
    fn fit(&self, len: u32, scale: f32, limit: u32, quantum: u32) -> u32 {
        let resized = ((len as f32 * scale).round() as u32).min(limit);
        if !self.config.allow_slight_change || quantum <= 1 {
            return resized;
        }
        let snapped = resized - resized % quantum;
        // Never snap a thin image away entirely.
        if snapped == 0 {
            resized
        } else {
            snapped
        }
    }

    /// Half the padding, snapped down to an even offset.
    fn leading_pad(&self, padding: u32) -> u32 {
        let pad = padding / 2;
        pad - pad % 2
    }
}
