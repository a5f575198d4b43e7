// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use tracing::warn;

use super::{prepare_dst, require_source, resolve_rect, ConversionBackend};
use crate::{
    accel::{splat, Accelerator, ImportedHandle},
    buffer::{PixelBuffer, Rect},
    error::{Error, Result},
};

/// Hardware backend settings.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AcceleratedConfig {
    /// Widths must be a multiple of this many pixels.
    pub alignment: u32,
}

impl Default for AcceleratedConfig {
    fn default() -> Self {
        Self { alignment: 16 }
    }
}

impl AcceleratedConfig {
    pub(crate) fn check_width(&self, width: u32, op: &'static str) -> Result<()> {
        let alignment = self.alignment.max(1);
        if width % alignment != 0 {
            return Err(Error::AlignmentError {
                op,
                width,
                alignment,
            });
        }
        Ok(())
    }
}

/// Backend driving a 2D engine through an [`Accelerator`].
///
/// Every buffer is imported for the duration of one call only. Handles are
/// held in [`ImportedHandle`] guards, so they go back to the pool on every
/// return path.
pub struct AcceleratedBackend<'a, A: Accelerator + ?Sized> {
    accel: &'a A,
    config: AcceleratedConfig,
}

impl<'a, A: Accelerator + ?Sized> AcceleratedBackend<'a, A> {
    pub fn new(accel: &'a A, config: AcceleratedConfig) -> Self {
        Self { accel, config }
    }

    pub fn config(&self) -> &AcceleratedConfig {
        &self.config
    }
}

impl<A: Accelerator + ?Sized> ConversionBackend for AcceleratedBackend<'_, A> {
    fn name(&self) -> &'static str {
        self.accel.name()
    }

    fn convert(
        &self,
        src: &PixelBuffer<'_>,
        src_crop: Option<Rect>,
        dst: &mut PixelBuffer<'_>,
        dst_place: Option<Rect>,
        fill: u8,
    ) -> Result<()> {
        const OP: &str = "accelerated_convert";
        self.config.check_width(src.width(), OP)?;
        self.config.check_width(dst.width(), OP)?;
        for format in [src.format(), dst.format()] {
            if !self.accel.supports(format) {
                return Err(Error::unsupported(OP, format));
            }
        }
        require_source(src, OP)?;
        let src_crop = resolve_rect(src_crop, src.width(), src.height(), OP)?;
        prepare_dst(dst)?;
        let canvas = Rect::full(dst.width(), dst.height());
        let dst_place = resolve_rect(dst_place, dst.width(), dst.height(), OP)?;

        let src_handle = ImportedHandle::import(self.accel, src, OP)?;
        let mut dst_handle = ImportedHandle::import(self.accel, dst, OP)?;

        if dst_place != canvas {
            if let Err(e) = self.accel.fill(dst_handle.id(), canvas, splat(fill)) {
                warn!("{OP}: hardware fill failed, clearing {dst} on the cpu: {e}");
                drop(dst_handle);
                dst.data_mut()?.fill(fill);
                dst_handle = ImportedHandle::import(self.accel, dst, OP)?;
            }
        }

        self.accel
            .blit(src_handle.id(), src_crop, dst_handle.id(), dst_place)?;
        if dst_handle.is_staged() {
            self.accel.read_back(dst_handle.id(), dst.data_mut()?)?;
        }
        Ok(())
    }
}
