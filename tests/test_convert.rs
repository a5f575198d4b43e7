// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_frameprep::{
    accel::{Accelerator, HandleId, SurfaceDesc},
    buffer::{PixelBuffer, Rect},
    convert::{AcceleratedBackend, AcceleratedConfig, ConversionBackend, Converter, SoftwareBackend},
    error::Result,
    format::PixelFormat,
    geometry::GeometryPlanner,
    Error,
};
use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    error::Error as StdError,
    os::fd::BorrowedFd,
};

/// Accelerator double that stages every surface in host memory.
///
/// `fill` writes the low byte of the color into the staged surface and
/// `blit` only counts calls, so read back results show which steps ran.
#[derive(Default)]
struct FakeAccelerator {
    surfaces: RefCell<HashMap<HandleId, Vec<u8>>>,
    next: Cell<HandleId>,
    imports: Cell<usize>,
    blits: Cell<usize>,
    fail_import_at: Option<usize>,
    fail_fill: bool,
    fail_blit: bool,
    no_gray: bool,
}

impl Accelerator for FakeAccelerator {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn supports(&self, format: PixelFormat) -> bool {
        !(self.no_gray && format == PixelFormat::Gray8)
    }

    fn import_fd(&self, _fd: BorrowedFd<'_>, _desc: SurfaceDesc) -> Result<HandleId> {
        Err(Error::Accelerator {
            op: "import_fd",
            reason: "not supported by fake".to_string(),
        })
    }

    fn import_host(&self, data: &[u8], _desc: SurfaceDesc) -> Result<HandleId> {
        let count = self.imports.get() + 1;
        self.imports.set(count);
        if self.fail_import_at == Some(count) {
            return Err(Error::HandleImportError {
                op: "import_host",
                fd: None,
                reason: "pool exhausted".to_string(),
            });
        }
        let id = self.next.get() + 1;
        self.next.set(id);
        self.surfaces.borrow_mut().insert(id, data.to_vec());
        Ok(id)
    }

    fn release(&self, handle: HandleId) {
        self.surfaces.borrow_mut().remove(&handle);
    }

    fn fill(&self, dst: HandleId, _area: Rect, color: u32) -> Result<()> {
        if self.fail_fill {
            return Err(Error::Accelerator {
                op: "fill",
                reason: "engine busy".to_string(),
            });
        }
        if let Some(data) = self.surfaces.borrow_mut().get_mut(&dst) {
            data.fill(color as u8);
        }
        Ok(())
    }

    fn blit(&self, _src: HandleId, _src_rect: Rect, _dst: HandleId, _dst_rect: Rect) -> Result<()> {
        self.blits.set(self.blits.get() + 1);
        if self.fail_blit {
            return Err(Error::Accelerator {
                op: "blit",
                reason: "engine fault".to_string(),
            });
        }
        Ok(())
    }

    fn rectangle(&self, _dst: HandleId, _area: Rect, _color: u32, _thickness: u32) -> Result<()> {
        Ok(())
    }

    fn read_back(&self, handle: HandleId, out: &mut [u8]) -> Result<()> {
        let surfaces = self.surfaces.borrow();
        let data = surfaces.get(&handle).ok_or(Error::Accelerator {
            op: "read_back",
            reason: format!("unknown handle {handle}"),
        })?;
        out.copy_from_slice(&data[..out.len()]);
        Ok(())
    }

    fn outstanding(&self) -> usize {
        self.surfaces.borrow().len()
    }
}

fn solid(width: u32, height: u32, format: PixelFormat, value: u8) -> PixelBuffer<'static> {
    let size = edgefirst_frameprep::format::size_of(format, width, height).unwrap();
    PixelBuffer::from_vec(width, height, format, vec![value; size]).unwrap()
}

#[test]
fn test_accelerated_letterbox() -> Result<(), Box<dyn StdError>> {
    let accel = FakeAccelerator::default();
    let backend = AcceleratedBackend::new(&accel, AcceleratedConfig::default());
    let src = solid(640, 480, PixelFormat::Rgb888, 200);
    let mut dst = PixelBuffer::new(320, 320, PixelFormat::Rgb888)?;

    let plan = backend.letterbox(&GeometryPlanner::default(), &src, &mut dst, 114)?;
    assert_eq!(plan.y_pad, 40);
    assert_eq!(accel.blits.get(), 1);
    assert_eq!(accel.outstanding(), 0);
    assert!(dst.is_owned());
    assert_eq!(dst.data()?[0], 114);
    Ok(())
}

#[test]
fn test_handles_released_on_blit_failure() -> Result<(), Box<dyn StdError>> {
    let accel = FakeAccelerator {
        fail_blit: true,
        ..Default::default()
    };
    let backend = AcceleratedBackend::new(&accel, AcceleratedConfig::default());
    let src = solid(640, 480, PixelFormat::Rgb888, 200);
    let mut dst = PixelBuffer::new(320, 320, PixelFormat::Rgb888)?;

    let res = backend.letterbox(&GeometryPlanner::default(), &src, &mut dst, 114);
    assert!(matches!(res, Err(Error::Accelerator { op: "blit", .. })));
    assert_eq!(accel.outstanding(), 0);
    Ok(())
}

#[test]
fn test_handles_released_on_import_failure() -> Result<(), Box<dyn StdError>> {
    let accel = FakeAccelerator {
        fail_import_at: Some(2),
        ..Default::default()
    };
    let backend = AcceleratedBackend::new(&accel, AcceleratedConfig::default());
    let src = solid(640, 480, PixelFormat::Rgb888, 200);
    let mut dst = PixelBuffer::new(320, 320, PixelFormat::Rgb888)?;

    let res = backend.convert(&src, None, &mut dst, None, 0);
    assert!(matches!(res, Err(Error::HandleImportError { .. })));
    assert_eq!(accel.imports.get(), 2);
    assert_eq!(accel.blits.get(), 0);
    assert_eq!(accel.outstanding(), 0);
    Ok(())
}

#[test]
fn test_fill_failure_clears_on_cpu() -> Result<(), Box<dyn StdError>> {
    let accel = FakeAccelerator {
        fail_fill: true,
        ..Default::default()
    };
    let backend = AcceleratedBackend::new(&accel, AcceleratedConfig::default());
    let src = solid(640, 480, PixelFormat::Rgb888, 200);
    let mut dst = PixelBuffer::new(320, 320, PixelFormat::Rgb888)?;

    backend.letterbox(&GeometryPlanner::default(), &src, &mut dst, 114)?;
    // Source, destination, and the destination again after the cpu fill.
    assert_eq!(accel.imports.get(), 3);
    assert_eq!(accel.outstanding(), 0);
    assert!(dst.data()?.iter().all(|&b| b == 114));
    Ok(())
}

#[test]
fn test_alignment_checked_before_import() -> Result<(), Box<dyn StdError>> {
    let accel = FakeAccelerator::default();
    let backend = AcceleratedBackend::new(&accel, AcceleratedConfig::default());
    let src = solid(100, 75, PixelFormat::Rgb888, 200);
    let mut dst = PixelBuffer::new(320, 320, PixelFormat::Rgb888)?;

    let res = backend.convert(&src, None, &mut dst, None, 0);
    assert!(matches!(
        res,
        Err(Error::AlignmentError {
            width: 100,
            alignment: 16,
            ..
        })
    ));
    assert_eq!(accel.imports.get(), 0);
    Ok(())
}

#[test]
fn test_unsupported_format() -> Result<(), Box<dyn StdError>> {
    let accel = FakeAccelerator {
        no_gray: true,
        ..Default::default()
    };
    let backend = AcceleratedBackend::new(&accel, AcceleratedConfig::default());
    let src = solid(64, 64, PixelFormat::Rgb888, 200);
    let mut dst = PixelBuffer::new(32, 32, PixelFormat::Gray8)?;

    let res = backend.convert(&src, None, &mut dst, None, 0);
    assert!(matches!(res, Err(Error::UnsupportedFormat { .. })));
    assert_eq!(accel.outstanding(), 0);
    Ok(())
}

#[test]
fn test_converter_falls_back_on_alignment() -> Result<(), Box<dyn StdError>> {
    let accel = FakeAccelerator::default();
    let converter = Converter::new(
        Box::new(AcceleratedBackend::new(&accel, AcceleratedConfig::default())),
        GeometryPlanner::default(),
    );
    assert_eq!(converter.backend_name(), "fake");
    let src = solid(100, 50, PixelFormat::Rgb888, 200);
    let mut dst = PixelBuffer::new(64, 64, PixelFormat::Rgb888)?;

    let plan = converter.letterbox(&src, &mut dst, 114)?;
    assert_eq!(accel.imports.get(), 0);
    assert_eq!(accel.outstanding(), 0);
    let data = dst.data()?;
    assert_eq!(data[0], 114);
    let center = (32 * 64 + 32) * 3;
    assert_eq!(&data[center..center + 3], &[200, 200, 200]);
    assert_eq!(plan.dst_place.width, 64);
    Ok(())
}

#[test]
fn test_converter_surfaces_hardware_errors() -> Result<(), Box<dyn StdError>> {
    let accel = FakeAccelerator {
        fail_blit: true,
        ..Default::default()
    };
    let converter = Converter::new(
        Box::new(AcceleratedBackend::new(&accel, AcceleratedConfig::default())),
        GeometryPlanner::default(),
    );
    let src = solid(640, 480, PixelFormat::Rgb888, 200);
    let mut dst = PixelBuffer::new(320, 320, PixelFormat::Rgb888)?;

    assert!(matches!(
        converter.letterbox(&src, &mut dst, 114),
        Err(Error::Accelerator { .. })
    ));
    assert_eq!(accel.outstanding(), 0);
    Ok(())
}

#[test]
fn test_software_identity_is_exact() -> Result<(), Box<dyn StdError>> {
    let pixels: Vec<u8> = (0..64 * 48 * 3).map(|i| (i * 7 % 251) as u8).collect();
    let src = PixelBuffer::from_slice(64, 48, PixelFormat::Rgb888, &pixels)?;
    let mut dst = PixelBuffer::new(64, 48, PixelFormat::Rgb888)?;
    SoftwareBackend.convert(&src, None, &mut dst, None, 0)?;
    assert_eq!(dst.data()?, &pixels[..]);
    Ok(())
}

#[test]
fn test_software_letterbox_fill() -> Result<(), Box<dyn StdError>> {
    let src = solid(800, 600, PixelFormat::Rgb888, 200);
    let mut dst = PixelBuffer::new(640, 640, PixelFormat::Rgb888)?;
    let plan = Converter::software(GeometryPlanner::default()).letterbox(&src, &mut dst, 114)?;
    assert_eq!(plan.y_pad, 80);

    let data = dst.data()?;
    let row = 640 * 3;
    assert!(data[..80 * row].iter().all(|&b| b == 114));
    assert!(data[80 * row..560 * row].iter().all(|&b| b == 200));
    assert!(data[560 * row..].iter().all(|&b| b == 114));
    Ok(())
}

#[test]
fn test_software_channel_swap() -> Result<(), Box<dyn StdError>> {
    let pixels = [1u8, 2, 3, 4, 5, 6];
    let src = PixelBuffer::from_slice(2, 1, PixelFormat::Rgb888, &pixels)?;
    let mut dst = PixelBuffer::new(2, 1, PixelFormat::Bgr888)?;
    SoftwareBackend.convert(&src, None, &mut dst, None, 0)?;
    assert_eq!(dst.data()?, &[3, 2, 1, 6, 5, 4]);
    Ok(())
}

#[test]
fn test_software_clamps_rects() -> Result<(), Box<dyn StdError>> {
    let src = solid(32, 32, PixelFormat::Gray8, 9);
    let mut dst = PixelBuffer::new(16, 16, PixelFormat::Gray8)?;
    SoftwareBackend.convert(
        &src,
        Some(Rect::new(-8, -8, 100, 100)),
        &mut dst,
        Some(Rect::new(0, 0, 1000, 1000)),
        0,
    )?;
    assert!(dst.data()?.iter().all(|&b| b == 9));

    assert!(matches!(
        SoftwareBackend.convert(&src, Some(Rect::new(40, 40, 4, 4)), &mut dst, None, 0),
        Err(Error::InvalidGeometry { .. })
    ));
    Ok(())
}

#[test]
fn test_software_rejects_mixed_formats() -> Result<(), Box<dyn StdError>> {
    let src = solid(16, 16, PixelFormat::Rgb888, 9);
    let mut dst = PixelBuffer::new(16, 16, PixelFormat::Rgba8888)?;
    assert!(matches!(
        SoftwareBackend.convert(&src, None, &mut dst, None, 0),
        Err(Error::UnsupportedFormat { .. })
    ));

    // The converter recolors first.
    Converter::software(GeometryPlanner::default()).convert(&src, None, &mut dst, None, 0)?;
    assert_eq!(&dst.data()?[..4], &[9, 9, 9, 255]);
    Ok(())
}

#[test]
fn test_yuyv_camera_frame() -> Result<(), Box<dyn StdError>> {
    // Y=235 with neutral chroma is white, Y=16 is black.
    let white: Vec<u8> = [235u8, 128, 235, 128].repeat(640 * 480 / 2);
    let src = PixelBuffer::from_slice(640, 480, PixelFormat::Yuyv, &white)?;
    let mut dst = PixelBuffer::new(320, 320, PixelFormat::Rgb888)?;
    let plan = Converter::software(GeometryPlanner::default()).letterbox(&src, &mut dst, 0)?;

    let data = dst.data()?;
    let center = ((plan.y_pad as usize + 100) * 320 + 160) * 3;
    assert_eq!(&data[center..center + 3], &[255, 255, 255]);
    assert_eq!(&data[..3], &[0, 0, 0]);

    let black: Vec<u8> = [16u8, 128, 16, 128].repeat(8 * 8 / 2);
    let src = PixelBuffer::from_slice(8, 8, PixelFormat::Yuyv, &black)?;
    let mut dst = PixelBuffer::new(8, 8, PixelFormat::Gray8)?;
    Converter::software(GeometryPlanner::default()).convert(&src, None, &mut dst, None, 7)?;
    assert!(dst.data()?.iter().all(|&b| b == 0));
    Ok(())
}

#[test]
fn test_unpopulated_source() -> Result<(), Box<dyn StdError>> {
    let src = PixelBuffer::new(16, 16, PixelFormat::Rgb888)?;
    let mut dst = PixelBuffer::new(16, 16, PixelFormat::Rgb888)?;
    assert!(SoftwareBackend.convert(&src, None, &mut dst, None, 0).is_err());
    Ok(())
}
