// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_frameprep::{
    accel::{rgba_word, splat, Accelerator, HandleId, SurfaceDesc},
    annotate::{self, AcceleratedAnnotator, Annotator, SoftwareAnnotator},
    buffer::{PixelBuffer, Rect},
    convert::AcceleratedConfig,
    error::Result,
    format::PixelFormat,
    Error,
};
use std::{
    cell::{Cell, RefCell},
    error::Error as StdError,
    os::fd::BorrowedFd,
};

fn pixel(buf: &PixelBuffer<'_>, x: usize, y: usize) -> Vec<u8> {
    let bpp = buf.format().row_stride(1);
    let start = (y * buf.width() as usize + x) * bpp;
    buf.data().unwrap()[start..start + bpp].to_vec()
}

#[test]
fn test_rect_rgb() -> Result<(), Box<dyn StdError>> {
    let mut buf = PixelBuffer::alloc(32, 32, PixelFormat::Rgb888)?;
    SoftwareAnnotator::new().draw_rect(&mut buf, 4, 4, 10, 8, annotate::RED, 2)?;

    assert_eq!(pixel(&buf, 4, 4), [255, 0, 0]);
    assert_eq!(pixel(&buf, 5, 5), [255, 0, 0]);
    assert_eq!(pixel(&buf, 13, 11), [255, 0, 0]);
    assert_eq!(pixel(&buf, 7, 7), [0, 0, 0]);
    assert_eq!(pixel(&buf, 14, 4), [0, 0, 0]);
    assert_eq!(pixel(&buf, 20, 20), [0, 0, 0]);
    Ok(())
}

#[test]
fn test_rect_gray_and_rgba() -> Result<(), Box<dyn StdError>> {
    let annotator = SoftwareAnnotator::new();

    let mut gray = PixelBuffer::alloc(16, 16, PixelFormat::Gray8)?;
    annotator.draw_rect(&mut gray, 0, 0, 16, 16, annotate::GREEN, 1)?;
    assert_eq!(pixel(&gray, 0, 8), [150]);
    assert_eq!(pixel(&gray, 8, 8), [0]);

    let mut rgba = PixelBuffer::alloc(16, 16, PixelFormat::Rgba8888)?;
    annotator.draw_rect(&mut rgba, 0, 0, 16, 16, annotate::BLUE, 1)?;
    assert_eq!(pixel(&rgba, 15, 15), [0, 0, 255, 255]);
    assert_eq!(pixel(&rgba, 8, 8), [0, 0, 0, 0]);
    Ok(())
}

#[test]
fn test_rect_clipped() -> Result<(), Box<dyn StdError>> {
    let mut buf = PixelBuffer::alloc(16, 16, PixelFormat::Rgb888)?;
    SoftwareAnnotator::new().draw_rect(&mut buf, -5, -5, 10, 10, annotate::WHITE, 2)?;
    assert_eq!(pixel(&buf, 0, 0), [0, 0, 0]);
    assert_eq!(pixel(&buf, 3, 0), [255, 255, 255]);
    assert_eq!(pixel(&buf, 0, 3), [255, 255, 255]);
    assert_eq!(pixel(&buf, 5, 5), [0, 0, 0]);

    // Entirely outside is not an error.
    SoftwareAnnotator::new().draw_rect(&mut buf, 100, 100, 10, 10, annotate::WHITE, 2)?;
    Ok(())
}

#[test]
fn test_rect_rejected() -> Result<(), Box<dyn StdError>> {
    let annotator = SoftwareAnnotator::new();
    let mut nv12 = PixelBuffer::alloc(16, 16, PixelFormat::Nv12)?;
    assert!(matches!(
        annotator.draw_rect(&mut nv12, 0, 0, 4, 4, annotate::RED, 1),
        Err(Error::UnsupportedFormat { .. })
    ));
    let mut bgr = PixelBuffer::alloc(16, 16, PixelFormat::Bgr888)?;
    assert!(matches!(
        annotator.draw_rect(&mut bgr, 0, 0, 4, 4, annotate::RED, 1),
        Err(Error::UnsupportedFormat { .. })
    ));

    let mut buf = PixelBuffer::alloc(16, 16, PixelFormat::Rgb888)?;
    assert!(matches!(
        annotator.draw_rect(&mut buf, 0, 0, 4, 4, annotate::RED, 0),
        Err(Error::InvalidGeometry { .. })
    ));
    assert!(matches!(
        annotator.draw_rect(&mut buf, 0, 0, 0, 4, annotate::RED, 1),
        Err(Error::InvalidGeometry { .. })
    ));

    let pixels = vec![0u8; 16 * 16 * 3];
    let mut shared = PixelBuffer::from_slice(16, 16, PixelFormat::Rgb888, &pixels)?;
    assert!(matches!(
        annotator.draw_rect(&mut shared, 0, 0, 4, 4, annotate::RED, 1),
        Err(Error::ReadOnly { .. })
    ));
    Ok(())
}

#[test]
fn test_text() -> Result<(), Box<dyn StdError>> {
    let mut buf = PixelBuffer::alloc(64, 32, PixelFormat::Rgb888)?;
    assert!(matches!(
        SoftwareAnnotator::new().draw_text(&mut buf, "person", 0, 0, annotate::WHITE, 16.0),
        Err(Error::Font { .. })
    ));

    let annotator = match SoftwareAnnotator::with_system_font() {
        Ok(annotator) => annotator,
        Err(e) => {
            println!("skipping glyph rendering: {e}");
            return Ok(());
        }
    };
    assert!(annotator.has_font());
    annotator.draw_text(&mut buf, "Hi", 2, 2, annotate::WHITE, 20.0)?;
    assert!(buf.data()?.iter().any(|&b| b > 0));
    assert!(matches!(
        annotator.draw_text(&mut buf, "Hi", 2, 2, annotate::WHITE, -1.0),
        Err(Error::InvalidGeometry { .. })
    ));
    Ok(())
}

#[test]
fn test_missing_font_file() {
    assert!(matches!(
        SoftwareAnnotator::with_font_file("/nonexistent/font.ttf"),
        Err(Error::Font { .. })
    ));
}

#[test]
fn test_color_words() {
    assert_eq!(rgba_word(annotate::RED).to_le_bytes(), [255, 0, 0, 255]);
    assert_eq!(rgba_word(annotate::YELLOW).to_le_bytes(), [255, 255, 0, 255]);
    assert_eq!(splat(114).to_ne_bytes(), [114; 4]);
}

/// Records rectangle calls on host-staged surfaces.
#[derive(Default)]
struct RecordingAccelerator {
    live: Cell<usize>,
    next: Cell<HandleId>,
    rects: RefCell<Vec<(Rect, u32, u32)>>,
}

impl Accelerator for RecordingAccelerator {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn supports(&self, _format: PixelFormat) -> bool {
        true
    }

    fn import_fd(&self, _fd: BorrowedFd<'_>, _desc: SurfaceDesc) -> Result<HandleId> {
        Err(Error::Accelerator {
            op: "import_fd",
            reason: "host only".to_string(),
        })
    }

    fn import_host(&self, _data: &[u8], _desc: SurfaceDesc) -> Result<HandleId> {
        self.live.set(self.live.get() + 1);
        self.next.set(self.next.get() + 1);
        Ok(self.next.get())
    }

    fn release(&self, _handle: HandleId) {
        self.live.set(self.live.get() - 1);
    }

    fn fill(&self, _dst: HandleId, _area: Rect, _color: u32) -> Result<()> {
        Ok(())
    }

    fn blit(&self, _src: HandleId, _src_rect: Rect, _dst: HandleId, _dst_rect: Rect) -> Result<()> {
        Ok(())
    }

    fn rectangle(&self, _dst: HandleId, area: Rect, color: u32, thickness: u32) -> Result<()> {
        self.rects.borrow_mut().push((area, color, thickness));
        Ok(())
    }

    fn read_back(&self, _handle: HandleId, out: &mut [u8]) -> Result<()> {
        out.fill(7);
        Ok(())
    }

    fn outstanding(&self) -> usize {
        self.live.get()
    }
}

#[test]
fn test_accelerated_rect() -> Result<(), Box<dyn StdError>> {
    let accel = RecordingAccelerator::default();
    let text = SoftwareAnnotator::new();
    let annotator = AcceleratedAnnotator::new(&accel, AcceleratedConfig::default(), &text);

    let mut buf = PixelBuffer::alloc(64, 32, PixelFormat::Rgba8888)?;
    annotator.draw_rect(&mut buf, 2, 3, 20, 10, annotate::RED, 3)?;
    assert_eq!(
        accel.rects.borrow().as_slice(),
        &[(Rect::new(2, 3, 20, 10), rgba_word(annotate::RED), 3)]
    );
    assert_eq!(accel.outstanding(), 0);
    // Staged results are copied back.
    assert!(buf.data()?.iter().all(|&b| b == 7));

    let mut misaligned = PixelBuffer::alloc(100, 32, PixelFormat::Rgba8888)?;
    assert!(matches!(
        annotator.draw_rect(&mut misaligned, 0, 0, 8, 8, annotate::RED, 1),
        Err(Error::AlignmentError { width: 100, .. })
    ));
    assert_eq!(accel.rects.borrow().len(), 1);
    assert_eq!(accel.outstanding(), 0);

    assert!(matches!(
        annotator.draw_text(&mut buf, "car", 0, 0, annotate::WHITE, 12.0),
        Err(Error::Font { .. })
    ));
    Ok(())
}
