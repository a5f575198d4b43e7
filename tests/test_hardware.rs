// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Tests against real devices. Run on target with `cargo test -- --ignored`.

use edgefirst_frameprep::{
    accel::{Accelerator, G2d},
    annotate::{self, AcceleratedAnnotator, Annotator, SoftwareAnnotator},
    buffer::PixelBuffer,
    capture::{CaptureConfig, CaptureDevice, DeviceState, V4l2},
    convert::{AcceleratedBackend, AcceleratedConfig, Converter},
    dma::{DmaAllocator, DmaHeap, DmaRegion},
    format::PixelFormat,
    geometry::GeometryPlanner,
};
use serial_test::serial;
use std::{error::Error, time::Duration};

#[test]
#[serial]
#[ignore = "requires a DMA heap"]
fn test_dma_heap() -> Result<(), Box<dyn Error>> {
    let heap = DmaHeap::default();
    let mut buf = heap.allocate(1024 * 1024)?;
    assert_eq!(buf.len(), 1024 * 1024);
    buf.cpu_access_begin()?;
    buf.as_slice_mut().fill(0x5a);
    buf.cpu_access_end()?;
    assert!(buf.as_slice().iter().all(|&b| b == 0x5a));
    assert!(heap.allocate(0).is_err());
    Ok(())
}

#[test]
#[serial]
#[ignore = "requires libg2d"]
fn test_g2d_letterbox() -> Result<(), Box<dyn Error>> {
    let g2d = G2d::new()?;
    let version = g2d.version();
    println!("G2D {}.{}.{}", version.major, version.minor, version.patch);
    let converter = Converter::new(
        Box::new(AcceleratedBackend::new(&g2d, AcceleratedConfig::default())),
        GeometryPlanner::default(),
    );
    let src = PixelBuffer::from_vec(1920, 1080, PixelFormat::Rgba8888, vec![200; 1920 * 1080 * 4])?;
    let mut dst = PixelBuffer::new(640, 640, PixelFormat::Rgba8888)?;
    let plan = converter.letterbox(&src, &mut dst, 114)?;
    assert_eq!(plan.y_pad, 140);
    assert_eq!(dst.data()?[0], 114);
    assert_eq!(g2d.outstanding(), 0);

    let text = SoftwareAnnotator::new();
    AcceleratedAnnotator::new(&g2d, AcceleratedConfig::default(), &text).draw_rect(
        &mut dst,
        0,
        140,
        640,
        360,
        annotate::GREEN,
        2,
    )?;
    assert_eq!(g2d.outstanding(), 0);
    Ok(())
}

#[test]
#[serial]
#[ignore = "requires /dev/video0"]
fn test_v4l2_capture() -> Result<(), Box<dyn Error>> {
    let config = CaptureConfig {
        timeout: Some(Duration::from_secs(2)),
        ..Default::default()
    };
    let mut cam = CaptureDevice::new(V4l2, DmaHeap::default(), config);
    cam.open("/dev/video0", 640, 480)?;
    let strategy = cam.allocate_buffers()?;
    println!("capturing with {strategy:?} buffers");
    cam.stream_on()?;

    let converter = Converter::software(GeometryPlanner::default());
    let mut dst = PixelBuffer::new(640, 640, PixelFormat::Rgb888)?;
    for _ in 0..10 {
        let frame = cam.acquire_frame()?;
        println!("{frame}");
        converter.letterbox(&cam.frame_buffer(&frame)?, &mut dst, 114)?;
        cam.release_frame(frame)?;
    }
    cam.close();
    assert_eq!(cam.state(), DeviceState::Closed);
    Ok(())
}
