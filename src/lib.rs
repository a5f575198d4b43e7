// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! # EdgeFirst Frame Preparation Library
//!
//! This library prepares camera frames for a vision model: it captures raw
//! frames from a V4L2 device, letterboxes them to the model input size and
//! pixel format, and draws detections back onto the result.
//!
//! ## Features
//!
//! - **Letterbox Planning**: Aspect preserving scale and padding with the
//!   alignment the 2D engine needs, plus mapping of boxes back to the source.
//! - **Conversion Backends**: A software raster path and an NXP G2D path,
//!   selected once; misaligned requests fall back to software.
//! - **Frame Capture**: Zero-copy DMA buffers shared with the 2D engine, with
//!   kernel mapped buffers as fallback, and slot ownership tracked per frame.
//! - **Annotation**: Boxes and labels drawn in place.
//! - **JPEG Encoding**: turbojpeg compression of the prepared frames.
//!
//! ## Example
//!
//! ```no_run
//! use edgefirst_frameprep::{
//!     buffer::PixelBuffer, capture::{CaptureConfig, CaptureDevice, V4l2},
//!     convert::Converter, dma::DmaHeap, format::PixelFormat, geometry::GeometryPlanner,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut cam = CaptureDevice::new(V4l2, DmaHeap::default(), CaptureConfig::default());
//! cam.open("/dev/video0", 1920, 1080)?;
//! cam.allocate_buffers()?;
//! cam.stream_on()?;
//!
//! let converter = Converter::software(GeometryPlanner::default());
//! let mut model_input = PixelBuffer::new(640, 640, PixelFormat::Rgb888)?;
//! let frame = cam.acquire_frame()?;
//! let plan = converter.letterbox(&cam.frame_buffer(&frame)?, &mut model_input, 114)?;
//! cam.release_frame(frame)?;
//! println!("scale {} pad {}x{}", plan.scale, plan.x_pad, plan.y_pad);
//! # Ok(())
//! # }
//! ```
//!
//! ## Platform Requirements
//!
//! - **Linux**: Kernel 5.10+ with V4L2 and DMA heap support
//! - **Hardware Acceleration**: NXP i.MX8 with `libg2d.so.2` for G2D
//!   operations (software fallback available on other platforms)
//!
//! ## Safety
//!
//! This library uses `unsafe` code for FFI interactions with hardware drivers
//! and DMA buffer operations. All unsafe operations are isolated to the
//! `accel::g2d`, `capture::v4l2` and `dma` modules and wrapped with safe APIs.

pub mod accel;
pub mod annotate;
pub mod buffer;
pub mod capture;
pub mod codec;
pub mod colorspace;
pub mod convert;
pub mod dma;
pub mod error;
pub mod format;
pub mod geometry;

pub use error::{Error, Result};
