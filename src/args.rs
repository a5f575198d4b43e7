// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use edgefirst_frameprep::{
    capture::CaptureConfig,
    convert::AcceleratedConfig,
    dma::DmaHeapKind,
    error::Result,
    format::{FourCC, PixelFormat},
    geometry::PlannerConfig,
};
use std::{path::PathBuf, time::Duration};

/// Conversion backend selection.
///
/// Chosen once at startup; the software path still handles requests the
/// hardware refuses for alignment reasons.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Copy)]
pub enum Backend {
    /// CPU raster path
    Software,
    /// NXP i.MX G2D 2D engine
    G2d,
}

/// Pixel format expected by the model.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Copy)]
pub enum ModelFormat {
    Rgb,
    Bgr,
    Rgba,
    Gray,
}

impl From<ModelFormat> for PixelFormat {
    fn from(value: ModelFormat) -> Self {
        match value {
            ModelFormat::Rgb => PixelFormat::Rgb888,
            ModelFormat::Bgr => PixelFormat::Bgr888,
            ModelFormat::Rgba => PixelFormat::Rgba8888,
            ModelFormat::Gray => PixelFormat::Gray8,
        }
    }
}

/// DMA heap used for shared capture buffers.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Copy)]
pub enum HeapSetting {
    /// Contiguous memory allocator
    Cma,
    /// System heap (requires an IOMMU for hardware access)
    System,
}

impl From<HeapSetting> for DmaHeapKind {
    fn from(value: HeapSetting) -> Self {
        match value {
            HeapSetting::Cma => DmaHeapKind::Cma,
            HeapSetting::System => DmaHeapKind::System,
        }
    }
}

/// Command-line arguments for EdgeFirst Frame Preparation.
///
/// Arguments can be specified via command line or environment variables.
///
/// # Example
///
/// ```bash
/// # Via command line
/// edgefirst-frameprep --camera /dev/video0 --model-size "640 640" --backend g2d
///
/// # Decode a file instead of capturing
/// edgefirst-frameprep --input bus.jpg --output letterboxed.png
///
/// # Via environment variables
/// export CAMERA=/dev/video0
/// export BACKEND=software
/// edgefirst-frameprep
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Camera capture device path (e.g., /dev/video0)
    #[arg(short, long, env = "CAMERA", default_value = "/dev/video0")]
    pub camera: PathBuf,

    /// Decode this image file instead of capturing from the camera
    #[arg(short, long, env = "INPUT")]
    pub input: Option<PathBuf>,

    /// Camera capture resolution in pixels (width height)
    #[arg(
        long,
        env = "CAMERA_SIZE",
        default_value = "1920 1080",
        value_delimiter = ' ',
        num_args = 2
    )]
    pub camera_size: Vec<u32>,

    /// Camera pixel format as a fourcc
    #[arg(long, env = "CAMERA_FOURCC", default_value = "YUYV")]
    pub fourcc: String,

    /// Model input resolution in pixels (width height)
    #[arg(
        short,
        long,
        env = "MODEL_SIZE",
        default_value = "640 640",
        value_delimiter = ' ',
        num_args = 2
    )]
    pub model_size: Vec<u32>,

    /// Model input pixel format
    #[arg(long, env = "MODEL_FORMAT", default_value = "rgb", value_enum)]
    pub model_format: ModelFormat,

    /// Conversion backend
    #[arg(short, long, env = "BACKEND", default_value = "software", value_enum)]
    pub backend: Backend,

    /// Width alignment required by the hardware backend, in pixels
    #[arg(long, env = "ALIGNMENT", default_value = "16")]
    pub alignment: u32,

    /// Letterbox padding value, replicated across channels
    #[arg(long, env = "FILL", default_value = "114")]
    pub fill: u8,

    /// Capture buffer slots
    #[arg(long, env = "SLOTS", default_value = "4")]
    pub slots: u32,

    /// Give up waiting for a frame after this many milliseconds
    #[arg(long, env = "CAPTURE_TIMEOUT")]
    pub timeout_ms: Option<u64>,

    /// Use kernel mapped capture buffers only
    #[arg(long, env = "NO_SHARED")]
    pub no_shared: bool,

    /// DMA heap for shared capture buffers
    #[arg(long, env = "HEAP", default_value = "cma", value_enum)]
    pub heap: HeapSetting,

    /// Number of frames to capture
    #[arg(short, long, env = "FRAMES", default_value = "1")]
    pub frames: u32,

    /// Output image; the frame number is appended when capturing several
    #[arg(short, long, env = "OUTPUT", default_value = "frame.jpg")]
    pub output: PathBuf,

    /// TrueType font for labels (defaults to the system DejaVu Sans)
    #[arg(long, env = "FONT")]
    pub font: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Send logs to the systemd journal as well as the console
    #[arg(long, env = "JOURNALD")]
    pub journald: bool,
}

impl Args {
    pub fn capture_config(&self) -> Result<CaptureConfig> {
        Ok(CaptureConfig {
            slots: self.slots,
            fourcc: self.fourcc.parse::<FourCC>()?,
            timeout: self.timeout_ms.map(Duration::from_millis),
            prefer_shared: !self.no_shared,
        })
    }

    pub fn accelerated_config(&self) -> AcceleratedConfig {
        AcceleratedConfig {
            alignment: self.alignment,
        }
    }

    pub fn planner_config(&self) -> PlannerConfig {
        PlannerConfig::default()
    }
}
