// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use args::{Args, Backend};
use clap::Parser;
use edgefirst_frameprep::{
    accel::G2d,
    annotate::{self, AcceleratedAnnotator, Annotator, SoftwareAnnotator},
    buffer::PixelBuffer,
    capture::{CaptureDevice, V4l2},
    codec,
    convert::{AcceleratedBackend, Converter},
    dma::DmaHeap,
    geometry::{GeometryPlanner, LetterboxPlan},
    Error as PrepError,
};
use std::{
    error::Error,
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::{debug, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod args;

fn init_tracing(args: &Args) -> Result<(), Box<dyn Error>> {
    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let journald = if args.journald {
        Some(tracing_journald::layer()?)
    } else {
        None
    };
    tracing_subscriber::registry()
        .with(level)
        .with(tracing_subscriber::fmt::layer())
        .with(journald)
        .init();
    Ok(())
}

/// Output path for frame `index`, numbered only when several are written.
fn output_path(output: &Path, index: u32, frames: u32) -> PathBuf {
    if frames <= 1 {
        return output.to_path_buf();
    }
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "frame".to_string());
    let name = match output.extension() {
        Some(ext) => format!("{stem}_{index:04}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{index:04}"),
    };
    output.with_file_name(name)
}

struct Pipeline<'a> {
    converter: Converter<'a>,
    hardware: Option<AcceleratedAnnotator<'a, G2d>>,
    software: &'a SoftwareAnnotator,
    args: &'a Args,
}

impl Pipeline<'_> {
    fn convert(
        &self,
        src: &PixelBuffer<'_>,
    ) -> Result<(PixelBuffer<'static>, LetterboxPlan), Box<dyn Error>> {
        let mut dst = PixelBuffer::new(
            self.args.model_size[0],
            self.args.model_size[1],
            self.args.model_format.into(),
        )?;
        let now = Instant::now();
        let plan = self.converter.letterbox(src, &mut dst, self.args.fill)?;
        debug!(
            "{} letterbox {src} -> {dst}: {:?}",
            self.converter.backend_name(),
            now.elapsed()
        );
        Ok((dst, plan))
    }

    /// Outlines the image area inside the padding and labels it.
    fn annotate(
        &self,
        dst: &mut PixelBuffer<'_>,
        plan: &LetterboxPlan,
    ) -> Result<(), PrepError> {
        let place = plan.dst_place;
        let (w, h) = (place.width as u32, place.height as u32);
        let drawn = match &self.hardware {
            Some(hw) => hw.draw_rect(dst, place.x, place.y, w, h, annotate::GREEN, 2),
            None => self
                .software
                .draw_rect(dst, place.x, place.y, w, h, annotate::GREEN, 2),
        };
        match drawn {
            Err(PrepError::AlignmentError { .. }) | Err(PrepError::UnsupportedFormat { .. })
                if self.hardware.is_some() =>
            {
                debug!("drawing {dst} on the cpu");
                self.software
                    .draw_rect(dst, place.x, place.y, w, h, annotate::GREEN, 2)?;
            }
            res => res?,
        }

        if self.software.has_font() {
            let label = format!("{} x{:.3}", self.converter.backend_name(), plan.scale);
            self.software
                .draw_text(dst, &label, place.x + 4, place.y + 4, annotate::WHITE, 16.0)?;
        }
        Ok(())
    }

    fn finish(
        &self,
        mut dst: PixelBuffer<'_>,
        plan: &LetterboxPlan,
        index: u32,
    ) -> Result<(), Box<dyn Error>> {
        self.annotate(&mut dst, plan)?;
        let path = output_path(&self.args.output, index, self.args.frames);
        let now = Instant::now();
        codec::encode(&path, &dst)?;
        info!(
            "frame {index}: scale {:.3} pad {}x{} -> {} ({:?})",
            plan.scale,
            plan.x_pad,
            plan.y_pad,
            path.display(),
            now.elapsed()
        );
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(&args)?;

    let g2d = match args.backend {
        Backend::G2d => Some(G2d::new()?),
        Backend::Software => None,
    };
    let planner = GeometryPlanner::new(args.planner_config());
    let converter = match &g2d {
        Some(g2d) => Converter::new(
            Box::new(AcceleratedBackend::new(g2d, args.accelerated_config())),
            planner,
        ),
        None => Converter::software(planner),
    };

    let software = match &args.font {
        Some(path) => SoftwareAnnotator::with_font_file(path)?,
        None => SoftwareAnnotator::with_system_font().unwrap_or_else(|e| {
            warn!("{e}, labels disabled");
            SoftwareAnnotator::new()
        }),
    };
    let hardware = g2d
        .as_ref()
        .map(|g2d| AcceleratedAnnotator::new(g2d, args.accelerated_config(), &software));

    let pipeline = Pipeline {
        converter,
        hardware,
        software: &software,
        args: &args,
    };

    if let Some(input) = &args.input {
        let src = codec::decode(input)?;
        let (dst, plan) = pipeline.convert(&src)?;
        return pipeline.finish(dst, &plan, 0);
    }

    let allocator = DmaHeap::new(args.heap.into());
    let mut cam = CaptureDevice::new(V4l2, allocator, args.capture_config()?);
    cam.open(&args.camera, args.camera_size[0], args.camera_size[1])?;
    let strategy = cam.allocate_buffers()?;
    cam.stream_on()?;
    info!("capturing {} frames with {strategy:?} buffers", args.frames);

    for index in 0..args.frames {
        let now = Instant::now();
        let frame = cam.acquire_frame()?;
        debug!("acquired {frame} in {:?}", now.elapsed());

        // The slot goes back to the kernel as soon as conversion has read it.
        let converted = cam
            .frame_buffer(&frame)
            .map_err(|e| -> Box<dyn Error> { e.into() })
            .and_then(|src| pipeline.convert(&src));
        cam.release_frame(frame)?;

        let (dst, plan) = converted?;
        pipeline.finish(dst, &plan, index)?;
    }

    cam.close();
    Ok(())
}
