// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::{io, os::fd::RawFd, path::PathBuf, time::Duration};
use thiserror::Error;

use crate::capture::DeviceState;

/// Errors raised by the frame preparation core.
///
/// Every variant names the operation that failed together with the values
/// that made it fail, so a single `{}` formatting is enough for a log line.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{op}: invalid geometry: {reason}")]
    InvalidGeometry { op: &'static str, reason: String },

    #[error("{op}: unsupported pixel format {format}")]
    UnsupportedFormat { op: &'static str, format: String },

    #[error("{op}: width {width} is not a multiple of {alignment}")]
    AlignmentError {
        op: &'static str,
        width: u32,
        alignment: u32,
    },

    #[error("{op}: failed to allocate {size} bytes: {reason}")]
    AllocationFailure {
        op: &'static str,
        size: usize,
        reason: String,
    },

    #[error("failed to open {}: {source}", path.display())]
    DeviceOpenError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{op}: format negotiation failed: {reason}")]
    FormatNegotiationError { op: &'static str, reason: String },

    #[error("{stage}: buffer strategy failed: {reason}")]
    BufferStrategyFailure { stage: &'static str, reason: String },

    #[error("{op}: capture failed: {source}")]
    CaptureError {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{op}: handle import failed (fd {fd:?}): {reason}")]
    HandleImportError {
        op: &'static str,
        fd: Option<RawFd>,
        reason: String,
    },

    #[error("{op}: not allowed while device is {state:?}")]
    InvalidState { op: &'static str, state: DeviceState },

    #[error("{op}: no frame ready after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("{op}: buffer is borrowed read-only")]
    ReadOnly { op: &'static str },

    #[error("{op}: accelerator reported failure: {reason}")]
    Accelerator { op: &'static str, reason: String },

    #[error("font: {reason}")]
    Font { reason: String },

    #[error(transparent)]
    Codec(#[from] image::ImageError),

    #[error(transparent)]
    Jpeg(#[from] turbojpeg::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn geometry(op: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidGeometry {
            op,
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(op: &'static str, format: impl ToString) -> Self {
        Error::UnsupportedFormat {
            op,
            format: format.to_string(),
        }
    }
}
