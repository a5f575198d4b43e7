// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Video4Linux2 single-planar capture.

use std::{
    ffi::{c_int, c_void},
    fs::{File, OpenOptions},
    io,
    mem::zeroed,
    os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd},
    path::Path,
    time::Duration,
};

use tracing::debug;
use v4l::{
    v4l2::{self, vidioc},
    v4l_sys::{
        v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE, v4l2_buffer, v4l2_capability,
        v4l2_field_V4L2_FIELD_NONE, v4l2_format, v4l2_memory_V4L2_MEMORY_DMABUF,
        v4l2_memory_V4L2_MEMORY_MMAP, v4l2_requestbuffers, V4L2_CAP_DEVICE_CAPS,
        V4L2_CAP_STREAMING, V4L2_CAP_VIDEO_CAPTURE,
    },
};

use super::{
    Capability, Dequeued, DeviceOpener, Memory, NegotiatedFormat, QueueTarget, VideoDevice,
};
use crate::{dma::MappedRegion, format::FourCC};

fn memory_code(memory: Memory) -> u32 {
    match memory {
        Memory::Mmap => v4l2_memory_V4L2_MEMORY_MMAP,
        Memory::DmaBuf => v4l2_memory_V4L2_MEMORY_DMABUF,
    }
}

fn c_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn capture_buffer(index: u32, memory: Memory) -> v4l2_buffer {
    let mut buf: v4l2_buffer = unsafe { zeroed() };
    buf.index = index;
    buf.type_ = v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE;
    buf.memory = memory_code(memory);
    buf
}

/// Opens V4L2 nodes such as `/dev/video0`.
#[derive(Copy, Clone, Debug, Default)]
pub struct V4l2;

impl DeviceOpener for V4l2 {
    type Device = V4l2Device;

    fn open(&self, path: &Path) -> io::Result<V4l2Device> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        debug!("opened {} as fd {}", path.display(), file.as_raw_fd());
        Ok(V4l2Device { file })
    }
}

/// Open V4L2 capture node; closed on drop.
#[derive(Debug)]
pub struct V4l2Device {
    file: File,
}

impl V4l2Device {
    fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    fn ioctl<T>(&self, request: vidioc::_IOC_TYPE, arg: &mut T) -> io::Result<()> {
        unsafe { v4l2::ioctl(self.fd(), request, arg as *mut T as *mut c_void) }
    }

    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let millis = timeout.as_millis().min(c_int::MAX as u128) as c_int;
        loop {
            let ret = unsafe { libc::poll(&mut pfd, 1, millis) };
            if ret >= 0 {
                return Ok(ret > 0);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
}

impl AsFd for V4l2Device {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl VideoDevice for V4l2Device {
    type Mapping = MappedRegion;

    fn query_capability(&mut self) -> io::Result<Capability> {
        let mut cap: v4l2_capability = unsafe { zeroed() };
        self.ioctl(vidioc::VIDIOC_QUERYCAP, &mut cap)?;
        let caps = if cap.capabilities & V4L2_CAP_DEVICE_CAPS != 0 {
            cap.device_caps
        } else {
            cap.capabilities
        };
        Ok(Capability {
            driver: c_str(&cap.driver),
            card: c_str(&cap.card),
            capture: caps & V4L2_CAP_VIDEO_CAPTURE != 0,
            streaming: caps & V4L2_CAP_STREAMING != 0,
        })
    }

    fn set_format(
        &mut self,
        width: u32,
        height: u32,
        fourcc: FourCC,
    ) -> io::Result<NegotiatedFormat> {
        let mut fmt: v4l2_format = unsafe { zeroed() };
        fmt.type_ = v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE;
        unsafe {
            fmt.fmt.pix.width = width;
            fmt.fmt.pix.height = height;
            fmt.fmt.pix.pixelformat = fourcc.into();
            fmt.fmt.pix.field = v4l2_field_V4L2_FIELD_NONE;
        }
        self.ioctl(vidioc::VIDIOC_S_FMT, &mut fmt)?;
        let pix = unsafe { fmt.fmt.pix };
        Ok(NegotiatedFormat {
            width: pix.width,
            height: pix.height,
            fourcc: FourCC::from(pix.pixelformat),
            bytes_per_line: pix.bytesperline,
            size_image: pix.sizeimage,
        })
    }

    fn request_buffers(&mut self, count: u32, memory: Memory) -> io::Result<u32> {
        let mut req: v4l2_requestbuffers = unsafe { zeroed() };
        req.count = count;
        req.type_ = v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE;
        req.memory = memory_code(memory);
        self.ioctl(vidioc::VIDIOC_REQBUFS, &mut req)?;
        debug!("REQBUFS {count} {memory:?}: granted {}", req.count);
        Ok(req.count)
    }

    fn map_buffer(&mut self, index: u32) -> io::Result<MappedRegion> {
        let mut buf = capture_buffer(index, Memory::Mmap);
        self.ioctl(vidioc::VIDIOC_QUERYBUF, &mut buf)?;
        let offset = unsafe { buf.m.offset };
        MappedRegion::map(self.file.as_fd(), buf.length as usize, offset as u64)
    }

    fn queue(&mut self, index: u32, target: QueueTarget<'_>) -> io::Result<()> {
        let mut buf = match target {
            QueueTarget::Mapped => capture_buffer(index, Memory::Mmap),
            QueueTarget::Shared { fd, len } => {
                let mut buf = capture_buffer(index, Memory::DmaBuf);
                buf.m.fd = fd.as_raw_fd();
                buf.length = len as u32;
                buf
            }
        };
        self.ioctl(vidioc::VIDIOC_QBUF, &mut buf)
    }

    fn dequeue(
        &mut self,
        memory: Memory,
        timeout: Option<Duration>,
    ) -> io::Result<Option<Dequeued>> {
        if let Some(timeout) = timeout {
            if !self.wait_readable(timeout)? {
                return Ok(None);
            }
        }
        let mut buf = capture_buffer(0, memory);
        self.ioctl(vidioc::VIDIOC_DQBUF, &mut buf)?;
        Ok(Some(Dequeued {
            index: buf.index,
            bytes_used: buf.bytesused,
            sequence: buf.sequence,
            timestamp: Duration::new(
                buf.timestamp.tv_sec.max(0) as u64,
                (buf.timestamp.tv_usec.max(0) as u32).saturating_mul(1000),
            ),
        }))
    }

    fn stream_on(&mut self) -> io::Result<()> {
        let mut kind = v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE as c_int;
        self.ioctl(vidioc::VIDIOC_STREAMON, &mut kind)
    }

    fn stream_off(&mut self) -> io::Result<()> {
        let mut kind = v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE as c_int;
        self.ioctl(vidioc::VIDIOC_STREAMOFF, &mut kind)
    }
}
