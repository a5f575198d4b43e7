// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Camera frame acquisition.
//!
//! [`CaptureDevice`] owns the device handle and a fixed pool of buffer
//! slots. Slots are backed either by DMA buffers shared with the 2D engine
//! or by kernel buffers mapped into the process, never a mix of both. A slot
//! belongs to the kernel until [`CaptureDevice::acquire_frame`] hands it to
//! the application as a [`CapturedFrame`] token, and goes back when the
//! token is passed to [`CaptureDevice::release_frame`]. A slot the kernel
//! refused to take back waits as [`Ownership::Returning`] and is queued again
//! by the next acquire.

use std::{
    fmt, io,
    os::fd::{AsFd, AsRawFd, BorrowedFd},
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::{debug, info, warn};

use crate::{
    buffer::{HostMemory, PixelBuffer},
    dma::{DmaAllocator, DmaRegion},
    error::{Error, Result},
    format::{self, size_of, FourCC, PixelFormat},
};

pub mod v4l2;

pub use v4l2::{V4l2, V4l2Device};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeviceState {
    Closed,
    Configured,
    Streaming,
}

/// How the slot pool is backed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Kernel allocated buffers mapped into the process.
    KernelMapped,
    /// DMA buffers allocated by the application and lent to the kernel,
    /// usable by the 2D engine without a copy.
    AcceleratorShared,
}

impl Strategy {
    pub fn memory(self) -> Memory {
        match self {
            Strategy::KernelMapped => Memory::Mmap,
            Strategy::AcceleratorShared => Memory::DmaBuf,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Ownership {
    WithKernel,
    WithApplication,
    /// Released by the application but not yet accepted back by the kernel.
    Returning,
}

/// Buffer memory type as the kernel sees it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Memory {
    Mmap,
    DmaBuf,
}

/// Buffer handed to [`VideoDevice::queue`].
#[derive(Copy, Clone, Debug)]
pub enum QueueTarget<'a> {
    Mapped,
    /// The descriptor must be supplied on every queue, not just the first.
    Shared { fd: BorrowedFd<'a>, len: usize },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Capability {
    pub driver: String,
    pub card: String,
    pub capture: bool,
    pub streaming: bool,
}

impl Capability {
    /// Whether the device can stream into application supplied buffers.
    pub fn supports_shared(&self) -> bool {
        self.capture && self.streaming
    }
}

/// Format the driver agreed to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NegotiatedFormat {
    pub width: u32,
    pub height: u32,
    pub fourcc: FourCC,
    pub bytes_per_line: u32,
    /// Bytes per frame as reported by the driver, zero if unknown.
    pub size_image: u32,
}

/// Filled buffer returned by [`VideoDevice::dequeue`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Dequeued {
    pub index: u32,
    pub bytes_used: u32,
    pub sequence: u32,
    pub timestamp: Duration,
}

/// Kernel capture primitives.
pub trait VideoDevice {
    /// Host mapping of a kernel allocated buffer.
    type Mapping: AsRef<[u8]>;

    fn query_capability(&mut self) -> io::Result<Capability>;

    fn set_format(&mut self, width: u32, height: u32, fourcc: FourCC)
        -> io::Result<NegotiatedFormat>;

    /// Requests `count` buffers, returning how many the driver granted.
    /// Zero releases the pool.
    fn request_buffers(&mut self, count: u32, memory: Memory) -> io::Result<u32>;

    fn map_buffer(&mut self, index: u32) -> io::Result<Self::Mapping>;

    fn queue(&mut self, index: u32, target: QueueTarget<'_>) -> io::Result<()>;

    /// Waits for a filled buffer. `Ok(None)` when `timeout` expired first.
    fn dequeue(&mut self, memory: Memory, timeout: Option<Duration>)
        -> io::Result<Option<Dequeued>>;

    fn stream_on(&mut self) -> io::Result<()>;

    fn stream_off(&mut self) -> io::Result<()>;
}

/// Opens capture devices by path.
pub trait DeviceOpener {
    type Device: VideoDevice;

    fn open(&self, path: &Path) -> io::Result<Self::Device>;
}

/// Capture settings.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Slots requested from the driver.
    pub slots: u32,
    /// Pixel format requested from the driver.
    pub fourcc: FourCC,
    /// Upper bound on [`CaptureDevice::acquire_frame`], `None` blocks.
    pub timeout: Option<Duration>,
    /// Try the shared DMA strategy before kernel mapped buffers.
    pub prefer_shared: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            slots: 4,
            fourcc: format::YUYV,
            timeout: None,
            prefer_shared: true,
        }
    }
}

/// Proof that the application holds a slot.
///
/// Not clonable: releasing consumes it, so a slot cannot be returned twice.
#[derive(Debug)]
#[must_use = "frames must be returned with release_frame"]
pub struct CapturedFrame {
    index: u32,
    bytes_used: u32,
    sequence: u32,
    timestamp: Duration,
    generation: u64,
}

impl CapturedFrame {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn bytes_used(&self) -> u32 {
        self.bytes_used
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Driver timestamp of the frame.
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }
}

impl fmt::Display for CapturedFrame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "slot {} seq {} {} bytes",
            self.index, self.sequence, self.bytes_used
        )
    }
}

enum SlotBuffer<M, B> {
    Mapped(M),
    Shared(B),
}

struct Slot<M, B> {
    buffer: SlotBuffer<M, B>,
    ownership: Ownership,
}

type SlotOf<O, A> =
    Slot<<<O as DeviceOpener>::Device as VideoDevice>::Mapping, <A as DmaAllocator>::Buffer>;

/// Capture device and its slot pool.
///
/// ```text
/// Closed --open--> Configured --allocate_buffers--> Configured
///        --stream_on--> Streaming --close--> Closed
/// ```
pub struct CaptureDevice<O: DeviceOpener, A: DmaAllocator> {
    opener: O,
    allocator: A,
    config: CaptureConfig,
    state: DeviceState,
    path: Option<PathBuf>,
    device: Option<O::Device>,
    capability: Option<Capability>,
    format: Option<NegotiatedFormat>,
    pixel_format: Option<PixelFormat>,
    strategy: Option<Strategy>,
    slots: Vec<SlotOf<O, A>>,
    generation: u64,
}

impl<O: DeviceOpener, A: DmaAllocator> CaptureDevice<O, A> {
    pub fn new(opener: O, allocator: A, config: CaptureConfig) -> Self {
        Self {
            opener,
            allocator,
            config,
            state: DeviceState::Closed,
            path: None,
            device: None,
            capability: None,
            format: None,
            pixel_format: None,
            strategy: None,
            slots: Vec::new(),
            generation: 0,
        }
    }

    fn require(&self, op: &'static str, state: DeviceState) -> Result<()> {
        if self.state != state {
            return Err(Error::InvalidState {
                op,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Opens `path` and negotiates a `width` x `height` capture format.
    ///
    /// # Errors
    ///
    /// `DeviceOpenError` when the node cannot be opened or queried,
    /// `FormatNegotiationError` when it is not a capture device or rejects
    /// the configured pixel format. The device is closed again on failure.
    pub fn open(&mut self, path: impl AsRef<Path>, width: u32, height: u32) -> Result<()> {
        const OP: &str = "open";
        self.require(OP, DeviceState::Closed)?;
        let path = path.as_ref();
        let open_err = |source| Error::DeviceOpenError {
            path: path.to_path_buf(),
            source,
        };

        let mut device = self.opener.open(path).map_err(open_err)?;
        let capability = device.query_capability().map_err(open_err)?;
        if !capability.capture {
            return Err(Error::FormatNegotiationError {
                op: OP,
                reason: format!("{} ({}) cannot capture video", path.display(), capability.card),
            });
        }

        let fourcc = self.config.fourcc;
        let format = device
            .set_format(width, height, fourcc)
            .map_err(|e| Error::FormatNegotiationError {
                op: OP,
                reason: format!("{width}x{height} {fourcc}: {e}"),
            })?;
        if format.fourcc != fourcc {
            return Err(Error::FormatNegotiationError {
                op: OP,
                reason: format!("requested {fourcc}, driver chose {}", format.fourcc),
            });
        }
        let pixel_format =
            PixelFormat::try_from(format.fourcc).map_err(|e| Error::FormatNegotiationError {
                op: OP,
                reason: e.to_string(),
            })?;
        if (format.width, format.height) != (width, height) {
            warn!(
                "{} adjusted {width}x{height} to {}x{}",
                path.display(),
                format.width,
                format.height
            );
        }
        size_of(pixel_format, format.width, format.height).map_err(|e| {
            Error::FormatNegotiationError {
                op: OP,
                reason: e.to_string(),
            }
        })?;

        info!(
            "opened {} ({}, {}) at {}x{} {}",
            path.display(),
            capability.driver,
            capability.card,
            format.width,
            format.height,
            format.fourcc
        );
        self.device = Some(device);
        self.path = Some(path.to_path_buf());
        self.capability = Some(capability);
        self.format = Some(format);
        self.pixel_format = Some(pixel_format);
        self.generation += 1;
        self.state = DeviceState::Configured;
        Ok(())
    }

    /// Bytes each shared slot must hold.
    fn frame_size(&self) -> Result<usize> {
        let (Some(format), Some(pixel_format)) = (self.format, self.pixel_format) else {
            return Err(Error::InvalidState {
                op: "frame_size",
                state: self.state,
            });
        };
        let derived = size_of(pixel_format, format.width, format.height)?;
        Ok(derived.max(format.size_image as usize))
    }

    /// Binds the slot pool, preferring shared DMA buffers.
    ///
    /// A failed shared attempt is rolled back completely before the kernel
    /// mapped strategy is tried. If that fails too the device is closed.
    pub fn allocate_buffers(&mut self) -> Result<Strategy> {
        const OP: &str = "allocate_buffers";
        self.require(OP, DeviceState::Configured)?;
        if !self.slots.is_empty() {
            return Err(Error::InvalidState {
                op: OP,
                state: self.state,
            });
        }
        let frame_size = self.frame_size()?;
        let count = self.config.slots.max(1);
        let shared = self.config.prefer_shared
            && self
                .capability
                .as_ref()
                .is_some_and(Capability::supports_shared);
        let Some(device) = self.device.as_mut() else {
            return Err(Error::InvalidState {
                op: OP,
                state: self.state,
            });
        };

        if shared {
            match bind_shared(device, &self.allocator, count, frame_size) {
                Ok(slots) => {
                    info!("capture pool: {} shared dma buffers", slots.len());
                    self.slots = slots;
                    self.strategy = Some(Strategy::AcceleratorShared);
                    return Ok(Strategy::AcceleratorShared);
                }
                Err(e) => {
                    warn!("shared buffers unavailable, using kernel mapped buffers: {e}");
                    if let Err(e) = device.request_buffers(0, Memory::DmaBuf) {
                        debug!("release of shared pool: {e}");
                    }
                }
            }
        } else {
            debug!("shared buffers not attempted");
        }

        match bind_mapped(device, count) {
            Ok(slots) => {
                info!("capture pool: {} kernel mapped buffers", slots.len());
                self.slots = slots;
                self.strategy = Some(Strategy::KernelMapped);
                Ok(Strategy::KernelMapped)
            }
            Err(e) => {
                if let Err(e) = device.request_buffers(0, Memory::Mmap) {
                    debug!("release of mapped pool: {e}");
                }
                self.close();
                Err(e)
            }
        }
    }

    /// Starts the stream. The device is closed if the driver refuses.
    pub fn stream_on(&mut self) -> Result<()> {
        const OP: &str = "stream_on";
        self.require(OP, DeviceState::Configured)?;
        if self.slots.is_empty() {
            return Err(Error::BufferStrategyFailure {
                stage: OP,
                reason: "no buffers bound".to_string(),
            });
        }
        let res = match self.device.as_mut() {
            Some(device) => device.stream_on(),
            None => Err(io::Error::from(io::ErrorKind::NotConnected)),
        };
        if let Err(source) = res {
            self.close();
            return Err(Error::CaptureError { op: OP, source });
        }
        self.state = DeviceState::Streaming;
        debug!("streaming with {} slots", self.slots.len());
        Ok(())
    }

    /// Queues slots whose earlier release the kernel refused.
    fn requeue_returning(&mut self) {
        let Some(device) = self.device.as_mut() else {
            return;
        };
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.ownership != Ownership::Returning {
                continue;
            }
            match requeue(device, index as u32, slot) {
                Ok(()) => debug!("slot {index} returned to the driver"),
                Err(e) => warn!("slot {index} still not accepted: {e}"),
            }
        }
    }

    /// Takes the next filled slot from the kernel.
    ///
    /// Blocks until a frame is ready, or up to the configured timeout.
    ///
    /// # Errors
    ///
    /// `CaptureError` when the driver fails or the buffer cannot be made
    /// visible to the CPU; in the latter case the slot is handed back to the
    /// driver and no frame is held.
    pub fn acquire_frame(&mut self) -> Result<CapturedFrame> {
        const OP: &str = "acquire_frame";
        self.require(OP, DeviceState::Streaming)?;
        self.requeue_returning();
        let Some(memory) = self.strategy.map(Strategy::memory) else {
            return Err(Error::InvalidState {
                op: OP,
                state: self.state,
            });
        };
        let Some(device) = self.device.as_mut() else {
            return Err(Error::InvalidState {
                op: OP,
                state: self.state,
            });
        };
        let dequeued = device
            .dequeue(memory, self.config.timeout)
            .map_err(|source| Error::CaptureError { op: OP, source })?;
        let Some(dequeued) = dequeued else {
            return Err(Error::Timeout {
                op: OP,
                after: self.config.timeout.unwrap_or_default(),
            });
        };

        let slot = match self.slots.get_mut(dequeued.index as usize) {
            Some(slot) if slot.ownership == Ownership::WithKernel => slot,
            _ => {
                return Err(Error::CaptureError {
                    op: OP,
                    source: io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("driver returned slot {} which it does not own", dequeued.index),
                    ),
                })
            }
        };
        slot.ownership = Ownership::WithApplication;
        if let SlotBuffer::Shared(buf) = &slot.buffer {
            if let Err(e) = buf.cpu_access_begin() {
                slot.ownership = Ownership::Returning;
                if let Err(e) = requeue(device, dequeued.index, slot) {
                    warn!("slot {} not returned after failed sync: {e}", dequeued.index);
                }
                return Err(sync_error(OP, dequeued.index, e));
            }
        }
        Ok(CapturedFrame {
            index: dequeued.index,
            bytes_used: dequeued.bytes_used,
            sequence: dequeued.sequence,
            timestamp: dequeued.timestamp,
            generation: self.generation,
        })
    }

    fn held_slot(&self, frame: &CapturedFrame, op: &'static str) -> Result<&SlotOf<O, A>> {
        if frame.generation != self.generation || self.state != DeviceState::Streaming {
            return Err(Error::InvalidState {
                op,
                state: self.state,
            });
        }
        match self.slots.get(frame.index as usize) {
            Some(slot) if slot.ownership == Ownership::WithApplication => Ok(slot),
            _ => Err(Error::InvalidState {
                op,
                state: self.state,
            }),
        }
    }

    /// Pixel view of a held frame.
    ///
    /// The buffer borrows the device, so the frame cannot be released while
    /// it is still being read.
    pub fn frame_buffer(&self, frame: &CapturedFrame) -> Result<PixelBuffer<'_>> {
        const OP: &str = "frame_buffer";
        let slot = self.held_slot(frame, OP)?;
        let (Some(format), Some(pixel_format)) = (self.format, self.pixel_format) else {
            return Err(Error::InvalidState {
                op: OP,
                state: self.state,
            });
        };
        match &slot.buffer {
            SlotBuffer::Shared(buf) => PixelBuffer::from_device(
                format.width,
                format.height,
                pixel_format,
                buf.as_fd(),
                Some(HostMemory::Shared(buf.as_slice())),
            ),
            SlotBuffer::Mapped(map) => {
                PixelBuffer::from_slice(format.width, format.height, pixel_format, map.as_ref())
            }
        }
    }

    /// Returns a held frame to the kernel.
    ///
    /// The frame is given up even when this fails: a slot the driver
    /// refuses is kept as [`Ownership::Returning`] and queued again by the
    /// next [`CaptureDevice::acquire_frame`].
    ///
    /// # Errors
    ///
    /// `InvalidState` for a frame this device does not hold, `CaptureError`
    /// when the CPU cache sync or the queue ioctl fails.
    pub fn release_frame(&mut self, frame: CapturedFrame) -> Result<()> {
        const OP: &str = "release_frame";
        self.held_slot(&frame, OP)?;
        let index = frame.index as usize;
        let (Some(device), Some(slot)) = (self.device.as_mut(), self.slots.get_mut(index)) else {
            return Err(Error::InvalidState {
                op: OP,
                state: self.state,
            });
        };
        let synced = match &mut slot.buffer {
            SlotBuffer::Shared(buf) => buf.cpu_access_end(),
            SlotBuffer::Mapped(_) => Ok(()),
        };
        slot.ownership = Ownership::Returning;
        requeue(device, frame.index, slot)
            .map_err(|source| Error::CaptureError { op: OP, source })?;
        synced.map_err(|e| sync_error(OP, frame.index, e))
    }

    /// Stops streaming, releases the slot pool and closes the device.
    ///
    /// Safe to call in any state, any number of times.
    pub fn close(&mut self) {
        if let Some(device) = self.device.as_mut() {
            if self.state == DeviceState::Streaming {
                if let Err(e) = device.stream_off() {
                    warn!("stream off: {e}");
                }
            }
            let slots = self.slots.len();
            self.slots.clear();
            if let Some(strategy) = self.strategy.take() {
                if let Err(e) = device.request_buffers(0, strategy.memory()) {
                    debug!("release of {strategy:?} pool: {e}");
                }
            }
            if let Some(path) = &self.path {
                info!("closed {} ({slots} slots released)", path.display());
            }
        }
        self.slots.clear();
        self.strategy = None;
        self.device = None;
        self.capability = None;
        self.format = None;
        self.pixel_format = None;
        self.path = None;
        self.state = DeviceState::Closed;
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn strategy(&self) -> Option<Strategy> {
        self.strategy
    }

    pub fn capability(&self) -> Option<&Capability> {
        self.capability.as_ref()
    }

    pub fn format(&self) -> Option<NegotiatedFormat> {
        self.format
    }

    pub fn pixel_format(&self) -> Option<PixelFormat> {
        self.pixel_format
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn ownership(&self, index: u32) -> Option<Ownership> {
        self.slots.get(index as usize).map(|slot| slot.ownership)
    }

    /// Slots currently held by the application.
    pub fn frames_held(&self) -> usize {
        self.count(Ownership::WithApplication)
    }

    /// Released slots still waiting to be queued again.
    pub fn frames_returning(&self) -> usize {
        self.count(Ownership::Returning)
    }

    fn count(&self, ownership: Ownership) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.ownership == ownership)
            .count()
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }
}

impl<O: DeviceOpener, A: DmaAllocator> Drop for CaptureDevice<O, A> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Hands a slot back to the driver, supplying the descriptor again for
/// shared buffers.
fn requeue<D: VideoDevice, B: DmaRegion>(
    device: &mut D,
    index: u32,
    slot: &mut Slot<D::Mapping, B>,
) -> io::Result<()> {
    match &slot.buffer {
        SlotBuffer::Shared(buf) => device.queue(
            index,
            QueueTarget::Shared {
                fd: buf.as_fd(),
                len: buf.len(),
            },
        ),
        SlotBuffer::Mapped(_) => device.queue(index, QueueTarget::Mapped),
    }?;
    slot.ownership = Ownership::WithKernel;
    Ok(())
}

fn sync_error(op: &'static str, index: u32, e: Error) -> Error {
    Error::CaptureError {
        op,
        source: io::Error::other(format!("slot {index} cache sync: {e}")),
    }
}

/// Allocates and queues one DMA buffer per granted slot. Everything already
/// acquired is dropped on error.
fn bind_shared<D: VideoDevice, A: DmaAllocator>(
    device: &mut D,
    allocator: &A,
    count: u32,
    frame_size: usize,
) -> Result<Vec<Slot<D::Mapping, A::Buffer>>> {
    let failure = |stage: &'static str, reason: String| Error::BufferStrategyFailure {
        stage,
        reason,
    };
    let granted = device
        .request_buffers(count, Memory::DmaBuf)
        .map_err(|e| failure("request_shared", e.to_string()))?;
    if granted == 0 {
        return Err(failure("request_shared", "driver granted no buffers".to_string()));
    }
    let mut slots = Vec::with_capacity(granted as usize);
    for index in 0..granted {
        let buf = allocator
            .allocate(frame_size)
            .map_err(|e| failure("allocate_shared", e.to_string()))?;
        device
            .queue(
                index,
                QueueTarget::Shared {
                    fd: buf.as_fd(),
                    len: buf.len(),
                },
            )
            .map_err(|e| {
                failure(
                    "queue_shared",
                    format!("slot {index} fd {}: {e}", buf.as_fd().as_raw_fd()),
                )
            })?;
        slots.push(Slot {
            buffer: SlotBuffer::Shared(buf),
            ownership: Ownership::WithKernel,
        });
    }
    Ok(slots)
}

/// Maps and queues every kernel buffer.
fn bind_mapped<D: VideoDevice, B>(device: &mut D, count: u32) -> Result<Vec<Slot<D::Mapping, B>>> {
    let failure = |stage: &'static str, reason: String| Error::BufferStrategyFailure {
        stage,
        reason,
    };
    let granted = device
        .request_buffers(count, Memory::Mmap)
        .map_err(|e| failure("request_mapped", e.to_string()))?;
    if granted == 0 {
        return Err(failure("request_mapped", "driver granted no buffers".to_string()));
    }
    let mut slots = Vec::with_capacity(granted as usize);
    for index in 0..granted {
        let map = device
            .map_buffer(index)
            .map_err(|e| failure("map", format!("slot {index}: {e}")))?;
        device
            .queue(index, QueueTarget::Mapped)
            .map_err(|e| failure("queue_mapped", format!("slot {index}: {e}")))?;
        slots.push(Slot {
            buffer: SlotBuffer::Mapped(map),
            ownership: Ownership::WithKernel,
        });
    }
    Ok(slots)
}
