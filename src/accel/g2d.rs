// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    ffi::{c_int, c_void},
    io,
    os::fd::{AsRawFd, BorrowedFd},
    path::PathBuf,
    ptr::{copy_nonoverlapping, null_mut, NonNull},
};

use dma_buf::DmaBuf;
use g2d_sys::{
    g2d as g2d_library, g2d_buf, g2d_format, g2d_format_G2D_BGR888, g2d_format_G2D_NV12,
    g2d_format_G2D_NV21, g2d_format_G2D_RGB888, g2d_format_G2D_RGBA8888, g2d_format_G2D_YUYV,
    g2d_surface, g2d_surface_new, guess_version, G2DPhysical,
};
use tracing::{debug, warn};

use super::{Accelerator, HandleId, SurfaceDesc};
use crate::{
    buffer::Rect,
    error::{Error, Result},
    format::{size_of, PixelFormat},
};

/// First library release whose surfaces carry 64-bit plane addresses.
const G2D_2_3_0: g2d_sys::Version = g2d_sys::Version {
    major: 6,
    minor: 4,
    patch: 11,
    num: 1049711,
};

fn surface_format(format: PixelFormat) -> Option<g2d_format> {
    match format {
        PixelFormat::Rgba8888 => Some(g2d_format_G2D_RGBA8888),
        PixelFormat::Rgb888 => Some(g2d_format_G2D_RGB888),
        PixelFormat::Bgr888 => Some(g2d_format_G2D_BGR888),
        PixelFormat::Nv12 => Some(g2d_format_G2D_NV12),
        PixelFormat::Nv21 => Some(g2d_format_G2D_NV21),
        PixelFormat::Yuyv => Some(g2d_format_G2D_YUYV),
        PixelFormat::Gray8 => None,
    }
}

/// Surface in the layout the loaded library expects.
enum Surface {
    Legacy(g2d_surface),
    New(g2d_surface_new),
}

impl Surface {
    fn as_mut_ptr(&mut self) -> *mut g2d_surface {
        match self {
            Surface::Legacy(s) => s as *mut g2d_surface,
            // g2d_blit and g2d_clear take g2d_surface even on 2.3.
            Surface::New(s) => s as *mut g2d_surface_new as *mut g2d_surface,
        }
    }
}

/// G2D engine settings.
#[derive(Clone, Debug)]
pub struct G2dConfig {
    /// Shared library to load.
    pub library: PathBuf,
    /// Size of the handle pool.
    pub max_handles: usize,
}

impl Default for G2dConfig {
    fn default() -> Self {
        Self {
            library: PathBuf::from("libg2d.so.2"),
            max_handles: 64,
        }
    }
}

struct Registration {
    desc: SurfaceDesc,
    phys: u64,
    staging: Option<NonNull<g2d_buf>>,
}

/// NXP i.MX G2D 2D engine.
///
/// DMA buffers are imported by physical address; host memory is staged
/// through a `g2d_alloc` buffer that is freed when the handle is released.
///
/// # Thread Safety
///
/// `G2d` is **not** thread-safe. Create separate instances for each thread.
pub struct G2d {
    lib: g2d_library,
    version: g2d_sys::Version,
    handle: *mut c_void,
    max_handles: usize,
    registry: RefCell<HashMap<HandleId, Registration>>,
    next: Cell<HandleId>,
}

impl G2d {
    /// Loads `libg2d.so.2` and opens the engine.
    ///
    /// # Errors
    ///
    /// Returns `Accelerator` when the library cannot be loaded or the device
    /// (usually `/dev/galcore`) cannot be opened.
    pub fn new() -> Result<Self> {
        Self::with_config(G2dConfig::default())
    }

    pub fn with_config(config: G2dConfig) -> Result<Self> {
        let lib = unsafe { g2d_library::new(&config.library) }.map_err(|e| {
            Error::Accelerator {
                op: "g2d_open",
                reason: format!("{}: {e}", config.library.display()),
            }
        })?;

        let mut handle: *mut c_void = null_mut();
        if unsafe { lib.g2d_open(&mut handle) } != 0 {
            return Err(Error::Accelerator {
                op: "g2d_open",
                reason: io::Error::last_os_error().to_string(),
            });
        }
        let version = guess_version(&lib).unwrap_or(G2D_2_3_0);
        debug!(
            "G2D {}.{}.{} opened from {}",
            version.major,
            version.minor,
            version.patch,
            config.library.display()
        );
        Ok(Self {
            lib,
            version,
            handle,
            max_handles: config.max_handles,
            registry: RefCell::new(HashMap::new()),
            next: Cell::new(1),
        })
    }

    pub fn version(&self) -> g2d_sys::Version {
        self.version
    }

    fn register(&self, registration: Registration) -> Result<HandleId> {
        let mut registry = self.registry.borrow_mut();
        if registry.len() >= self.max_handles {
            if let Some(buf) = registration.staging {
                unsafe { self.lib.g2d_free(buf.as_ptr()) };
            }
            return Err(Error::HandleImportError {
                op: "g2d_import",
                fd: None,
                reason: format!("handle pool exhausted ({} in use)", registry.len()),
            });
        }
        let id = self.next.get();
        self.next.set(id.wrapping_add(1).max(1));
        registry.insert(id, registration);
        Ok(id)
    }

    fn surface(&self, id: HandleId, area: Rect, color: u32, op: &'static str) -> Result<Surface> {
        let registry = self.registry.borrow();
        let reg = registry.get(&id).ok_or_else(|| Error::Accelerator {
            op,
            reason: format!("unknown handle {id}"),
        })?;
        let desc = reg.desc;
        let format =
            surface_format(desc.format).ok_or_else(|| Error::unsupported(op, desc.format))?;
        let chroma = if desc.format.is_semiplanar() {
            reg.phys + desc.width as u64 * desc.height as u64
        } else {
            0
        };
        let area = area.clamp_to(desc.width, desc.height);
        Ok(if self.version >= G2D_2_3_0 {
            Surface::New(g2d_surface_new {
                planes: [reg.phys as _, chroma as _, 0],
                format,
                left: area.x,
                top: area.y,
                right: area.right(),
                bottom: area.bottom(),
                stride: desc.width as i32,
                width: desc.width as i32,
                height: desc.height as i32,
                blendfunc: 0,
                clrcolor: color as c_int,
                rot: 0,
                global_alpha: 0xff,
            })
        } else {
            Surface::Legacy(g2d_surface {
                planes: [reg.phys as _, chroma as _, 0],
                format,
                left: area.x,
                top: area.y,
                right: area.right(),
                bottom: area.bottom(),
                stride: desc.width as i32,
                width: desc.width as i32,
                height: desc.height as i32,
                blendfunc: 0,
                clrcolor: color as c_int,
                rot: 0,
                global_alpha: 0xff,
            })
        })
    }

    fn check(&self, ret: c_int, op: &'static str) -> Result<()> {
        if ret != 0 {
            return Err(Error::Accelerator {
                op,
                reason: format!("returned {ret}"),
            });
        }
        Ok(())
    }

    fn clear(&self, surface: &mut Surface, op: &'static str) -> Result<()> {
        self.check(
            unsafe { self.lib.g2d_clear(self.handle, surface.as_mut_ptr()) },
            op,
        )
    }

    fn finish(&self) -> Result<()> {
        self.check(unsafe { self.lib.g2d_finish(self.handle) }, "g2d_finish")
    }
}

impl Accelerator for G2d {
    fn name(&self) -> &'static str {
        "g2d"
    }

    fn supports(&self, format: PixelFormat) -> bool {
        surface_format(format).is_some()
    }

    fn import_fd(&self, fd: BorrowedFd<'_>, desc: SurfaceDesc) -> Result<HandleId> {
        const OP: &str = "g2d_import_fd";
        if !self.supports(desc.format) {
            return Err(Error::unsupported(OP, desc.format));
        }
        let import_err = |reason: String| Error::HandleImportError {
            op: OP,
            fd: Some(fd.as_raw_fd()),
            reason,
        };
        let owned = fd.try_clone_to_owned().map_err(|e| import_err(e.to_string()))?;
        let phys: G2DPhysical = DmaBuf::from(owned).into();
        let phys = u64::from(phys);
        if phys == 0 {
            return Err(import_err("no physical address".to_string()));
        }
        self.register(Registration {
            desc,
            phys,
            staging: None,
        })
    }

    fn import_host(&self, data: &[u8], desc: SurfaceDesc) -> Result<HandleId> {
        if !self.supports(desc.format) {
            return Err(Error::unsupported("g2d_import_host", desc.format));
        }
        let len = size_of(desc.format, desc.width, desc.height)?;
        if data.len() < len {
            return Err(Error::HandleImportError {
                op: "g2d_import_host",
                fd: None,
                reason: format!("{} bytes supplied, {len} required", data.len()),
            });
        }
        let buf = NonNull::new(unsafe { self.lib.g2d_alloc(len as c_int, 0) }).ok_or(
            Error::AllocationFailure {
                op: "g2d_alloc",
                size: len,
                reason: "driver returned null".to_string(),
            },
        )?;
        let phys = unsafe {
            let raw = buf.as_ptr();
            copy_nonoverlapping(data.as_ptr(), (*raw).buf_vaddr as *mut u8, len);
            (*raw).buf_paddr as u32 as u64
        };
        self.register(Registration {
            desc,
            phys,
            staging: Some(buf),
        })
    }

    fn release(&self, handle: HandleId) {
        if let Some(reg) = self.registry.borrow_mut().remove(&handle) {
            if let Some(buf) = reg.staging {
                if unsafe { self.lib.g2d_free(buf.as_ptr()) } != 0 {
                    warn!("g2d_free failed for handle {handle}");
                }
            }
        }
    }

    fn fill(&self, dst: HandleId, area: Rect, color: u32) -> Result<()> {
        let mut surface = self.surface(dst, area, color, "g2d_clear")?;
        self.clear(&mut surface, "g2d_clear")?;
        self.finish()
    }

    fn blit(&self, src: HandleId, src_rect: Rect, dst: HandleId, dst_rect: Rect) -> Result<()> {
        let mut from = self.surface(src, src_rect, 0, "g2d_blit")?;
        let mut to = self.surface(dst, dst_rect, 0, "g2d_blit")?;
        self.check(
            unsafe {
                self.lib
                    .g2d_blit(self.handle, from.as_mut_ptr(), to.as_mut_ptr())
            },
            "g2d_blit",
        )?;
        self.finish()
    }

    fn rectangle(&self, dst: HandleId, area: Rect, color: u32, thickness: u32) -> Result<()> {
        let desc = self.registry.borrow().get(&dst).map(|reg| reg.desc);
        let Some(desc) = desc else {
            return Err(Error::Accelerator {
                op: "g2d_rectangle",
                reason: format!("unknown handle {dst}"),
            });
        };
        for edge in area.outline(thickness) {
            if edge.clamp_to(desc.width, desc.height).is_empty() {
                continue;
            }
            let mut surface = self.surface(dst, edge, color, "g2d_rectangle")?;
            self.clear(&mut surface, "g2d_rectangle")?;
        }
        self.finish()
    }

    fn read_back(&self, handle: HandleId, out: &mut [u8]) -> Result<()> {
        let registry = self.registry.borrow();
        let reg = registry.get(&handle).ok_or_else(|| Error::Accelerator {
            op: "g2d_read_back",
            reason: format!("unknown handle {handle}"),
        })?;
        if let Some(buf) = reg.staging {
            let len = size_of(reg.desc.format, reg.desc.width, reg.desc.height)?.min(out.len());
            unsafe {
                copy_nonoverlapping((*buf.as_ptr()).buf_vaddr as *const u8, out.as_mut_ptr(), len);
            }
        }
        Ok(())
    }

    fn outstanding(&self) -> usize {
        self.registry.borrow().len()
    }
}

impl Drop for G2d {
    fn drop(&mut self) {
        let handles: Vec<HandleId> = self.registry.borrow().keys().copied().collect();
        if !handles.is_empty() {
            warn!("G2D closing with {} handles still registered", handles.len());
        }
        for handle in handles {
            self.release(handle);
        }
        _ = unsafe { self.lib.g2d_close(self.handle) };
        debug!("G2D closed");
    }
}
