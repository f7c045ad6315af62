//! X11 screen capture via XShm (falling back to plain `GetImage`).
//!
//! A single full-frame grab per tick — this bridge has no
//! change-detection transport, so there is no reason to hash/compare
//! stripes against the previous frame.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use x11rb::connection::Connection;
use x11rb::protocol::shm;
use x11rb::protocol::xproto::*;
use x11rb::xcb_ffi::XCBConnection;

use super::frame::{Frame, FrameStats};
use crate::error::{BridgeError, Result};

/// Capture backend contract. `X11Capturer` is the production
/// implementation; tests substitute a fixed-size in-memory fake so the
/// pacing/encode pipeline can be exercised without a real X server.
pub trait ScreenCapturer: Send {
    fn capture(&mut self) -> Result<Frame>;
    fn dimensions(&self) -> (u32, u32);
    fn stats(&self) -> FrameStats;
}

const BYTE_ORDER_LSB_FIRST: u8 = 0;

pub struct X11Capturer {
    conn: Arc<XCBConnection>,
    root: Window,
    width: u32,
    height: u32,
    depth: u8,
    byte_order: u8,
    bytes_per_pixel: usize,
    bytes_per_line: usize,
    use_shm: bool,
    shmseg: u32,
    shmid: i32,
    shmaddr: *mut u8,
    shm_size: usize,
    sequence: AtomicU64,
    stats: Mutex<FrameStats>,
}

unsafe impl Send for X11Capturer {}

impl X11Capturer {
    pub fn new(conn: Arc<XCBConnection>, screen_num: i32) -> Result<Self> {
        let screen = &conn.setup().roots[screen_num as usize];
        let root = screen.root;
        let width = screen.width_in_pixels as u32;
        let height = screen.height_in_pixels as u32;
        let depth = screen.root_depth;
        let byte_order = u8::from(conn.setup().image_byte_order);
        let (bytes_per_pixel, bytes_per_line) = compute_format(conn.as_ref(), width, depth);

        let mut capturer = Self {
            conn,
            root,
            width,
            height,
            depth,
            byte_order,
            bytes_per_pixel,
            bytes_per_line,
            use_shm: false,
            shmseg: 0,
            shmid: -1,
            shmaddr: std::ptr::null_mut(),
            shm_size: 0,
            sequence: AtomicU64::new(0),
            stats: Mutex::new(FrameStats::default()),
        };

        capturer.try_init_shm();
        Ok(capturer)
    }

    fn try_init_shm(&mut self) {
        let Ok(query) = shm::query_version(self.conn.as_ref()) else {
            log::debug!("XShm not available, falling back to GetImage");
            return;
        };
        if query.reply().is_err() {
            log::debug!("XShm not available, falling back to GetImage");
            return;
        }

        let Ok(shmseg) = self.conn.generate_id() else {
            return;
        };

        let size = self.bytes_per_line * self.height as usize;
        let shmid = unsafe { libc::shmget(libc::IPC_PRIVATE, size, libc::IPC_CREAT | 0o600) };
        if shmid < 0 {
            return;
        }

        let shmaddr = unsafe { libc::shmat(shmid, std::ptr::null(), 0) };
        if shmaddr as isize == -1 {
            unsafe {
                libc::shmctl(shmid, libc::IPC_RMID, std::ptr::null_mut());
            }
            return;
        }

        if shm::attach(self.conn.as_ref(), shmseg, shmid as u32, false).is_err() {
            unsafe {
                libc::shmdt(shmaddr);
                libc::shmctl(shmid, libc::IPC_RMID, std::ptr::null_mut());
            }
            return;
        }
        let _ = self.conn.flush();

        self.use_shm = true;
        self.shmseg = shmseg;
        self.shmid = shmid;
        self.shmaddr = shmaddr as *mut u8;
        self.shm_size = size;
        log::debug!("using XShm capture path");
    }

    /// Re-queries the root window's live geometry and, if it has changed
    /// since the last capture, updates the pixel format and reallocates
    /// the XShm segment for the new size. Called at the top of every
    /// `capture()` so a resize on the host is observed within one tick
    /// instead of only at construction time.
    fn refresh_geometry(&mut self) -> Result<()> {
        let geometry = self
            .conn
            .get_geometry(self.root)
            .map_err(|e| BridgeError::Capture(e.to_string()))?
            .reply()
            .map_err(|e| BridgeError::Capture(e.to_string()))?;
        let width = geometry.width as u32;
        let height = geometry.height as u32;
        if width == self.width && height == self.height {
            return Ok(());
        }
        log::info!(
            "display resolution changed: {}x{} -> {}x{}",
            self.width,
            self.height,
            width,
            height
        );
        self.teardown_shm();
        self.width = width;
        self.height = height;
        let (bytes_per_pixel, bytes_per_line) = compute_format(self.conn.as_ref(), width, self.depth);
        self.bytes_per_pixel = bytes_per_pixel;
        self.bytes_per_line = bytes_per_line;
        self.try_init_shm();
        Ok(())
    }

    /// Detaches and frees the XShm segment, if any, and resets the shm
    /// fields so `try_init_shm` can allocate a fresh one. Shared by
    /// `refresh_geometry` (resize) and `Drop` (teardown).
    fn teardown_shm(&mut self) {
        if self.use_shm && !self.shmaddr.is_null() {
            unsafe {
                let _ = shm::detach(self.conn.as_ref(), self.shmseg);
                libc::shmdt(self.shmaddr as *mut _);
                libc::shmctl(self.shmid, libc::IPC_RMID, std::ptr::null_mut());
            }
        }
        self.use_shm = false;
        self.shmseg = 0;
        self.shmid = -1;
        self.shmaddr = std::ptr::null_mut();
        self.shm_size = 0;
    }

    fn effective_height(&self, data_len: usize) -> u32 {
        let max_rows = data_len / self.bytes_per_line;
        (max_rows.min(self.height as usize)) as u32
    }

    fn convert_raw_to_rgb(&self, src: &[u8], height: u32) -> Vec<u8> {
        let mut dst = Vec::with_capacity((self.width * height * 3) as usize);
        match self.depth {
            24 | 32 => {
                for y in 0..height {
                    for x in 0..self.width {
                        let offset =
                            (y as usize * self.bytes_per_line) + (x as usize * self.bytes_per_pixel);
                        if offset + 3 <= src.len() {
                            let (r, g, b) = if self.byte_order == BYTE_ORDER_LSB_FIRST {
                                (src[offset + 2], src[offset + 1], src[offset])
                            } else {
                                (src[offset], src[offset + 1], src[offset + 2])
                            };
                            dst.push(r);
                            dst.push(g);
                            dst.push(b);
                        }
                    }
                }
            }
            16 => {
                for y in 0..height {
                    for x in 0..self.width {
                        let offset =
                            (y as usize * self.bytes_per_line) + (x as usize * self.bytes_per_pixel);
                        if offset + 2 <= src.len() {
                            let pixel = u16::from_le_bytes([src[offset], src[offset + 1]]);
                            let r = ((pixel >> 11) & 0x1F) as u8;
                            let g = ((pixel >> 5) & 0x3F) as u8;
                            let b = (pixel & 0x1F) as u8;
                            dst.push(r << 3);
                            dst.push(g << 2);
                            dst.push(b << 3);
                        }
                    }
                }
            }
            _ => {
                let step = self.bytes_per_pixel.max(1);
                for byte in src.iter().step_by(step) {
                    dst.push(*byte);
                    dst.push(*byte);
                    dst.push(*byte);
                }
            }
        }
        dst
    }
}

impl ScreenCapturer for X11Capturer {
    fn capture(&mut self) -> Result<Frame> {
        self.refresh_geometry()?;
        let start = std::time::Instant::now();

        let data = if self.use_shm {
            let format = u8::from(ImageFormat::Z_PIXMAP);
            let cookie = shm::get_image(
                self.conn.as_ref(),
                self.root,
                0,
                0,
                self.width as u16,
                self.height as u16,
                u32::MAX,
                format,
                self.shmseg,
                0,
            )
            .map_err(|e| BridgeError::Capture(e.to_string()))?;
            cookie
                .reply()
                .map_err(|e| BridgeError::Capture(e.to_string()))?;
            let src = unsafe { std::slice::from_raw_parts(self.shmaddr, self.shm_size) };
            let effective_height = self.effective_height(src.len());
            self.convert_raw_to_rgb(src, effective_height)
        } else {
            let image = self
                .conn
                .get_image(
                    ImageFormat::Z_PIXMAP,
                    self.root,
                    0,
                    0,
                    self.width as u16,
                    self.height as u16,
                    u32::MAX,
                )
                .map_err(|e| BridgeError::Capture(e.to_string()))?
                .reply()
                .map_err(|e| BridgeError::Capture(e.to_string()))?;
            let effective_height = self.effective_height(image.data.len());
            self.convert_raw_to_rgb(&image.data, effective_height)
        };

        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let capture_time_us = start.elapsed().as_micros() as u64;
        self.stats.lock().unwrap().record_capture(data.len(), capture_time_us);

        let height = (data.len() / (self.width as usize * 3)).min(self.height as usize) as u32;
        Ok(Frame {
            width: self.width,
            height,
            data,
            timestamp: start,
            sequence: seq,
        })
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn stats(&self) -> FrameStats {
        *self.stats.lock().unwrap()
    }
}

impl Drop for X11Capturer {
    fn drop(&mut self) {
        self.teardown_shm();
    }
}

fn compute_format(conn: &XCBConnection, width: u32, depth: u8) -> (usize, usize) {
    let mut bytes_per_pixel = 4usize;
    let mut bytes_per_line = width as usize * bytes_per_pixel;
    for format in &conn.setup().pixmap_formats {
        if format.depth == depth {
            let bpp = format.bits_per_pixel as usize;
            let pad = format.scanline_pad as usize;
            bytes_per_pixel = (bpp / 8).max(1);
            let bits_per_line = width as usize * bpp;
            let padded_bits = bits_per_line.div_ceil(pad) * pad;
            bytes_per_line = padded_bits / 8;
            return (bytes_per_pixel, bytes_per_line);
        }
    }
    (bytes_per_pixel, bytes_per_line)
}
