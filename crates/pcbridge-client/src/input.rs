//! Input channel writer with client-side motion coalescing (spec.md
//! §4.6): `send_mouse_move` only records the latest coordinate; a
//! dedicated flusher thread wakes at a bounded rate and emits one
//! envelope per dirty transition. Clicks, scroll and key events drain
//! any pending motion first, under the same lock that guards the
//! flusher's own drain, so a move recorded before a press is always
//! written to the wire before that press (spec.md §8: motion coalescing
//! never reorders a motion across an intervening press/release/scroll).

use std::io::{BufWriter, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use pcbridge_core::error::Result;
use pcbridge_core::protocol::input::{InputEvent, MouseButton};
use pcbridge_core::protocol::write_envelope;

/// 500 Hz ceiling: PC mice report at 125-165 Hz, so this is generous
/// headroom without flooding the socket on a fast UI loop.
const FLUSH_INTERVAL: Duration = Duration::from_millis(2);

struct MotionSlot {
    pending: Option<(i32, i32)>,
}

pub struct InputWriter {
    writer: Mutex<BufWriter<TcpStream>>,
    motion: Mutex<MotionSlot>,
    stopped: Arc<AtomicBool>,
}

impl InputWriter {
    pub fn new(stream: TcpStream, stopped: Arc<AtomicBool>) -> Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(stream)),
            motion: Mutex::new(MotionSlot { pending: None }),
            stopped,
        })
    }

    /// Records the latest pointer position; does not write to the socket.
    /// The flusher thread picks this up on its next tick.
    pub fn send_mouse_move(&self, x: i32, y: i32) {
        self.motion.lock().pending = Some((x, y));
    }

    pub fn send_mouse_press(&self, button: MouseButton) -> Result<()> {
        self.write_draining_motion(&InputEvent::MousePress { button })
    }

    pub fn send_mouse_release(&self, button: MouseButton) -> Result<()> {
        self.write_draining_motion(&InputEvent::MouseRelease { button })
    }

    pub fn send_mouse_scroll(&self, dx: i32, dy: i32) -> Result<()> {
        self.write_draining_motion(&InputEvent::MouseScroll { dx, dy })
    }

    pub fn send_key_press(&self, key: impl Into<String>) -> Result<()> {
        self.write_draining_motion(&InputEvent::KeyPress { key: key.into() })
    }

    pub fn send_key_release(&self, key: impl Into<String>) -> Result<()> {
        self.write_draining_motion(&InputEvent::KeyRelease { key: key.into() })
    }

    /// Holds `motion` for the whole drain-then-write so it serializes
    /// against the flusher's own drain (same lock order: motion, then
    /// writer): whichever side gets there first, a pending move is
    /// always on the wire before the event that follows it here.
    fn write_draining_motion(&self, event: &InputEvent) -> Result<()> {
        let mut motion = self.motion.lock();
        let pending = motion.pending.take();
        let mut writer = self.writer.lock();
        if let Some((x, y)) = pending {
            write_envelope(&mut *writer, &InputEvent::MouseMove { x, y })?;
        }
        write_envelope(&mut *writer, event)
    }

    /// Runs the coalescing flusher to completion; intended to be spawned
    /// on its own thread for the lifetime of one connected session.
    pub fn run_flusher(&self) {
        while !self.stopped.load(Ordering::SeqCst) {
            std::thread::sleep(FLUSH_INTERVAL);
            let mut motion = self.motion.lock();
            let dirty = motion.pending.take();
            if let Some((x, y)) = dirty {
                let mut writer = self.writer.lock();
                if write_envelope(&mut *writer, &InputEvent::MouseMove { x, y }).is_err() {
                    drop(writer);
                    drop(motion);
                    self.stopped.store(true, Ordering::SeqCst);
                    break;
                }
            }
        }
    }
}
