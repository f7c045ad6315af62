//! Server-initiated pushes: the cursor-shape poller (150 ms) and the
//! resolution watcher (2 s), both driven from `Session::run` background
//! threads (spec.md §4.3, §4.8).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use x11rb::connection::Connection;
use x11rb::protocol::xfixes;
use x11rb::protocol::xproto::Window;
use x11rb::xcb_ffi::XCBConnection;

use crate::capture::CaptureJob;
use crate::protocol::control::ControlPush;

const CURSOR_POLL_INTERVAL: Duration = Duration::from_millis(150);
const RESOLUTION_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Queries the cursor sprite's pixel data via XFixes and hashes it into a
/// short, stable identifier; a changed hash means a changed shape. Falls
/// back to silence (no pushes) if XFixes is unavailable, matching the
/// injector's policy of degrading rather than failing the session.
fn current_cursor_shape(conn: &XCBConnection, root: Window) -> Option<String> {
    let _ = root;
    let image = xfixes::get_cursor_image(conn).ok()?.reply().ok()?;
    let mut hasher = Sha256::new();
    hasher.update(image.width.to_le_bytes());
    hasher.update(image.height.to_le_bytes());
    for pixel in &image.cursor_image {
        hasher.update(pixel.to_le_bytes());
    }
    Some(hex::encode(&hasher.finalize()[..8]))
}

/// Polls the cursor sprite and pushes `cursor_shape` envelopes on change.
/// Runs until `stopped` is set.
pub fn run_cursor_watcher(
    conn: Arc<XCBConnection>,
    root: Window,
    stopped: Arc<AtomicBool>,
    push: impl FnMut(&ControlPush) -> bool,
) {
    run_cursor_watcher_with_interval(conn, root, stopped, CURSOR_POLL_INTERVAL, push)
}

fn run_cursor_watcher_with_interval(
    conn: Arc<XCBConnection>,
    root: Window,
    stopped: Arc<AtomicBool>,
    interval: Duration,
    mut push: impl FnMut(&ControlPush) -> bool,
) {
    let mut last_shape: Option<String> = None;
    while !stopped.load(Ordering::SeqCst) {
        if let Some(shape) = current_cursor_shape(conn.as_ref(), root) {
            if last_shape.as_deref() != Some(shape.as_str()) {
                last_shape = Some(shape.clone());
                if !push(&ControlPush::CursorShape { shape }) {
                    return;
                }
            }
        }
        std::thread::sleep(interval);
    }
}

/// Polls the capture job's known resolution and pushes `resolution_changed`
/// envelopes on change. Runs until `stopped` is set.
pub fn run_resolution_watcher(
    capture: Arc<CaptureJob>,
    stopped: Arc<AtomicBool>,
    push: impl FnMut(&ControlPush) -> bool,
) {
    run_resolution_watcher_with_interval(capture, stopped, RESOLUTION_POLL_INTERVAL, push)
}

fn run_resolution_watcher_with_interval(
    capture: Arc<CaptureJob>,
    stopped: Arc<AtomicBool>,
    interval: Duration,
    mut push: impl FnMut(&ControlPush) -> bool,
) {
    let mut last = capture.current_resolution();
    while !stopped.load(Ordering::SeqCst) {
        let current = capture.current_resolution();
        if current != last {
            last = current;
            if !push(&ControlPush::ResolutionChanged {
                width: current.0,
                height: current.1,
            }) {
                return;
            }
        }
        std::thread::sleep(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureJob, Frame, FrameStats, ScreenCapturer};
    use crate::encode::{Encoder, EncoderConfig};
    use crate::error::Result;
    use std::sync::Mutex;
    use std::time::Instant;

    struct GrowingCapturer {
        width: u32,
        height: u32,
    }

    impl ScreenCapturer for GrowingCapturer {
        fn capture(&mut self) -> Result<Frame> {
            self.width += 1;
            Ok(Frame {
                width: self.width,
                height: self.height,
                data: vec![0u8; (self.width * self.height * 3) as usize],
                timestamp: Instant::now(),
                sequence: 0,
            })
        }

        fn dimensions(&self) -> (u32, u32) {
            (self.width, self.height)
        }

        fn stats(&self) -> FrameStats {
            FrameStats::default()
        }
    }

    #[test]
    fn resolution_watcher_reports_each_change_until_stopped() {
        let capturer = Box::new(GrowingCapturer {
            width: 100,
            height: 100,
        });
        let encoder = Encoder::new(EncoderConfig::default()).unwrap();
        let job = Arc::new(CaptureJob::start(
            capturer,
            encoder,
            1000,
            80,
            Box::new(|_, _, _| true),
        ));

        let stopped = Arc::new(AtomicBool::new(false));
        let pushed = Arc::new(Mutex::new(Vec::new()));
        let pushed_clone = pushed.clone();
        let stopped_clone = stopped.clone();
        let job_clone = job.clone();

        let handle = std::thread::spawn(move || {
            run_resolution_watcher_with_interval(job_clone, stopped_clone, Duration::from_millis(5), |push| {
                pushed_clone.lock().unwrap().push(push.clone());
                pushed_clone.lock().unwrap().len() < 2
            });
        });

        std::thread::sleep(Duration::from_millis(100));
        stopped.store(true, Ordering::SeqCst);
        handle.join().unwrap();

        assert!(!pushed.lock().unwrap().is_empty());
    }
}
