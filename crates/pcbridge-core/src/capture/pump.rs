//! Paced video pump: one dedicated thread that grabs, encodes and
//! delivers frames at `target_fps`, absorbing encode jitter by shortening
//! the next sleep rather than ever dropping a grab (spec.md §4.5).

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::x11::ScreenCapturer;
use crate::config::{clamp_fps, clamp_quality};
use crate::encode::Encoder;
use crate::error::Result;

/// Invoked once per encoded frame. Returns `false` to request the pump
/// stop (e.g. the video socket write failed and the session is tearing
/// down) — mirrors spec.md §4.5's "sendall errors mark the Session
/// stopped; the pump exits on its next iteration".
pub type FrameCallback = Box<dyn FnMut(&[u8], u32, u32) -> bool + Send>;

/// Shared, atomically-updated capture parameters. `set_params` writes take
/// effect on the *next* loop iteration; an in-flight encode is never
/// interrupted (spec.md §4.5).
pub struct CaptureParams {
    fps: AtomicU32,
    quality: AtomicU8,
}

impl CaptureParams {
    pub fn new(fps: u32, quality: u8) -> Self {
        Self {
            fps: AtomicU32::new(clamp_fps(fps)),
            quality: AtomicU8::new(clamp_quality(quality)),
        }
    }

    pub fn fps(&self) -> u32 {
        self.fps.load(Ordering::Relaxed)
    }

    pub fn quality(&self) -> u8 {
        self.quality.load(Ordering::Relaxed)
    }

    pub fn set(&self, fps: Option<u32>, quality: Option<u8>) {
        if let Some(fps) = fps {
            self.fps.store(clamp_fps(fps), Ordering::Relaxed);
        }
        if let Some(quality) = quality {
            self.quality.store(clamp_quality(quality), Ordering::Relaxed);
        }
    }
}

/// Configuration and running state of the frame pump (spec.md §3
/// `CaptureJob`). `running` is true iff the capture thread exists and has
/// not yet exited.
pub struct CaptureJob {
    params: Arc<CaptureParams>,
    running: Arc<AtomicBool>,
    resolution: Arc<Mutex<(u32, u32)>>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureJob {
    pub fn start(
        mut capturer: Box<dyn ScreenCapturer>,
        mut encoder: Encoder,
        fps: u32,
        quality: u8,
        mut on_frame: FrameCallback,
    ) -> Self {
        let params = Arc::new(CaptureParams::new(fps, quality));
        let running = Arc::new(AtomicBool::new(true));
        let resolution = Arc::new(Mutex::new(capturer.dimensions()));

        let thread_params = params.clone();
        let thread_running = running.clone();
        let thread_resolution = resolution.clone();

        let handle = std::thread::spawn(move || {
            while thread_running.load(Ordering::SeqCst) {
                let tick_start = Instant::now();

                let frame = match capturer.capture() {
                    Ok(frame) => frame,
                    Err(e) => {
                        log::warn!("capture error (transient, retrying): {e}");
                        std::thread::sleep(Duration::from_millis(50));
                        continue;
                    }
                };

                {
                    let mut res = thread_resolution.lock().unwrap();
                    *res = (frame.width, frame.height);
                }

                let quality = thread_params.quality();
                match encoder.encode(&frame, quality) {
                    Ok(jpeg) => {
                        if !on_frame(&jpeg, frame.width, frame.height) {
                            thread_running.store(false, Ordering::SeqCst);
                            break;
                        }
                    }
                    Err(e) => {
                        log::warn!("encode error (transient, skipping frame): {e}");
                    }
                }

                let fps = thread_params.fps().max(1);
                let target = Duration::from_secs_f64(1.0 / fps as f64);
                let elapsed = tick_start.elapsed();
                if target > elapsed {
                    std::thread::sleep(target - elapsed);
                }
            }
        });

        Self {
            params,
            running,
            resolution,
            handle: Some(handle),
        }
    }

    pub fn set_params(&self, fps: Option<u32>, quality: Option<u8>) {
        self.params.set(fps, quality);
    }

    pub fn fps(&self) -> u32 {
        self.params.fps()
    }

    pub fn quality(&self) -> u8 {
        self.params.quality()
    }

    pub fn current_resolution(&self) -> (u32, u32) {
        *self.resolution.lock().unwrap()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CaptureJob {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::{Frame, FrameStats};
    use crate::encode::EncoderConfig;
    use std::sync::mpsc;

    struct FakeCapturer {
        width: u32,
        height: u32,
        seq: u64,
    }

    impl ScreenCapturer for FakeCapturer {
        fn capture(&mut self) -> Result<Frame> {
            self.seq += 1;
            Ok(Frame {
                width: self.width,
                height: self.height,
                data: vec![128u8; (self.width * self.height * 3) as usize],
                timestamp: Instant::now(),
                sequence: self.seq,
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
    fn set_params_clamps_out_of_range_values() {
        let params = CaptureParams::new(30, 80);
        params.set(Some(5000), Some(1));
        assert_eq!(params.fps(), crate::config::MAX_FPS);
        assert_eq!(params.quality(), crate::config::MIN_QUALITY);
    }

    #[test]
    fn pump_delivers_frames_and_stops_on_callback_request() {
        let capturer = Box::new(FakeCapturer {
            width: 16,
            height: 16,
            seq: 0,
        });
        let encoder = Encoder::new(EncoderConfig::default()).unwrap();
        let (tx, rx) = mpsc::channel::<()>();
        let mut count = 0u32;
        let callback: FrameCallback = Box::new(move |_bytes, w, h| {
            assert_eq!((w, h), (16, 16));
            count += 1;
            let _ = tx.send(());
            count < 3
        });

        let mut job = CaptureJob::start(capturer, encoder, 1000, 80, callback);
        for _ in 0..3 {
            rx.recv_timeout(Duration::from_secs(2)).unwrap();
        }
        // Pump should observe the stop request and exit on its own.
        std::thread::sleep(Duration::from_millis(100));
        job.stop();
    }
}
