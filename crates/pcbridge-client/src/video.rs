//! Video channel reader: drains length-prefixed JPEG frames, counts
//! bytes, and maintains a 1-second sliding FPS window (spec.md §4.7).

use std::io::BufReader;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use pcbridge_core::protocol::video::read_frame;

pub type FrameSink = Box<dyn FnMut(Vec<u8>) + Send>;

#[derive(Default)]
pub struct VideoStats {
    fps: AtomicU32,
    bytes_total: AtomicU64,
}

impl VideoStats {
    pub fn current_fps(&self) -> u32 {
        self.fps.load(Ordering::Relaxed)
    }

    pub fn bytes_total(&self) -> u64 {
        self.bytes_total.load(Ordering::Relaxed)
    }
}

/// Blocks the calling thread until the channel closes or `stopped` is set
/// by another channel's failure. `on_frame` receives each decoded JPEG in
/// arrival order; a slow sink only delays the next read, it never drops
/// frames (that pacing lives upstream, in the capture pump's bounded
/// channel on the server side).
pub fn run_video_reader(
    stream: TcpStream,
    stopped: Arc<AtomicBool>,
    stats: Arc<VideoStats>,
    mut on_frame: FrameSink,
) {
    let mut reader = BufReader::new(stream);
    let mut window_start = Instant::now();
    let mut window_count: u32 = 0;

    loop {
        if stopped.load(Ordering::SeqCst) {
            return;
        }
        match read_frame(&mut reader) {
            Ok(Some(jpeg)) => {
                window_count += 1;
                stats.bytes_total.fetch_add(jpeg.len() as u64, Ordering::Relaxed);
                let elapsed = window_start.elapsed();
                if elapsed.as_secs() >= 1 {
                    stats.fps.store(window_count, Ordering::Relaxed);
                    window_count = 0;
                    window_start = Instant::now();
                }
                on_frame(jpeg);
            }
            Ok(None) => {
                log::info!("video channel closed by peer");
                break;
            }
            Err(e) => {
                log::warn!("video channel error: {e}");
                break;
            }
        }
    }
    stopped.store(true, Ordering::SeqCst);
}
