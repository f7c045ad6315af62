//! Captured frame data structure and running capture statistics.

use std::fmt;
use std::time::Instant;

/// One captured screen frame, in packed RGB (3 bytes/pixel).
#[derive(Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub timestamp: Instant,
    pub sequence: u64,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame({}x{}, {} bytes, seq={})",
            self.width,
            self.height,
            self.data.len(),
            self.sequence
        )
    }
}

/// Capture statistics for monitoring the pump thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameStats {
    pub total_frames: u64,
    pub total_bytes: u64,
    pub total_capture_time_us: u64,
    pub last_capture_time_us: u64,
}

impl FrameStats {
    pub fn record_capture(&mut self, bytes: usize, time_us: u64) {
        self.total_frames += 1;
        self.total_bytes += bytes as u64;
        self.last_capture_time_us = time_us;
        self.total_capture_time_us += time_us;
    }
}
