//! JPEG encoding via turbojpeg.
//!
//! One whole-frame JPEG per capture tick, no stripe/change-detection
//! encoding against the previous frame (spec.md §4.5). Baseline JPEG,
//! chroma subsampling disabled, `optimize=false` for lower latency.

use turbojpeg::{Compressor, PixelFormat, Subsamp};

use crate::capture::Frame;
use crate::error::{BridgeError, Result};

#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub quality: u8,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self { quality: 80 }
    }
}

pub struct Encoder {
    compressor: Compressor,
}

impl Encoder {
    pub fn new(config: EncoderConfig) -> Result<Self> {
        let mut compressor =
            Compressor::new().map_err(|e| BridgeError::Encode(e.to_string()))?;
        compressor.set_quality(config.quality as i32);
        compressor.set_subsamp(Subsamp::None);
        Ok(Self { compressor })
    }

    /// Encode one full frame at the given quality (no chroma subsampling,
    /// no stripe change-detection).
    pub fn encode(&mut self, frame: &Frame, quality: u8) -> Result<Vec<u8>> {
        self.compressor.set_quality(quality as i32);
        let image = turbojpeg::Image {
            pixels: frame.data.as_slice(),
            width: frame.width as usize,
            pitch: frame.width as usize * 3,
            height: frame.height as usize,
            format: PixelFormat::RGB,
        };
        self.compressor
            .compress_to_vec(image)
            .map_err(|e| BridgeError::Encode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn encodes_a_solid_frame_to_a_nonempty_jpeg() {
        let mut encoder = Encoder::new(EncoderConfig::default()).unwrap();
        let frame = Frame {
            width: 32,
            height: 32,
            data: vec![100u8; 32 * 32 * 3],
            timestamp: Instant::now(),
            sequence: 0,
        };
        let jpeg = encoder.encode(&frame, 80).unwrap();
        assert!(!jpeg.is_empty());
        // Baseline JPEG SOI marker.
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn quality_parameter_changes_output_size() {
        let mut encoder = Encoder::new(EncoderConfig::default()).unwrap();
        let frame = Frame {
            width: 64,
            height: 64,
            data: (0..64 * 64 * 3).map(|i| (i % 256) as u8).collect(),
            timestamp: Instant::now(),
            sequence: 0,
        };
        let low = encoder.encode(&frame, 40).unwrap();
        let high = encoder.encode(&frame, 100).unwrap();
        assert!(high.len() > low.len());
    }
}
