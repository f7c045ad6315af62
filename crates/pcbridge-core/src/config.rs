//! Shared configuration shapes, TOML-backed with in-code defaults.
//!
//! A missing file falls back to defaults rather than erroring, and
//! `validate()` is a separate pass so callers can surface a clear message
//! before anything starts listening.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{BridgeError, Result};

pub const DISCOVERY_PORT: u16 = 22000;
pub const DATA_PORT_RANGE: (u16, u16) = (22010, 22059);
pub const DEFAULT_RPC_PORT: u16 = 22010;
pub const DEFAULT_VIDEO_PORT: u16 = 22011;
pub const DEFAULT_INPUT_PORT: u16 = 22012;

pub const MIN_FPS: u32 = 1;
pub const MAX_FPS: u32 = 120;
pub const MIN_QUALITY: u8 = 40;
pub const MAX_QUALITY: u8 = 100;
pub const MAX_ENVELOPE_BYTES: usize = 128 * 1024;
pub const MAX_FRAME_BYTES: u32 = 20 * 1024 * 1024;

/// Clamp a requested FPS into the legal [1, 120] range.
pub fn clamp_fps(fps: u32) -> u32 {
    fps.clamp(MIN_FPS, MAX_FPS)
}

/// Clamp a requested JPEG quality into the legal [40, 100] range.
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_QUALITY, MAX_QUALITY)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub monitor: i32,
    pub fps: u32,
    pub quality: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            monitor: 0,
            fps: 30,
            quality: 80,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub rpc_port: u16,
    pub video_port: u16,
    pub input_port: u16,
    pub no_gui: bool,
    pub capture: CaptureConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            rpc_port: DEFAULT_RPC_PORT,
            video_port: DEFAULT_VIDEO_PORT,
            input_port: DEFAULT_INPUT_PORT,
            no_gui: true,
            capture: CaptureConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| BridgeError::operation(e.to_string()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.capture.fps == 0 {
            return Err(BridgeError::operation("capture fps must be non-zero"));
        }
        if self.rpc_port == self.video_port
            || self.rpc_port == self.input_port
            || self.video_port == self.input_port
        {
            return Err(BridgeError::operation(
                "rpc/video/input ports must be distinct",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub host: String,
    pub discovery_port: u16,
    pub auto_reconnect: bool,
    pub reconnect_base_interval_ms: u64,
    pub reconnect_max_interval_ms: u64,
    pub rpc_call_timeout_secs: u64,
    pub file_transfer_timeout_secs: u64,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            discovery_port: DISCOVERY_PORT,
            auto_reconnect: true,
            reconnect_base_interval_ms: 1_000,
            reconnect_max_interval_ms: 60_000,
            rpc_call_timeout_secs: 8,
            file_transfer_timeout_secs: 600,
            logging: LoggingConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| BridgeError::operation(e.to_string()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.reconnect_base_interval_ms == 0 {
            return Err(BridgeError::operation(
                "reconnect_base_interval_ms must be non-zero",
            ));
        }
        if self.reconnect_base_interval_ms > self.reconnect_max_interval_ms {
            return Err(BridgeError::operation(
                "reconnect_base_interval_ms cannot exceed reconnect_max_interval_ms",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_clamps_to_legal_range() {
        assert_eq!(clamp_fps(0), MIN_FPS);
        assert_eq!(clamp_fps(500), MAX_FPS);
        assert_eq!(clamp_fps(60), 60);
    }

    #[test]
    fn quality_clamps_to_legal_range() {
        assert_eq!(clamp_quality(0), MIN_QUALITY);
        assert_eq!(clamp_quality(255), MAX_QUALITY);
        assert_eq!(clamp_quality(75), 75);
    }

    #[test]
    fn server_config_rejects_colliding_ports() {
        let mut cfg = ServerConfig::default();
        cfg.video_port = cfg.rpc_port;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let cfg = ServerConfig::load(Path::new("/nonexistent/pcbridge.toml")).unwrap();
        assert_eq!(cfg.rpc_port, DEFAULT_RPC_PORT);
    }
}
