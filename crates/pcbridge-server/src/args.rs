use clap::Parser;
use std::path::PathBuf;

use pcbridge_core::config::ServerConfig;

#[derive(Parser, Debug)]
#[command(name = "pcbridge-server")]
#[command(author = "PC Bridge Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Headless compute-host bridge server", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/pcbridge.toml")]
    pub config: PathBuf,

    /// Bind address for the discovery and data sockets
    #[arg(long)]
    pub host: Option<String>,

    /// Control-channel port
    #[arg(long)]
    pub rpc: Option<u16>,

    /// Video-channel port
    #[arg(long)]
    pub video: Option<u16>,

    /// Input-channel port
    #[arg(long)]
    pub input: Option<u16>,

    /// Capture frame rate
    #[arg(long)]
    pub fps: Option<u32>,

    /// JPEG quality (40-100)
    #[arg(long)]
    pub quality: Option<u8>,

    /// Run without attempting to raise the X server's DPMS/screensaver off
    #[arg(long, action)]
    pub no_gui: bool,

    /// Verbose logging
    #[arg(short, long, action)]
    pub verbose: bool,
}

impl Args {
    pub fn load_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        Ok(ServerConfig::load(&self.config)?)
    }

    pub fn apply_overrides(&self, config: &mut ServerConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(rpc) = self.rpc {
            config.rpc_port = rpc;
        }
        if let Some(video) = self.video {
            config.video_port = video;
        }
        if let Some(input) = self.input {
            config.input_port = input;
        }
        if let Some(fps) = self.fps {
            config.capture.fps = fps;
        }
        if let Some(quality) = self.quality {
            config.capture.quality = quality;
        }
        if self.no_gui {
            config.no_gui = true;
        }
    }
}
