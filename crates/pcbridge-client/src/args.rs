use clap::Parser;
use std::path::PathBuf;

use pcbridge_core::config::ClientConfig;

#[derive(Parser, Debug)]
#[command(name = "pcbridge-client")]
#[command(author = "PC Bridge Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Workstation-side bridge client", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "pcbridge-client.toml")]
    pub config: PathBuf,

    /// Discovery/server host
    #[arg(long)]
    pub host: Option<String>,

    /// Discovery port
    #[arg(long)]
    pub discovery_port: Option<u16>,

    /// Keep retrying with backoff after a disconnect
    #[arg(long, action)]
    pub reconnect: bool,

    /// Exit after the first successful session ends or negotiation fails
    #[arg(long, action)]
    pub no_reconnect: bool,

    /// Verbose logging
    #[arg(short, long, action)]
    pub verbose: bool,
}

impl Args {
    pub fn load_config(&self) -> Result<ClientConfig, Box<dyn std::error::Error>> {
        Ok(ClientConfig::load(&self.config)?)
    }

    pub fn apply_overrides(&self, config: &mut ClientConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.discovery_port {
            config.discovery_port = port;
        }
        if self.reconnect {
            config.auto_reconnect = true;
        }
        if self.no_reconnect {
            config.auto_reconnect = false;
        }
    }
}
