//! pcbridge-server: the headless compute-host side of the bridge.
//!
//! Binds the discovery listener and the three data-port accept loops,
//! wires the X11 capture/injection backends into each fused session, and
//! runs until a client sends `shutdown` or the process is signaled.

mod args;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use args::Args;
use clap::Parser;
use log::{error, info};
use x11rb::connection::Connection;
use x11rb::xcb_ffi::XCBConnection;

use pcbridge_core::capture::{CaptureJob, X11Capturer};
use pcbridge_core::config::{ServerConfig, DISCOVERY_PORT};
use pcbridge_core::discovery::{DiscoveryListener, PortTriplet};
use pcbridge_core::encode::{Encoder, EncoderConfig};
use pcbridge_core::filebridge::FileBridge;
use pcbridge_core::input_injector::InputInjector;
use pcbridge_core::protocol::ControlRequest;
use pcbridge_core::session::{Session, SessionParams, Supervisor};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Reads the machine's hostname via `gethostname(2)`, falling back to a
/// fixed label if the call fails for any reason (container without a
/// hostname set, name too long for the buffer, etc).
fn system_hostname() -> String {
    let mut buf = vec![0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return "pcbridge-host".to_string();
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..len]).into_owned()
}

fn main() {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::new()
        .parse_filters(&format!("pcbridge_server={log_level},pcbridge_core={log_level}"))
        .init();

    info!("pcbridge-server v{} starting", env!("CARGO_PKG_VERSION"));

    let mut config = match args.load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            std::process::exit(1);
        }
    };
    args.apply_overrides(&mut config);

    if let Err(e) = config.validate() {
        eprintln!("invalid configuration: {e}");
        std::process::exit(1);
    }

    if let Err(e) = run(config) {
        error!("fatal error: {e}");
        eprintln!("fatal error: {e}");
        std::process::exit(1);
    }
}

fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let (conn, screen_num) = XCBConnection::connect(None)
        .map_err(|e| format!("failed to connect to X11 display: {e}"))?;
    let conn = Arc::new(conn);
    let root = conn.setup().roots[screen_num].root;
    info!("connected to X11 display, screen {screen_num}, root window {root}");

    let file_bridge = Arc::new(FileBridge::from_env()?);
    let hostname = system_hostname();

    let supervisor = Supervisor::bind(&config.host, config.rpc_port, config.video_port, config.input_port)?;
    let active_flag = supervisor.active_flag();

    let triplet = PortTriplet {
        rpc: config.rpc_port,
        video: config.video_port,
        input: config.input_port,
    };
    let discovery = DiscoveryListener::bind(&config.host, DISCOVERY_PORT)?;
    std::thread::spawn(move || loop {
        if let Err(e) = discovery.serve_one(triplet, || active_flag.load(Ordering::SeqCst)) {
            log::debug!("discovery negotiation error: {e}");
        }
    });

    let fps = config.capture.fps;
    let quality = config.capture.quality;

    supervisor.run(Box::new(move |control, video, input, hello| {
        let (agent, version) = match &hello {
            ControlRequest::Hello { agent, version } => (agent.clone(), version.clone()),
            _ => ("unknown".to_string(), "0".to_string()),
        };
        info!("fusing session for {agent} {version}");

        let session_id = uuid::Uuid::new_v4().simple().to_string();
        let injector = match InputInjector::with_x11(conn.clone(), screen_num as i32) {
            Ok(injector) => Arc::new(injector),
            Err(e) => {
                log::warn!("XTest injector unavailable ({e}), falling back to subprocess injection");
                Arc::new(InputInjector::with_subprocess())
            }
        };

        let params = SessionParams {
            session_id,
            hostname: hostname.clone(),
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
            injector,
            file_bridge: file_bridge.clone(),
            cursor_source: Some((conn.clone(), root)),
        };

        let capture_conn = conn.clone();
        let capture_factory = Box::new(move |on_frame| {
            let capturer = Box::new(X11Capturer::new(capture_conn, screen_num as i32)?);
            let encoder = Encoder::new(EncoderConfig { quality })?;
            Ok(CaptureJob::start(capturer, encoder, fps, quality, on_frame))
        });

        Session::new(params, control, video, input, capture_factory)
    }))?;

    info!("accept loop stopped, exiting");
    Ok(())
}
