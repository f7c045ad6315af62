//! pcbridge-client: the workstation-side bridge client.
//!
//! Negotiates a session against a running `pcbridge-server`, maintains
//! the three fused sockets, and exposes a line-oriented control shell
//! over stdin for scripting and manual testing — this binary has no
//! rendering surface of its own; the video stream is handed to
//! `on_frame` for whatever downstream consumer wants the bytes (written
//! to disk here, piped elsewhere by an embedder).

mod args;
mod connection;
mod input;
mod rpc;
mod video;

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use args::Args;
use clap::Parser;
use connection::{Connection, ConnectionManager};
use log::info;
use parking_lot::Mutex;
use pcbridge_core::protocol::input::MouseButton;
use pcbridge_core::protocol::{ControlPush, ControlRequest};

fn main() {
    let args = Args::parse();
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::new()
        .parse_filters(&format!("pcbridge_client={log_level},pcbridge_core={log_level}"))
        .init();

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

    let manager = ConnectionManager::new(config);
    let current: Arc<Mutex<Option<Arc<ConnHandle>>>> = Arc::new(Mutex::new(None));

    let shell_current = current.clone();
    std::thread::spawn(move || run_shell(shell_current));

    let result = manager.run(
        "pcbridge-client",
        env!("CARGO_PKG_VERSION"),
        || {
            Box::new(|jpeg: Vec<u8>| {
                log::trace!("received frame, {} bytes", jpeg.len());
            })
        },
        |push: ControlPush| match push {
            ControlPush::CursorShape { shape } => info!("cursor shape changed: {shape}"),
            ControlPush::ResolutionChanged { width, height } => {
                info!("server resolution changed to {width}x{height}")
            }
        },
        {
            let current = current.clone();
            move |conn: &Connection| {
                info!(
                    "connected: {} v{} ({}x{} @ {} fps)",
                    conn.hello.agent.clone().unwrap_or_default(),
                    conn.hello.version.clone().unwrap_or_default(),
                    conn.hello.width.unwrap_or(0),
                    conn.hello.height.unwrap_or(0),
                    conn.hello.fps.unwrap_or(0),
                );
                *current.lock() = Some(Arc::new(ConnHandle {
                    rpc: conn.rpc.clone(),
                    input: conn.input.clone(),
                }));
            }
        },
    );

    if let Err(e) = result {
        eprintln!("connection failed: {e}");
        std::process::exit(1);
    }
}

/// The subset of a `Connection` the interactive shell needs; kept
/// separate so the shell thread never has to borrow across a reconnect.
struct ConnHandle {
    rpc: Arc<rpc::RpcClient>,
    input: Arc<input::InputWriter>,
}

fn run_shell(current: Arc<Mutex<Option<Arc<ConnHandle>>>>) {
    let stdin = std::io::stdin();
    print_help();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let conn = current.lock().clone();
        let Some(conn) = conn else {
            println!("not connected yet");
            continue;
        };
        if let Err(e) = dispatch_command(&conn, line) {
            println!("error: {e}");
        }
    }
}

fn print_help() {
    println!("commands: ping | info | move X Y | click BUTTON | type TEXT | upload LOCAL FOLDER | download FOLDER NAME LOCAL | shutdown | quit");
}

fn dispatch_command(conn: &ConnHandle, line: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut parts = line.split_whitespace();
    let cmd = parts.next().unwrap_or("");
    match cmd {
        "ping" => {
            let resp = conn.rpc.call(&ControlRequest::Ping)?;
            println!("{resp:?}");
        }
        "info" => {
            let resp = conn.rpc.call(&ControlRequest::GetSystemInfo)?;
            println!("{resp:?}");
        }
        "move" => {
            let x: i32 = parts.next().ok_or("usage: move X Y")?.parse()?;
            let y: i32 = parts.next().ok_or("usage: move X Y")?.parse()?;
            conn.input.send_mouse_move(x, y);
        }
        "click" => {
            let name = parts.next().ok_or("usage: click BUTTON")?;
            let button = parse_button(name)?;
            conn.input.send_mouse_press(button)?;
            conn.input.send_mouse_release(button)?;
        }
        "type" => {
            let text: String = parts.collect::<Vec<_>>().join(" ");
            conn.rpc.call(&ControlRequest::TypeText { text })?;
        }
        "upload" => {
            let local = parts.next().ok_or("usage: upload LOCAL FOLDER")?;
            let folder = parts.next().ok_or("usage: upload LOCAL FOLDER")?;
            upload_file(conn, Path::new(local), folder)?;
        }
        "download" => {
            let folder = parts.next().ok_or("usage: download FOLDER NAME LOCAL")?;
            let name = parts.next().ok_or("usage: download FOLDER NAME LOCAL")?;
            let local = parts.next().ok_or("usage: download FOLDER NAME LOCAL")?;
            download_file(conn, folder, name, Path::new(local))?;
        }
        "shutdown" => {
            let resp = conn.rpc.call(&ControlRequest::Shutdown)?;
            println!("{resp:?}");
        }
        "quit" | "exit" => std::process::exit(0),
        other => println!("unknown command: {other}"),
    }
    Ok(())
}

fn parse_button(name: &str) -> Result<MouseButton, Box<dyn std::error::Error>> {
    Ok(match name {
        "left" => MouseButton::Left,
        "middle" => MouseButton::Middle,
        "right" => MouseButton::Right,
        "x1" => MouseButton::X1,
        "x2" => MouseButton::X2,
        other => return Err(format!("unknown button: {other}").into()),
    })
}

fn upload_file(conn: &ConnHandle, local: &Path, folder: &str) -> Result<(), Box<dyn std::error::Error>> {
    let data = std::fs::read(local)?;
    let size = data.len() as u64;
    let sha256 = pcbridge_core::filebridge::sha256_file(local).ok();
    let name = local
        .file_name()
        .ok_or("local path has no file name")?
        .to_string_lossy()
        .into_owned();
    let resp = conn.rpc.upload(folder, &name, data.as_slice(), size, sha256)?;
    println!("{resp:?}");
    Ok(())
}

fn download_file(
    conn: &ConnHandle,
    folder: &str,
    name: &str,
    local: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut file = std::fs::File::create(local)?;
    let resp = conn.rpc.download(folder, name, &mut file)?;
    println!("{resp:?}");
    Ok(())
}
