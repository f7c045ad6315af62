//! Accepts connections on the three data ports and enforces the
//! single-session invariant (spec.md §4.2): at most one fused `Session`
//! runs at a time, no matter how many sockets arrive on any one port.
//!
//! Discovery already refuses to negotiate while a session is active, but
//! a client that skips negotiation and dials a data port directly must be
//! turned away here too — discovery is a courtesy, not the enforcement
//! point.

use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::session::Session;
use crate::error::{BridgeError, Result};
use crate::protocol::{read_envelope, ControlRequest};

/// How long the rpc accept loop waits for the video/input sockets to show
/// up after the control socket connects, before giving up on this client.
const FUSE_TIMEOUT: Duration = Duration::from_secs(10);
const FUSE_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Builds a fully wired `Session` once all three sockets and the `hello`
/// request are in hand. Supplied by the binary that owns the X11
/// connection, capture backend, and injector.
pub type SessionBuilder = Box<
    dyn Fn(TcpStream, TcpStream, TcpStream, ControlRequest) -> Result<Session> + Send + Sync,
>;

pub struct Supervisor {
    rpc_listener: TcpListener,
    video_listener: TcpListener,
    input_listener: TcpListener,
    active: Arc<AtomicBool>,
    parked_video: Arc<Mutex<Option<TcpStream>>>,
    parked_input: Arc<Mutex<Option<TcpStream>>>,
}

impl Supervisor {
    pub fn bind(host: &str, rpc_port: u16, video_port: u16, input_port: u16) -> Result<Self> {
        Ok(Self {
            rpc_listener: TcpListener::bind((host, rpc_port))?,
            video_listener: TcpListener::bind((host, video_port))?,
            input_listener: TcpListener::bind((host, input_port))?,
            active: Arc::new(AtomicBool::new(false)),
            parked_video: Arc::new(Mutex::new(None)),
            parked_input: Arc::new(Mutex::new(None)),
        })
    }

    /// A shared flag the discovery listener polls on every negotiation
    /// attempt; set for the lifetime of one fused session.
    pub fn active_flag(&self) -> Arc<AtomicBool> {
        self.active.clone()
    }

    /// Runs the accept loops. Returns `Ok(())` either because a session
    /// asked the server to shut down, or because the caller's process is
    /// expected to exit some other way; returns `Err` only on a fatal
    /// accept-loop error on the control port. Never calls
    /// `std::process::exit` itself — that decision belongs to the binary.
    pub fn run(self, build_session: SessionBuilder) -> Result<()> {
        let _video_handle = spawn_parking_loop(
            self.video_listener.try_clone()?,
            self.parked_video.clone(),
            "video",
        );
        let _input_handle = spawn_parking_loop(
            self.input_listener.try_clone()?,
            self.parked_input.clone(),
            "input",
        );

        loop {
            let (control, addr) = self.rpc_listener.accept()?;
            log::info!("control connection from {addr}");

            if self.active.swap(true, Ordering::SeqCst) {
                log::warn!("rejecting {addr}: a session is already active");
                drop(control);
                continue;
            }

            let shutdown = match self.fuse_and_run(control, &build_session) {
                Ok(shutdown) => shutdown,
                Err(e) => {
                    log::warn!("session with {addr} ended with error: {e}");
                    false
                }
            };
            self.active.store(false, Ordering::SeqCst);
            *self.parked_video.lock() = None;
            *self.parked_input.lock() = None;

            if shutdown {
                log::info!("shutdown requested by {addr}, stopping accept loop");
                return Ok(());
            }
        }
    }

    /// Returns whether the session that just ended asked for a shutdown.
    fn fuse_and_run(&self, control: TcpStream, build_session: &SessionBuilder) -> Result<bool> {
        control.set_nodelay(true)?;
        let mut reader = std::io::BufReader::new(control.try_clone()?);
        let hello: ControlRequest = read_envelope(&mut reader)?
            .ok_or_else(|| BridgeError::protocol("control socket closed before hello"))?;
        if !matches!(hello, ControlRequest::Hello { .. }) {
            return Err(BridgeError::protocol("expected hello as first control message"));
        }

        let video = take_parked(&self.parked_video, FUSE_TIMEOUT)
            .ok_or_else(|| BridgeError::NegotiationTimeout)?;
        let input = take_parked(&self.parked_input, FUSE_TIMEOUT)
            .ok_or_else(|| BridgeError::NegotiationTimeout)?;

        let session = build_session(control, video, input, hello)?;
        let shutdown_flag = session.shutdown_flag();
        session.run()?;
        Ok(shutdown_flag.load(Ordering::SeqCst))
    }
}

fn take_parked(slot: &Mutex<Option<TcpStream>>, timeout: Duration) -> Option<TcpStream> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(stream) = slot.lock().take() {
            return Some(stream);
        }
        if Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(FUSE_POLL_INTERVAL);
    }
}

/// Accepts connections on one data port forever, parking the newest one
/// and closing whatever was parked before it (spec.md §4.2: a stale
/// early-arriving socket must never block the next real client).
fn spawn_parking_loop(
    listener: TcpListener,
    slot: Arc<Mutex<Option<TcpStream>>>,
    label: &'static str,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || loop {
        match listener.accept() {
            Ok((stream, addr)) => {
                log::debug!("{label} connection from {addr} parked");
                let mut guard = slot.lock();
                if let Some(old) = guard.take() {
                    let _ = old.shutdown(std::net::Shutdown::Both);
                }
                *guard = Some(stream);
            }
            Err(e) => {
                log::error!("{label} accept loop error: {e}");
                break;
            }
        }
    })
}
