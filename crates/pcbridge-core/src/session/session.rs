//! The Session: owns the three data sockets for one active bridge
//! connection, drives the video pump, the input loop, the control
//! dispatcher, and the two push pollers, and tears all of it down the
//! moment any one of them reports a fatal error (spec.md §3, §4.2).

use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, TrySendError};
use parking_lot::Mutex;
use x11rb::protocol::xproto::Window;
use x11rb::xcb_ffi::XCBConnection;

use super::dispatch::{self, HandlerContext};
use super::pollers::{run_cursor_watcher, run_resolution_watcher};
use crate::capture::{CaptureJob, FrameCallback};
use crate::error::{BridgeError, Result};
use crate::filebridge::FileBridge;
use crate::input_injector::InputInjector;
use crate::protocol::control::{ControlPush, ControlRequest, ControlResponse};
use crate::protocol::input::InputEvent;
use crate::protocol::{read_envelope, write_envelope};
use crate::protocol::video::write_frame;

/// Everything a freshly-fused Session needs, besides the three sockets.
pub struct SessionParams {
    pub session_id: String,
    pub hostname: String,
    pub agent_version: String,
    pub injector: Arc<InputInjector>,
    pub file_bridge: Arc<FileBridge>,
    /// Only present when the capture backend has a live XCB connection;
    /// absent disables the cursor-shape poller but not the session.
    pub cursor_source: Option<(Arc<XCBConnection>, Window)>,
}

/// Builds and starts the capture pump for one session, given the frame
/// callback it must invoke. Kept as a factory so the X11-specific wiring
/// stays in the binary that owns the display connection.
pub type CaptureFactory = Box<dyn FnOnce(FrameCallback) -> Result<CaptureJob> + Send>;

pub struct Session {
    params: SessionParams,
    control_writer: Arc<Mutex<BufWriter<TcpStream>>>,
    control_reader: BufReader<TcpStream>,
    video: TcpStream,
    input: TcpStream,
    capture_factory: CaptureFactory,
    stopped: Arc<AtomicBool>,
    shutdown_requested: Arc<AtomicBool>,
}

impl Session {
    pub fn new(
        params: SessionParams,
        control: TcpStream,
        video: TcpStream,
        input: TcpStream,
        capture_factory: CaptureFactory,
    ) -> Result<Self> {
        control.set_nodelay(true)?;
        video.set_nodelay(true)?;
        input.set_nodelay(true)?;
        // Periodic wakeups so the control loop notices a session-wide
        // `stopped` flag (set by a dead video/input channel) even when no
        // control traffic is arriving.
        control.set_read_timeout(Some(Duration::from_secs(1)))?;
        let control_reader = BufReader::new(control.try_clone()?);
        let control_writer = Arc::new(Mutex::new(BufWriter::new(control)));
        Ok(Self {
            params,
            control_writer,
            control_reader,
            video,
            input,
            capture_factory,
            stopped: Arc::new(AtomicBool::new(false)),
            shutdown_requested: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// A handle that stays valid after `run()` consumes the session,
    /// so the supervisor can learn whether a `shutdown` request landed
    /// during the session without holding onto the session itself.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown_requested.clone()
    }

    /// Runs the session to completion: blocks the calling thread until
    /// every socket loop has stopped, then releases all resources so the
    /// supervisor can accept a new session.
    pub fn run(mut self) -> Result<()> {
        // Capacity 1: the capture thread's pacing must never block on a
        // slow video socket, and a slow link never builds an unbounded
        // backlog of stale frames (spec.md §4.5, §5).
        let (frame_tx, frame_rx) = bounded::<Vec<u8>>(1);
        let stopped_for_pump = self.stopped.clone();
        let frame_callback: FrameCallback = Box::new(move |jpeg, _w, _h| {
            if stopped_for_pump.load(Ordering::SeqCst) {
                return false;
            }
            match frame_tx.try_send(jpeg.to_vec()) {
                Ok(()) | Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Disconnected(_)) => false,
            }
        });
        let capture_factory = std::mem::replace(
            &mut self.capture_factory,
            Box::new(|_| unreachable!("capture factory already consumed")),
        );
        let capture = Arc::new(capture_factory(frame_callback)?);

        let video_handle = {
            let mut video_writer = self.video.try_clone()?;
            let stopped = self.stopped.clone();
            std::thread::spawn(move || {
                for jpeg in frame_rx.iter() {
                    if write_frame(&mut video_writer, &jpeg).is_err() {
                        break;
                    }
                }
                stopped.store(true, Ordering::SeqCst);
                let _ = video_writer.shutdown(Shutdown::Both);
            })
        };

        let input_handle = {
            let input = self.input.try_clone()?;
            let injector = self.params.injector.clone();
            let stopped = self.stopped.clone();
            std::thread::spawn(move || {
                let mut reader = BufReader::new(input.try_clone().expect("clone input socket"));
                loop {
                    if stopped.load(Ordering::SeqCst) {
                        break;
                    }
                    match read_envelope::<_, InputEvent>(&mut reader) {
                        Ok(Some(event)) => {
                            if let Err(e) = injector.dispatch(&event) {
                                log::warn!("injector error (transient): {e}");
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            log::warn!("input channel error: {e}");
                            break;
                        }
                    }
                }
                stopped.store(true, Ordering::SeqCst);
                let _ = input.shutdown(Shutdown::Both);
            })
        };

        let cursor_handle = self.params.cursor_source.clone().map(|(conn, root)| {
            let stopped = self.stopped.clone();
            let writer = self.control_writer.clone();
            std::thread::spawn(move || {
                run_cursor_watcher(conn, root, stopped, |push| push_envelope(&writer, push));
            })
        });

        let resolution_handle = {
            let stopped = self.stopped.clone();
            let writer = self.control_writer.clone();
            let capture = capture.clone();
            std::thread::spawn(move || {
                run_resolution_watcher(capture, stopped, |push| push_envelope(&writer, push));
            })
        };

        let result = self.run_control_loop(capture.as_ref());

        self.stopped.store(true, Ordering::SeqCst);
        let _ = self.video.shutdown(Shutdown::Both);
        let _ = self.input.shutdown(Shutdown::Both);
        let _ = input_handle.join();
        let _ = video_handle.join();
        if let Some(handle) = cursor_handle {
            let _ = handle.join();
        }
        let _ = resolution_handle.join();

        // `capture` still has the resolution-watcher's clone alive until
        // its join above returns; this is the last owner.
        drop(capture);

        result
    }

    fn run_control_loop(&mut self, capture: &CaptureJob) -> Result<()> {
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                return Ok(());
            }
            let request: Option<ControlRequest> = match read_envelope(&mut self.control_reader) {
                Ok(v) => v,
                Err(BridgeError::Transport(e))
                    if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) =>
                {
                    continue;
                }
                Err(e) => {
                    log::info!("control channel closed: {e}");
                    return Ok(());
                }
            };
            let Some(request) = request else {
                return Ok(());
            };

            let response = match request {
                ControlRequest::FileSend {
                    folder,
                    size,
                    sha256,
                    metadata,
                } => self.handle_file_send(&folder, size, sha256.as_deref(), &metadata)?,
                ControlRequest::FileGet { folder, filename } => {
                    self.handle_file_get(&folder, &filename)?
                }
                other => {
                    let is_shutdown = matches!(other, ControlRequest::Shutdown);
                    let ctx = HandlerContext {
                        session_id: &self.params.session_id,
                        hostname: &self.params.hostname,
                        agent_version: &self.params.agent_version,
                        file_bridge: &self.params.file_bridge,
                        injector: &self.params.injector,
                        capture,
                    };
                    let response = dispatch::handle(&ctx, other);
                    if is_shutdown {
                        self.shutdown_requested.store(true, Ordering::SeqCst);
                    }
                    response
                }
            };

            let mut writer = self.control_writer.lock();
            write_envelope(&mut *writer, &response)?;
        }
    }

    fn handle_file_send(
        &mut self,
        folder: &str,
        size: u64,
        sha256: Option<&str>,
        metadata: &crate::protocol::control::FileSendMetadata,
    ) -> Result<ControlResponse> {
        let target = match self
            .params
            .file_bridge
            .upload_target(folder, &metadata.name, &self.params.session_id)
        {
            Ok(path) => path,
            Err(e) => return Ok(ControlResponse::error(e.to_string())),
        };

        {
            let mut writer = self.control_writer.lock();
            let mut ready = ControlResponse::ok();
            ready.kind = Some("ready".to_string());
            write_envelope(&mut *writer, &ready)?;
        }

        let mut file = std::fs::File::create(&target)?;
        let computed = crate::filebridge::receive_exact(&mut self.control_reader, size, &mut file)?;

        #[cfg(unix)]
        if let Err(e) = dispatch::apply_permissions(&target, metadata) {
            log::warn!("failed to apply permissions to {target:?}: {e}");
        }

        let matches = dispatch::check_upload_integrity(sha256, &computed);
        Ok(ControlResponse {
            ok: true,
            sha256: Some(computed),
            matches: Some(matches),
            ..Default::default()
        })
    }

    fn handle_file_get(&mut self, folder: &str, filename: &str) -> Result<ControlResponse> {
        let (source, size) = match self
            .params
            .file_bridge
            .download_source(folder, filename, &self.params.session_id)
        {
            Ok(v) => v,
            Err(e) => return Ok(ControlResponse::error(e.to_string())),
        };
        let mut file = std::fs::File::open(&source)?;

        // Held for the header, the raw payload, and the checksum trailer
        // together: a cursor/resolution push landing mid-stream would be
        // indistinguishable from file bytes to a client that's just
        // counting `size` bytes after the header.
        let mut writer = self.control_writer.lock();
        let header = ControlResponse {
            ok: true,
            kind: Some("file_data".to_string()),
            size: Some(size),
            ..Default::default()
        };
        write_envelope(&mut *writer, &header)?;
        let computed = crate::filebridge::send_exact(&mut file, size, &mut *writer)?;
        drop(writer);

        Ok(ControlResponse {
            ok: true,
            sha256: Some(computed),
            ..Default::default()
        })
    }
}

fn push_envelope(writer: &Arc<Mutex<BufWriter<TcpStream>>>, push: &ControlPush) -> bool {
    let mut guard = writer.lock();
    match write_envelope(&mut *guard, push) {
        Ok(()) => true,
        Err(e) => {
            log::info!("push envelope failed, session closing: {e}");
            false
        }
    }
}
