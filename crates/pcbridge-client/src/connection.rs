//! The client connection manager (spec.md §4.7): negotiates a session,
//! fuses the three sockets, and runs the background threads for one
//! connected session. Drives the
//! `Idle -> Negotiating -> Connecting -> Connected -> Disconnected` state
//! machine, with a `Failed` detour into exponential backoff whenever
//! reconnection is enabled.

use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;

use pcbridge_core::config::{ClientConfig, DATA_PORT_RANGE};
use pcbridge_core::discovery::{enumerate_candidate_ports, negotiate, NEGOTIATE_DEADLINE};
use pcbridge_core::error::{BridgeError, Result};
use pcbridge_core::protocol::{ControlPush, ControlRequest, ControlResponse};

use crate::input::InputWriter;
use crate::rpc::RpcClient;
use crate::video::{run_video_reader, FrameSink, VideoStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Negotiating,
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

/// Every live socket and background thread for one fused session. Dropped
/// (via `Connection::close`) the moment any channel reports an error.
pub struct Connection {
    pub rpc: Arc<RpcClient>,
    pub input: Arc<InputWriter>,
    pub video_stats: Arc<VideoStats>,
    pub hello: ControlResponse,
    stopped: Arc<AtomicBool>,
    handles: Vec<std::thread::JoinHandle<()>>,
}

impl Connection {
    pub fn is_alive(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }

    pub fn close(mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn negotiate_and_connect(config: &ClientConfig) -> Result<(TcpStream, TcpStream, TcpStream)> {
    let candidates = enumerate_candidate_ports(DATA_PORT_RANGE, 3);
    let triplet = negotiate(
        &config.host,
        config.discovery_port,
        candidates,
        NEGOTIATE_DEADLINE,
    )?;

    let control = TcpStream::connect((config.host.as_str(), triplet.rpc))?;
    let video = TcpStream::connect((config.host.as_str(), triplet.video))?;
    let input = TcpStream::connect((config.host.as_str(), triplet.input))?;
    control.set_nodelay(true)?;
    video.set_nodelay(true)?;
    input.set_nodelay(true)?;
    Ok((control, video, input))
}

/// Negotiates, connects, sends `hello`, and spins up the background
/// threads (video reader, push reader, ping loop, motion flusher) for one
/// session. `on_frame` is invoked from the video reader's thread.
pub fn connect_session(
    config: &ClientConfig,
    agent: &str,
    version: &str,
    on_frame: FrameSink,
    on_push: impl Fn(ControlPush) + Send + 'static,
) -> Result<Connection> {
    let (control, video, input) = negotiate_and_connect(config)?;

    let rpc = Arc::new(RpcClient::new(
        control,
        Duration::from_secs(config.rpc_call_timeout_secs),
    )?);
    let hello = rpc.call(&ControlRequest::Hello {
        agent: agent.to_string(),
        version: version.to_string(),
    })?;
    if !hello.ok {
        return Err(BridgeError::operation(
            hello.error.unwrap_or_else(|| "hello rejected".into()),
        ));
    }

    let stopped = Arc::new(AtomicBool::new(false));
    let video_stats = Arc::new(VideoStats::default());
    let input_writer = Arc::new(InputWriter::new(input, stopped.clone())?);

    let mut handles = Vec::new();

    handles.push({
        let stopped = stopped.clone();
        let video_stats = video_stats.clone();
        std::thread::spawn(move || run_video_reader(video, stopped, video_stats, on_frame))
    });

    handles.push({
        let input_writer = input_writer.clone();
        std::thread::spawn(move || input_writer.run_flusher())
    });

    handles.push({
        let rpc = rpc.clone();
        let stopped = stopped.clone();
        std::thread::spawn(move || run_push_reader(rpc, stopped, on_push))
    });

    handles.push({
        let rpc = rpc.clone();
        let stopped = stopped.clone();
        std::thread::spawn(move || run_ping_loop(rpc, stopped))
    });

    Ok(Connection {
        rpc,
        input: input_writer,
        video_stats,
        hello,
        stopped,
        handles,
    })
}

/// Polls for unsolicited pushes via a non-blocking try-lock on the RPC
/// link; never competes with an in-flight `call()` for the response.
fn run_push_reader(rpc: Arc<RpcClient>, stopped: Arc<AtomicBool>, on_push: impl Fn(ControlPush)) {
    while !stopped.load(Ordering::SeqCst) {
        if let Some(push) = rpc.try_read_push() {
            on_push(push);
        } else {
            std::thread::sleep(Duration::from_millis(100));
        }
    }
}

fn run_ping_loop(rpc: Arc<RpcClient>, stopped: Arc<AtomicBool>) {
    while !stopped.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_secs(2));
        if stopped.load(Ordering::SeqCst) {
            return;
        }
        let sent = std::time::Instant::now();
        match rpc.call(&ControlRequest::Ping) {
            Ok(resp) if resp.ok => log::debug!("ping rtt {:?}", sent.elapsed()),
            Ok(resp) => log::warn!("ping rejected: {:?}", resp.error),
            Err(e) => {
                log::warn!("ping failed, session considered dead: {e}");
                stopped.store(true, Ordering::SeqCst);
            }
        }
    }
}

/// Exponential backoff with full jitter, doubling per consecutive failure
/// up to a configured ceiling (spec.md §4.1).
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            base: Duration::from_millis(config.reconnect_base_interval_ms),
            max: Duration::from_millis(config.reconnect_max_interval_ms),
            attempt: 0,
        }
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u32 << self.attempt.min(20);
        let capped = self.base.saturating_mul(factor).min(self.max);
        self.attempt += 1;
        let jittered_ms = rand::thread_rng().gen_range(0..=capped.as_millis() as u64);
        Duration::from_millis(jittered_ms.max(1))
    }
}

pub struct ConnectionManager {
    config: ClientConfig,
    state: Arc<Mutex<ConnectionState>>,
}

impl ConnectionManager {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(ConnectionState::Idle)),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    /// Runs one connect attempt, then hands the live `Connection` to
    /// `on_connected` and blocks until it reports it's no longer alive.
    /// If `auto_reconnect` is set, loops with exponential backoff;
    /// otherwise returns after the first attempt ends.
    pub fn run(
        &self,
        agent: &str,
        version: &str,
        mut make_frame_sink: impl FnMut() -> FrameSink,
        on_push: impl Fn(ControlPush) + Send + Clone + 'static,
        mut on_connected: impl FnMut(&Connection),
    ) -> Result<()> {
        let mut backoff = Backoff::new(&self.config);
        loop {
            self.set_state(ConnectionState::Negotiating);
            let attempt = connect_session(
                &self.config,
                agent,
                version,
                make_frame_sink(),
                on_push.clone(),
            );

            let connection = match attempt {
                Ok(conn) => conn,
                Err(e) => {
                    log::warn!("connection attempt failed: {e}");
                    self.set_state(ConnectionState::Failed);
                    if !self.config.auto_reconnect {
                        return Err(e);
                    }
                    std::thread::sleep(backoff.next_delay());
                    continue;
                }
            };

            backoff.reset();
            self.set_state(ConnectionState::Connected);
            on_connected(&connection);

            while connection.is_alive() {
                std::thread::sleep(Duration::from_millis(200));
            }
            self.set_state(ConnectionState::Disconnected);
            connection.close();

            if !self.config.auto_reconnect {
                return Ok(());
            }
            std::thread::sleep(backoff.next_delay());
        }
    }
}
