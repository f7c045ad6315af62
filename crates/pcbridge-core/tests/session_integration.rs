//! End-to-end tests over real loopback sockets: a clean session handshake,
//! a file upload/download round trip with SHA-256 verification, and the
//! single-session-rejection invariant enforced by the supervisor
//! (spec.md §8). No mocked sockets, matching the pack's own integration
//! test style for socket-driven protocols.

use std::io::{BufReader, BufWriter, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pcbridge_core::capture::{CaptureJob, Frame, FrameStats, ScreenCapturer};
use pcbridge_core::encode::{Encoder, EncoderConfig};
use pcbridge_core::error::Result;
use pcbridge_core::filebridge::FileBridge;
use pcbridge_core::input_injector::InputInjector;
use pcbridge_core::protocol::control::FileSendMetadata;
use pcbridge_core::protocol::{read_envelope, write_envelope, ControlRequest, ControlResponse};
use pcbridge_core::session::{CaptureFactory, Session, SessionBuilder, SessionParams, Supervisor};

struct FixedSizeCapturer {
    width: u32,
    height: u32,
}

impl ScreenCapturer for FixedSizeCapturer {
    fn capture(&mut self) -> Result<Frame> {
        Ok(Frame {
            width: self.width,
            height: self.height,
            data: vec![64u8; (self.width * self.height * 3) as usize],
            timestamp: Instant::now(),
            sequence: 0,
        })
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn stats(&self) -> FrameStats {
        FrameStats::default()
    }
}

fn test_capture_factory() -> CaptureFactory {
    Box::new(|on_frame| {
        let capturer = Box::new(FixedSizeCapturer {
            width: 32,
            height: 32,
        });
        let encoder = Encoder::new(EncoderConfig::default())?;
        Ok(CaptureJob::start(capturer, encoder, 1000, 80, on_frame))
    })
}

fn set_socket_timeouts(stream: &TcpStream) {
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream.set_write_timeout(Some(Duration::from_secs(5))).unwrap();
}

/// Binds three loopback listeners, spawns the accepting/running session in
/// a background thread, and returns the client-side ends of all three
/// sockets plus the thread handle so the caller can assert on how the
/// session finished.
fn spawn_fused_session(
    home: std::path::PathBuf,
) -> (TcpStream, TcpStream, TcpStream, thread::JoinHandle<Result<()>>) {
    let control_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let video_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let input_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let control_addr = control_listener.local_addr().unwrap();
    let video_addr = video_listener.local_addr().unwrap();
    let input_addr = input_listener.local_addr().unwrap();

    let handle = thread::spawn(move || -> Result<()> {
        let (control, _) = control_listener.accept().unwrap();
        let (video, _) = video_listener.accept().unwrap();
        let (input, _) = input_listener.accept().unwrap();

        let params = SessionParams {
            session_id: "test-session".to_string(),
            hostname: "test-host".to_string(),
            agent_version: "0.0.0-test".to_string(),
            injector: Arc::new(InputInjector::with_subprocess()),
            file_bridge: Arc::new(FileBridge::new(home)),
            cursor_source: None,
        };
        let session = Session::new(params, control, video, input, test_capture_factory())?;
        session.run()
    });

    let control_client = TcpStream::connect(control_addr).unwrap();
    let video_client = TcpStream::connect(video_addr).unwrap();
    let input_client = TcpStream::connect(input_addr).unwrap();
    for s in [&control_client, &video_client, &input_client] {
        set_socket_timeouts(s);
    }

    (control_client, video_client, input_client, handle)
}

fn call(
    reader: &mut BufReader<TcpStream>,
    writer: &mut BufWriter<TcpStream>,
    request: &ControlRequest,
) -> ControlResponse {
    write_envelope(writer, request).unwrap();
    read_envelope(reader).unwrap().unwrap()
}

#[test]
fn clean_session_handshake_then_shutdown() {
    let tmp = tempfile::tempdir().unwrap();
    let (control, _video, _input, handle) = spawn_fused_session(tmp.path().to_path_buf());

    let mut reader = BufReader::new(control.try_clone().unwrap());
    let mut writer = BufWriter::new(control);

    let hello = call(
        &mut reader,
        &mut writer,
        &ControlRequest::Hello {
            agent: "integration-test".to_string(),
            version: "1.0".to_string(),
        },
    );
    assert!(hello.ok);
    assert_eq!(hello.kind.as_deref(), Some("hello_ack"));
    assert_eq!(hello.width, Some(32));
    assert_eq!(hello.height, Some(32));

    let pong = call(&mut reader, &mut writer, &ControlRequest::Ping);
    assert!(pong.ok);
    assert_eq!(pong.kind.as_deref(), Some("pong"));

    let shutdown = call(&mut reader, &mut writer, &ControlRequest::Shutdown);
    assert!(shutdown.ok);

    drop(writer);
    drop(reader);
    handle.join().unwrap().unwrap();
}

#[test]
fn file_upload_then_download_round_trips_with_matching_sha256() {
    let tmp = tempfile::tempdir().unwrap();
    let (control, _video, _input, handle) = spawn_fused_session(tmp.path().to_path_buf());

    let mut reader = BufReader::new(control.try_clone().unwrap());
    let mut writer = BufWriter::new(control);

    let hello = call(
        &mut reader,
        &mut writer,
        &ControlRequest::Hello {
            agent: "integration-test".to_string(),
            version: "1.0".to_string(),
        },
    );
    assert!(hello.ok);

    let payload = b"the quick brown fox jumps over the lazy dog".to_vec();
    let declared = pcbridge_core::filebridge::sha256_file;
    let _ = declared; // documents which helper a real client would use on a file path

    let mut hasher = sha2::Sha256::new();
    sha2::Digest::update(&mut hasher, &payload);
    let declared_sha256 = hex::encode(sha2::Digest::finalize(hasher));

    write_envelope(
        &mut writer,
        &ControlRequest::FileSend {
            folder: "inbox".to_string(),
            size: payload.len() as u64,
            sha256: Some(declared_sha256.clone()),
            metadata: FileSendMetadata {
                name: "hello.txt".to_string(),
                permissions: None,
            },
        },
    )
    .unwrap();

    let ready: ControlResponse = read_envelope(&mut reader).unwrap().unwrap();
    assert!(ready.ok);
    assert_eq!(ready.kind.as_deref(), Some("ready"));

    writer.write_all(&payload).unwrap();
    writer.flush().unwrap();

    let upload_result: ControlResponse = read_envelope(&mut reader).unwrap().unwrap();
    assert!(upload_result.ok);
    assert_eq!(upload_result.sha256.as_deref(), Some(declared_sha256.as_str()));
    assert_eq!(upload_result.matches, Some(true));

    write_envelope(
        &mut writer,
        &ControlRequest::FileGet {
            folder: "inbox".to_string(),
            filename: "hello.txt".to_string(),
        },
    )
    .unwrap();

    let header: ControlResponse = read_envelope(&mut reader).unwrap().unwrap();
    assert!(header.ok);
    assert_eq!(header.kind.as_deref(), Some("file_data"));
    assert_eq!(header.size, Some(payload.len() as u64));

    let mut downloaded = vec![0u8; payload.len()];
    reader.read_exact(&mut downloaded).unwrap();
    assert_eq!(downloaded, payload);

    let trailer: ControlResponse = read_envelope(&mut reader).unwrap().unwrap();
    assert!(trailer.ok);
    assert_eq!(trailer.sha256.as_deref(), Some(declared_sha256.as_str()));

    call(&mut reader, &mut writer, &ControlRequest::Shutdown);
    drop(writer);
    drop(reader);
    handle.join().unwrap().unwrap();
}

#[test]
fn supervisor_rejects_a_second_control_connection_while_a_session_is_active() {
    let tmp = tempfile::tempdir().unwrap();
    let home = tmp.path().to_path_buf();

    let supervisor = Supervisor::bind("127.0.0.1", 0, 0, 0).unwrap();
    // Ports are chosen by the OS (bind to 0); re-derive them for the test
    // client by rebinding through a second supervisor isn't possible, so
    // this test drives the supervisor via its own fixed high ports
    // instead, picked from outside the documented data range to avoid
    // colliding with a real server under test on the same host.
    drop(supervisor);

    let rpc_port = 32010;
    let video_port = 32011;
    let input_port = 32012;
    let supervisor = Supervisor::bind("127.0.0.1", rpc_port, video_port, input_port).unwrap();

    let builder: SessionBuilder = Box::new(move |control, video, input, hello| {
        let (agent, version) = match hello {
            ControlRequest::Hello { agent, version } => (agent, version),
            _ => ("unknown".to_string(), "0".to_string()),
        };
        let _ = (&agent, &version);
        let params = SessionParams {
            session_id: "test-session".to_string(),
            hostname: "test-host".to_string(),
            agent_version: "0.0.0-test".to_string(),
            injector: Arc::new(InputInjector::with_subprocess()),
            file_bridge: Arc::new(FileBridge::new(home.clone())),
            cursor_source: None,
        };
        Session::new(params, control, video, input, test_capture_factory())
    });

    let supervisor_handle = thread::spawn(move || supervisor.run(builder));

    thread::sleep(Duration::from_millis(100));

    let first_control = TcpStream::connect(("127.0.0.1", rpc_port)).unwrap();
    let first_video = TcpStream::connect(("127.0.0.1", video_port)).unwrap();
    let first_input = TcpStream::connect(("127.0.0.1", input_port)).unwrap();
    set_socket_timeouts(&first_control);

    let mut first_reader = BufReader::new(first_control.try_clone().unwrap());
    let mut first_writer = BufWriter::new(first_control);
    let hello = call(
        &mut first_reader,
        &mut first_writer,
        &ControlRequest::Hello {
            agent: "first".to_string(),
            version: "1.0".to_string(),
        },
    );
    assert!(hello.ok);

    // A second client dials the control port directly while the first
    // session is still active; the supervisor must close it rather than
    // fuse a second session.
    let second_control = TcpStream::connect(("127.0.0.1", rpc_port)).unwrap();
    set_socket_timeouts(&second_control);
    let mut second_buf = [0u8; 16];
    let read_result = (&second_control).read(&mut second_buf);
    assert!(
        matches!(read_result, Ok(0) | Err(_)),
        "second connection should be closed or yield no data, got {read_result:?}"
    );

    call(&mut first_reader, &mut first_writer, &ControlRequest::Shutdown);
    drop(first_writer);
    drop(first_reader);
    drop(first_video);
    drop(first_input);

    supervisor_handle.join().unwrap().unwrap();
}
