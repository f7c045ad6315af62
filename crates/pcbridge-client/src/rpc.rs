//! The control-channel link: a single mutex serializes every write and
//! every synchronous read so an in-flight request's response can never be
//! stolen by the push reader (spec.md §4.3, §4.7).

use std::io::{BufReader, BufWriter, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use pcbridge_core::error::{BridgeError, Result};
use pcbridge_core::filebridge::{receive_exact, send_exact};
use pcbridge_core::protocol::{read_envelope, write_envelope, ControlPush, ControlRequest, ControlResponse};

/// Short enough that the push reader's poll loop stays responsive, long
/// enough that it rarely wakes the socket for nothing.
const POLL_TIMEOUT: Duration = Duration::from_millis(150);

struct Link {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

pub struct RpcClient {
    link: Mutex<Link>,
    call_timeout: Duration,
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

impl RpcClient {
    pub fn new(stream: TcpStream, call_timeout: Duration) -> Result<Self> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(POLL_TIMEOUT))?;
        let reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream);
        Ok(Self {
            link: Mutex::new(Link { reader, writer }),
            call_timeout,
        })
    }

    /// Sends one request and waits for its response. Holds the link lock
    /// for the whole round trip, so the push reader's `try_lock` simply
    /// fails and moves on rather than racing for the reply.
    pub fn call(&self, request: &ControlRequest) -> Result<ControlResponse> {
        let mut link = self.link.lock();
        write_envelope(&mut link.writer, request)?;
        let deadline = Instant::now() + self.call_timeout;
        loop {
            match read_envelope(&mut link.reader) {
                Ok(Some(resp)) => return Ok(resp),
                Ok(None) => return Err(BridgeError::protocol("control socket closed")),
                Err(BridgeError::Transport(e)) if is_timeout(&e) => {
                    if Instant::now() >= deadline {
                        return Err(BridgeError::operation("rpc call timed out"));
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Uploads `data` under `folder/name`, declaring its SHA-256 up front
    /// so the server can flag a mismatch (spec.md §4.4 upload).
    pub fn upload(
        &self,
        folder: &str,
        name: &str,
        mut src: impl Read,
        size: u64,
        declared_sha256: Option<String>,
    ) -> Result<ControlResponse> {
        let mut link = self.link.lock();
        let request = ControlRequest::FileSend {
            folder: folder.to_string(),
            size,
            sha256: declared_sha256,
            metadata: pcbridge_core::protocol::control::FileSendMetadata {
                name: name.to_string(),
                permissions: None,
            },
        };
        write_envelope(&mut link.writer, &request)?;

        let ready = read_blocking::<ControlResponse>(&mut link.reader, self.call_timeout)?;
        if !ready.ok {
            return Ok(ready);
        }

        send_exact(&mut src, size, &mut link.writer)?;
        read_blocking::<ControlResponse>(&mut link.reader, self.call_timeout)
    }

    /// Downloads `folder/filename` into `dest`, returning the server's
    /// streamed SHA-256 alongside the response envelope.
    pub fn download(&self, folder: &str, filename: &str, mut dest: impl Write) -> Result<ControlResponse> {
        let mut link = self.link.lock();
        let request = ControlRequest::FileGet {
            folder: folder.to_string(),
            filename: filename.to_string(),
        };
        write_envelope(&mut link.writer, &request)?;

        let header = read_blocking::<ControlResponse>(&mut link.reader, self.call_timeout)?;
        if !header.ok {
            return Ok(header);
        }
        let size = header
            .size
            .ok_or_else(|| BridgeError::protocol("file_data response missing size"))?;
        let computed = receive_exact(&mut link.reader, size, &mut dest)?;

        let trailer = read_blocking::<ControlResponse>(&mut link.reader, self.call_timeout)?;
        Ok(ControlResponse {
            sha256: trailer.sha256.or(Some(computed)),
            ..trailer
        })
    }

    /// Attempts one push envelope without ever blocking the requester:
    /// a failed `try_lock` or an empty read both mean "nothing to do".
    pub fn try_read_push(&self) -> Option<ControlPush> {
        let mut link = self.link.try_lock()?;
        match read_envelope::<_, ControlPush>(&mut link.reader) {
            Ok(Some(push)) => Some(push),
            _ => None,
        }
    }
}

fn read_blocking<T: serde::de::DeserializeOwned>(
    reader: &mut BufReader<TcpStream>,
    timeout: Duration,
) -> Result<T> {
    let deadline = Instant::now() + timeout;
    loop {
        match read_envelope(reader) {
            Ok(Some(v)) => return Ok(v),
            Ok(None) => return Err(BridgeError::protocol("control socket closed mid-transfer")),
            Err(BridgeError::Transport(e)) if is_timeout(&e) => {
                if Instant::now() >= deadline {
                    return Err(BridgeError::operation("transfer timed out"));
                }
            }
            Err(e) => return Err(e),
        }
    }
}
