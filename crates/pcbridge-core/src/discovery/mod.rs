//! Discovery & port negotiation (spec.md §4.1).
//!
//! The server permanently listens on the fixed discovery port and answers
//! with the triplet of ports it is *already* bound to — never spawning
//! fresh listeners per negotiation, which would exhaust ports under
//! repeated reconnect attempts. The client enumerates local candidate
//! ports (informational only; the server's reply is authoritative),
//! negotiates, then persists the triplet as "last known".

use serde::{Deserialize, Serialize};
use std::io::{BufReader, BufWriter};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use crate::error::{BridgeError, Result};
use crate::protocol::{read_envelope, write_envelope};

pub const NEGOTIATE_DEADLINE: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortTriplet {
    pub rpc: u16,
    pub video: u16,
    pub input: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DiscoveryRequest {
    Negotiate {
        #[serde(default)]
        candidate_ports: Vec<u16>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NegotiateResponse {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    rpc: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    video: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Server side: bind the fixed discovery port and answer one negotiation
/// at a time. `session_active` is queried fresh for every accepted
/// connection so the answer always reflects current supervisor state.
pub struct DiscoveryListener {
    listener: TcpListener,
}

impl DiscoveryListener {
    pub fn bind(host: &str, port: u16) -> Result<Self> {
        let listener = TcpListener::bind((host, port))?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept and service exactly one negotiation attempt. Intended to be
    /// called in a loop from a dedicated accept thread.
    pub fn serve_one(
        &self,
        triplet: PortTriplet,
        session_active: impl Fn() -> bool,
    ) -> Result<()> {
        let (stream, _addr) = self.listener.accept()?;
        stream.set_read_timeout(Some(NEGOTIATE_DEADLINE))?;
        stream.set_write_timeout(Some(NEGOTIATE_DEADLINE))?;
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = BufWriter::new(stream);

        let request: Option<DiscoveryRequest> = read_envelope(&mut reader)?;
        let Some(DiscoveryRequest::Negotiate { .. }) = request else {
            return Err(BridgeError::protocol("expected negotiate envelope"));
        };

        let response = if session_active() {
            NegotiateResponse {
                ok: false,
                rpc: None,
                video: None,
                input: None,
                error: Some("session already active".to_string()),
            }
        } else {
            NegotiateResponse {
                ok: true,
                rpc: Some(triplet.rpc),
                video: Some(triplet.video),
                input: Some(triplet.input),
                error: None,
            }
        };

        write_envelope(&mut writer, &response)
    }
}

/// Client side: enumerate local free candidate ports in the data range
/// (informational) then negotiate against the discovery port.
pub fn enumerate_candidate_ports(range: (u16, u16), count: usize) -> Vec<u16> {
    let mut found = Vec::with_capacity(count);
    for port in range.0..=range.1 {
        if found.len() >= count {
            break;
        }
        if TcpListener::bind(("127.0.0.1", port)).is_ok() {
            found.push(port);
        }
    }
    found
}

pub fn negotiate(
    host: &str,
    discovery_port: u16,
    candidate_ports: Vec<u16>,
    timeout: Duration,
) -> Result<PortTriplet> {
    let stream = TcpStream::connect((host, discovery_port))?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    stream.set_nodelay(true)?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = BufWriter::new(stream);

    write_envelope(
        &mut writer,
        &DiscoveryRequest::Negotiate { candidate_ports },
    )?;

    let response: NegotiateResponse = read_envelope(&mut reader)?
        .ok_or_else(|| BridgeError::protocol("discovery connection closed before reply"))?;

    if !response.ok {
        return Err(BridgeError::operation(
            response.error.unwrap_or_else(|| "negotiation failed".into()),
        ));
    }

    Ok(PortTriplet {
        rpc: response
            .rpc
            .ok_or_else(|| BridgeError::protocol("missing rpc port in negotiate reply"))?,
        video: response
            .video
            .ok_or_else(|| BridgeError::protocol("missing video port in negotiate reply"))?,
        input: response
            .input
            .ok_or_else(|| BridgeError::protocol("missing input port in negotiate reply"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn negotiation_returns_the_bound_triplet_when_no_session_active() {
        let listener = DiscoveryListener::bind("127.0.0.1", 0).unwrap();
        let addr = listener.local_addr().unwrap();
        let triplet = PortTriplet {
            rpc: 22010,
            video: 22011,
            input: 22012,
        };

        let server = thread::spawn(move || {
            listener.serve_one(triplet, || false).unwrap();
        });

        let got = negotiate(
            "127.0.0.1",
            addr.port(),
            vec![],
            Duration::from_secs(2),
        )
        .unwrap();
        assert_eq!(got, triplet);
        server.join().unwrap();
    }

    #[test]
    fn negotiation_is_rejected_while_a_session_is_active() {
        let listener = DiscoveryListener::bind("127.0.0.1", 0).unwrap();
        let addr = listener.local_addr().unwrap();
        let triplet = PortTriplet {
            rpc: 22010,
            video: 22011,
            input: 22012,
        };
        let active = Arc::new(AtomicBool::new(true));
        let active_clone = active.clone();

        let server = thread::spawn(move || {
            listener
                .serve_one(triplet, || active_clone.load(Ordering::SeqCst))
                .unwrap();
        });

        let result = negotiate("127.0.0.1", addr.port(), vec![], Duration::from_secs(2));
        assert!(result.is_err());
        server.join().unwrap();
    }
}
