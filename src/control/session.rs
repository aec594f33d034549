// Copyright 2024 pshell contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Control Client session table: a bounded table of opaque session ids,
//! each owning one socket to a remote Shell Server.

use std::{
    collections::HashMap,
    fmt,
    io::{self},
    net::UdpSocket,
    os::unix::net::UnixDatagram,
    path::PathBuf,
    sync::Mutex,
    time::Duration,
};

use lazy_static::lazy_static;
use pshell_protocol::{self as wire, DispatchStatus, MsgHeader, MsgType};
use tracing::{info, instrument, warn};

use crate::{config, consts};

/// The outcome of a `send_command`/`send_command_extract` call, mirroring
/// the response codes documented for the original control API.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ControlResult {
    Success,
    NotFound,
    InvalidArgCount,
    SendFailure,
    SelectFailure,
    ReceiveFailure,
    Timeout,
    NotConnected,
}

impl fmt::Display for ControlResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Errors raised by `connect`, surfaced to the caller rather than folded
/// into [`ControlResult`] since no session exists yet to carry one.
#[derive(Debug)]
pub enum ConnectError {
    SocketBindFailed(io::Error),
    HostResolveFailed(String),
    SessionTableFull,
    VersionMismatch { client: u8, server: u8 },
    HandshakeFailed,
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectError::SocketBindFailed(e) => write!(f, "socket bind failed: {e}"),
            ConnectError::HostResolveFailed(h) => write!(f, "could not resolve host '{h}'"),
            ConnectError::SessionTableFull => write!(f, "control session table is full"),
            ConnectError::VersionMismatch { client, server } => {
                write!(f, "protocol version mismatch: client speaks {client}, server speaks {server}")
            }
            ConnectError::HandshakeFailed => write!(f, "version handshake with remote server failed"),
        }
    }
}

impl std::error::Error for ConnectError {}

enum Sock {
    Udp(UdpSocket),
    UnixDgram(UnixDatagram),
}

impl Sock {
    fn send(&self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Sock::Udp(s) => s.send(buf),
            Sock::UnixDgram(s) => s.send(buf),
        }
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Sock::Udp(s) => s.recv(buf),
            Sock::UnixDgram(s) => s.recv(buf),
        }
    }

    fn set_read_timeout(&self, d: Option<Duration>) -> io::Result<()> {
        match self {
            Sock::Udp(s) => s.set_read_timeout(d),
            Sock::UnixDgram(s) => s.set_read_timeout(d),
        }
    }
}

struct Session {
    control_name: String,
    sock: Sock,
    default_timeout: Duration,
    next_seq: u32,
    local_unix_path: Option<PathBuf>,
}

impl Session {
    fn alloc_seq(&mut self) -> u32 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        seq
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(path) = &self.local_unix_path {
            let _ = std::fs::remove_file(path);
        }
    }
}

lazy_static! {
    static ref SESSIONS: Mutex<HashMap<u16, Session>> = Mutex::new(HashMap::new());
}

fn resolve_host(remote: &str) -> String {
    match remote {
        s if s == wire::LOCALHOST => "127.0.0.1".to_string(),
        s if s == wire::MYHOST => "127.0.0.1".to_string(),
        s if s == wire::ANYHOST => "0.0.0.0".to_string(),
        s if s == wire::ANYBCAST => "255.255.255.255".to_string(),
        other => other.to_string(),
    }
}

fn allocate_sid(table: &HashMap<u16, Session>) -> Result<u16, ConnectError> {
    if table.len() >= consts::MAX_CONTROL_SESSIONS {
        return Err(ConnectError::SessionTableFull);
    }
    for _ in 0..consts::SID_ALLOC_PROBES {
        let candidate = rand::random::<u16>() % (consts::MAX_CONTROL_SESSIONS as u16);
        if !table.contains_key(&candidate) {
            return Ok(candidate);
        }
    }
    Err(ConnectError::SessionTableFull)
}

/// Open a session to a remote Shell Server. `port == 0` selects a
/// filesystem-socket (UNIX datagram) session bound under `/tmp`;
/// otherwise a UDP session is opened against `remote:port`. Any matching
/// stanza in `pshell-control.conf` overrides the host/port/timeout given
/// here. Performs a `QUERY_VERSION` handshake before returning so a
/// version-incompatible server is refused without ever reaching
/// `send_command`.
#[instrument]
pub fn connect(
    control_name: &str,
    remote: &str,
    port: u16,
    default_timeout_ms: u64,
) -> Result<u16, ConnectError> {
    let stanza = config::load_control_stanza(control_name).ok().flatten();

    let unix_name = stanza.as_ref().and_then(|s| s.get("unix")).map(str::to_string);
    let udp_host = stanza.as_ref().and_then(|s| s.get("udp")).map(str::to_string);
    let cfg_port: Option<u16> = stanza.as_ref().and_then(|s| s.get("port")).and_then(|p| p.parse().ok());
    let cfg_timeout_ms: Option<u64> = stanza.as_ref().and_then(|s| s.get("timeout")).and_then(|t| t.parse().ok());

    let effective_port = cfg_port.unwrap_or(port);
    let default_timeout = Duration::from_millis(cfg_timeout_ms.unwrap_or(default_timeout_ms));

    let (sock, local_unix_path) = if let Some(unix_name) = unix_name {
        open_unix(&unix_name)?
    } else if effective_port == 0 {
        open_unix(remote)?
    } else {
        let host = udp_host.unwrap_or_else(|| resolve_host(remote));
        open_udp(&host, effective_port)?
    };

    let mut session = Session { control_name: control_name.to_string(), sock, default_timeout, next_seq: 1, local_unix_path };
    handshake(&mut session)?;

    let mut table = SESSIONS.lock().unwrap();
    let sid = allocate_sid(&table)?;
    info!(sid, control_name, "control session connected");
    table.insert(sid, session);
    Ok(sid)
}

fn open_unix(server_name: &str) -> Result<(Sock, Option<PathBuf>), ConnectError> {
    let suffix: u32 = rand::random();
    let local_path =
        PathBuf::from(consts::LOCAL_SOCKET_DIR).join(format!("{}{}", consts::CONTROL_CLIENT_SOCKET_PREFIX, suffix));
    let socket = UnixDatagram::bind(&local_path).map_err(ConnectError::SocketBindFailed)?;
    let server_path = PathBuf::from(consts::LOCAL_SOCKET_DIR).join(server_name);
    socket.connect(&server_path).map_err(ConnectError::SocketBindFailed)?;
    Ok((Sock::UnixDgram(socket), Some(local_path)))
}

fn open_udp(host: &str, port: u16) -> Result<(Sock, Option<PathBuf>), ConnectError> {
    let socket = UdpSocket::bind("0.0.0.0:0").map_err(ConnectError::SocketBindFailed)?;
    socket.connect((host, port)).map_err(|_| ConnectError::HostResolveFailed(host.to_string()))?;
    Ok((Sock::Udp(socket), None))
}

fn handshake(session: &mut Session) -> Result<(), ConnectError> {
    let seq = session.alloc_seq();
    let header = MsgHeader::request(MsgType::QueryVersion, true, seq);
    let frame = wire::encode_datagram(&header, &[]).map_err(|_| ConnectError::HandshakeFailed)?;
    session.sock.send(&frame).map_err(|_| ConnectError::HandshakeFailed)?;
    session
        .sock
        .set_read_timeout(Some(Duration::from_secs(2)))
        .map_err(|_| ConnectError::HandshakeFailed)?;

    let mut buf = [0u8; wire::HEADER_SIZE + 1];
    let n = session.sock.recv(&mut buf).map_err(|_| ConnectError::HandshakeFailed)?;
    let response = wire::decode_datagram(&buf[..n]).map_err(|_| ConnectError::HandshakeFailed)?;
    let server_version = *response.payload.first().ok_or(ConnectError::HandshakeFailed)?;
    if server_version != wire::VERSION {
        return Err(ConnectError::VersionMismatch { client: wire::VERSION, server: server_version });
    }
    Ok(())
}

/// Close a session and remove any ephemeral client-side socket it bound.
pub fn disconnect(sid: u16) {
    SESSIONS.lock().unwrap().remove(&sid);
}

/// Close every open session.
pub fn disconnect_all() {
    SESSIONS.lock().unwrap().clear();
}

pub fn set_default_timeout(sid: u16, timeout: Duration) -> bool {
    match SESSIONS.lock().unwrap().get_mut(&sid) {
        Some(s) => {
            s.default_timeout = timeout;
            true
        }
        None => false,
    }
}

/// Send `command` as a `CONTROL_COMMAND`. `timeout` overrides the
/// session's default for this call only; `Some(Duration::ZERO)` or the
/// session default being zero means "fire and forget" (`respNeeded =
/// false`).
#[instrument(skip(command))]
pub fn send_command(sid: u16, timeout: Option<Duration>, command: &str) -> (ControlResult, String) {
    let mut table = SESSIONS.lock().unwrap();
    let Some(session) = table.get_mut(&sid) else {
        return (ControlResult::NotConnected, String::new());
    };

    let effective_timeout = timeout.unwrap_or(session.default_timeout);
    let resp_needed = !effective_timeout.is_zero();
    let seq = session.alloc_seq();
    let header = MsgHeader::request(MsgType::ControlCommand, resp_needed, seq);

    let frame = match wire::encode_datagram(&header, command.as_bytes()) {
        Ok(f) => f,
        Err(_) => return (ControlResult::SendFailure, String::new()),
    };
    if session.sock.send(&frame).is_err() {
        return (ControlResult::SendFailure, String::new());
    }
    if !resp_needed {
        return (ControlResult::Success, String::new());
    }

    if session.sock.set_read_timeout(Some(effective_timeout)).is_err() {
        return (ControlResult::SelectFailure, String::new());
    }

    let mut buf = vec![0u8; wire::MAX_PAYLOAD_SIZE + wire::HEADER_SIZE];
    let n = match session.sock.recv(&mut buf) {
        Ok(n) => n,
        Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => {
            return (ControlResult::Timeout, String::new())
        }
        Err(_) => return (ControlResult::ReceiveFailure, String::new()),
    };

    let response = match wire::decode_datagram(&buf[..n]) {
        Ok(r) => r,
        Err(_) => return (ControlResult::ReceiveFailure, String::new()),
    };
    let status = match response.header.status {
        DispatchStatus::Success => ControlResult::Success,
        DispatchStatus::NotFound => ControlResult::NotFound,
        DispatchStatus::InvalidArgCount => ControlResult::InvalidArgCount,
    };
    (status, String::from_utf8_lossy(&response.payload).into_owned())
}

/// Same as [`send_command`], but truncates the returned text to
/// `buflen.saturating_sub(1)` bytes, matching the fixed-buffer extract
/// API the original library exposes to C callers. A zero timeout yields
/// a warning since no bytes can be collected.
pub fn send_command_extract(
    sid: u16,
    buflen: usize,
    timeout: Option<Duration>,
    command: &str,
) -> (ControlResult, String) {
    if timeout == Some(Duration::ZERO) {
        warn!(sid, "send_command_extract called with a zero timeout, no response will be collected");
    }
    let (status, mut response) = send_command(sid, timeout, command);
    if buflen > 0 && response.len() >= buflen {
        response.truncate(buflen - 1);
    }
    (status, response)
}

/// Query the remote server's command list and return it as printable
/// text, for aggregator help listings.
pub fn extract_commands(sid: u16) -> Result<String, ControlResult> {
    let mut table = SESSIONS.lock().unwrap();
    let Some(session) = table.get_mut(&sid) else { return Err(ControlResult::NotConnected) };

    let seq = session.alloc_seq();
    let header = MsgHeader::request(MsgType::QueryCommands1, true, seq);
    let frame = wire::encode_datagram(&header, &[]).map_err(|_| ControlResult::SendFailure)?;
    session.sock.send(&frame).map_err(|_| ControlResult::SendFailure)?;
    session.sock.set_read_timeout(Some(session.default_timeout)).map_err(|_| ControlResult::SelectFailure)?;

    let mut buf = vec![0u8; wire::MAX_PAYLOAD_SIZE + wire::HEADER_SIZE];
    let n = session.sock.recv(&mut buf).map_err(|e| {
        if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut {
            ControlResult::Timeout
        } else {
            ControlResult::ReceiveFailure
        }
    })?;
    let response = wire::decode_datagram(&buf[..n]).map_err(|_| ControlResult::ReceiveFailure)?;
    Ok(String::from_utf8_lossy(&response.payload).into_owned())
}

/// Send `CONTROL_COMMAND` with `respNeeded = false` directly on `sid`'s
/// socket, bypassing the session's default timeout. Used by multicast
/// fan-out, which never collects responses.
pub(crate) fn send_fire_and_forget(sid: u16, command: &str) -> io::Result<()> {
    let mut table = SESSIONS.lock().unwrap();
    let Some(session) = table.get_mut(&sid) else {
        return Err(io::Error::new(io::ErrorKind::NotConnected, "no such control session"));
    };
    let seq = session.alloc_seq();
    let header = MsgHeader::request(MsgType::ControlCommand, false, seq);
    let frame = wire::encode_datagram(&header, command.as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    session.sock.send(&frame)?;
    Ok(())
}

pub(crate) fn session_control_name(sid: u16) -> Option<String> {
    SESSIONS.lock().unwrap().get(&sid).map(|s| s.control_name.clone())
}

/// A snapshot of every currently-connected session id, for resolving a
/// control name against the live session table (e.g. multicast group
/// membership).
pub(crate) fn all_sids() -> Vec<u16> {
    SESSIONS.lock().unwrap().keys().copied().collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        registry::{CommandRegistry, DuplicatePolicy},
        server::dispatch,
    };

    fn spawn_echo_server() -> (std::net::SocketAddr, std::thread::JoinHandle<()>) {
        let mut reg = CommandRegistry::new(DuplicatePolicy::Reject);
        reg.add_command(
            "echo",
            Box::new(|argv, ctx| ctx.printf(format_args!("{}", argv.join(" ")))),
            "echoes args",
            None,
            0,
            20,
            false,
        )
        .unwrap();
        let state = std::sync::Arc::new(dispatch::ServerState::new("sessionTest", reg));
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = socket.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                let (n, from) = match socket.recv_from(&mut buf) {
                    Ok(r) => r,
                    Err(_) => return,
                };
                let request = match wire::decode_datagram(&buf[..n]) {
                    Ok(r) => r,
                    Err(_) => continue,
                };
                let (header, payload) = dispatch::handle_message(&state, &request);
                if request.header.resp_needed {
                    let frame = wire::encode_datagram(&header, &payload).unwrap();
                    let _ = socket.send_to(&frame, from);
                }
            }
        });
        (addr, handle)
    }

    #[test]
    fn connect_and_send_command_round_trips() {
        let (addr, _handle) = spawn_echo_server();
        let sid = connect("testControl", &addr.ip().to_string(), addr.port(), 500).unwrap();
        let (status, response) = send_command(sid, None, "echo hello world");
        assert_eq!(status, ControlResult::Success);
        assert_eq!(response, "hello world");
        disconnect(sid);
    }

    #[test]
    fn send_command_extract_truncates() {
        let (addr, _handle) = spawn_echo_server();
        let sid = connect("testControl", &addr.ip().to_string(), addr.port(), 500).unwrap();
        let (status, response) = send_command_extract(sid, 4, None, "echo hello world");
        assert_eq!(status, ControlResult::Success);
        assert_eq!(response, "hel");
        disconnect(sid);
    }

    #[test]
    fn not_connected_session_is_reported() {
        let (status, response) = send_command(65000, None, "echo hi");
        assert_eq!(status, ControlResult::NotConnected);
        assert!(response.is_empty());
    }
}
