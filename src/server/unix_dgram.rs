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

//! The datagram/local-socket transport: identical dispatch semantics to
//! [`super::udp`], bound to a filesystem socket under `/tmp` instead of
//! an IP port.

use std::{
    os::unix::net::{SocketAddr, UnixDatagram},
    path::{Path, PathBuf},
    sync::Arc,
};

use crossbeam_channel::bounded;
use pshell_protocol as wire;
use tracing::{info, instrument, warn};

use crate::{consts, server::dispatch};

struct Datagram {
    buf: Vec<u8>,
    from: Option<PathBuf>,
}

/// Run the local-socket shell server, blocking forever. The socket file
/// is created at `consts::LOCAL_SOCKET_DIR/<server name>` and removed on
/// return (including the error path, via an RAII guard).
#[instrument(skip(state))]
pub fn serve(state: Arc<dispatch::ServerState>) -> anyhow::Result<()> {
    let sock_path = PathBuf::from(consts::LOCAL_SOCKET_DIR).join(&state.name);
    let _ = std::fs::remove_file(&sock_path); // clean up a stale socket from a prior crash
    let socket = UnixDatagram::bind(&sock_path)?;
    let _guard = SocketCleanup(sock_path.clone());
    info!(?sock_path, "local-socket shell server listening");

    let (tx, rx) = bounded::<Datagram>(64);
    for _ in 0..consts::DATAGRAM_WORKER_POOL_SIZE {
        let state = state.clone();
        let socket = socket.try_clone()?;
        let rx = rx.clone();
        std::thread::spawn(move || worker_loop(state, socket, rx));
    }

    let mut buf = vec![0u8; wire::MAX_PAYLOAD_SIZE + wire::HEADER_SIZE];
    loop {
        let (n, from) = socket.recv_from(&mut buf)?;
        let from_path = addr_path(&from);
        if tx.send(Datagram { buf: buf[..n].to_vec(), from: from_path }).is_err() {
            return Ok(());
        }
    }
}

struct SocketCleanup(PathBuf);
impl Drop for SocketCleanup {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

fn addr_path(addr: &SocketAddr) -> Option<PathBuf> {
    addr.as_pathname().map(Path::to_path_buf)
}

fn worker_loop(state: Arc<dispatch::ServerState>, socket: UnixDatagram, rx: crossbeam_channel::Receiver<Datagram>) {
    while let Ok(dgram) = rx.recv() {
        if let Err(e) = handle_one(&state, &socket, &dgram) {
            warn!("error handling datagram: {:?}", e);
        }
    }
}

fn handle_one(state: &dispatch::ServerState, socket: &UnixDatagram, dgram: &Datagram) -> anyhow::Result<()> {
    let request = wire::decode_datagram(&dgram.buf)?;
    let resp_needed = request.header.resp_needed;
    let (header, payload) = dispatch::handle_message(state, &request);
    if !resp_needed {
        return Ok(());
    }

    let Some(from) = &dgram.from else {
        warn!("cannot reply: peer sent an unbound datagram");
        return Ok(());
    };

    let payload_size = state.payload_size();
    for (h, chunk) in
        dispatch::fragment_response(header.msg_type, header.status, header.seq_num, &payload, payload_size)
    {
        let frame = wire::encode_datagram(&h, &chunk)?;
        socket.send_to(&frame, from)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::registry::{CommandRegistry, DuplicatePolicy};
    use pshell_protocol::{DispatchStatus, MsgHeader, MsgType};
    use tempfile::tempdir;

    fn state() -> dispatch::ServerState {
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
        dispatch::ServerState::new("dgramTest", reg)
    }

    #[test]
    fn handle_one_replies_to_bound_peer() {
        let dir = tempdir().unwrap();
        let server_path = dir.path().join("server.sock");
        let client_path = dir.path().join("client.sock");
        let server_sock = UnixDatagram::bind(&server_path).unwrap();
        let client_sock = UnixDatagram::bind(&client_path).unwrap();
        client_sock.connect(&server_path).unwrap();

        let req = wire::WireMessage {
            header: MsgHeader::request(MsgType::UserCommand, true, 7),
            payload: b"echo yo".to_vec(),
        };
        let frame = wire::encode_datagram(&req.header, &req.payload).unwrap();
        client_sock.send(&frame).unwrap();

        let mut buf = [0u8; 4096];
        let (n, from) = server_sock.recv_from(&mut buf).unwrap();
        let dgram = Datagram { buf: buf[..n].to_vec(), from: addr_path(&from) };
        let state = state();
        handle_one(&state, &server_sock, &dgram).unwrap();

        let mut reply = [0u8; 4096];
        let n = client_sock.recv(&mut reply).unwrap();
        let resp = wire::decode_datagram(&reply[..n]).unwrap();
        assert_eq!(resp.header.status, DispatchStatus::Success);
        assert_eq!(resp.payload, b"yo");
    }

    #[test]
    fn socket_cleanup_removes_file_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cleanup.sock");
        {
            let _socket = UnixDatagram::bind(&path).unwrap();
            let _guard = SocketCleanup(path.clone());
            assert!(path.exists());
        }
        assert!(!path.exists());
    }
}
