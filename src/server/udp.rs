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

//! The datagram/IP (UDP) transport. Stateless at the transport layer: a
//! worker pool pulls datagrams off a single bound socket and dispatches
//! each on whichever worker is free, so concurrent clients never block
//! each other.

use std::{net::UdpSocket, sync::Arc};

use crossbeam_channel::bounded;
use pshell_protocol as wire;
use tracing::{error, info, instrument, warn};

use crate::{consts, server::dispatch};

struct Datagram {
    buf: Vec<u8>,
    from: std::net::SocketAddr,
}

/// Run the UDP shell server, blocking the calling thread forever (or
/// until the socket errors out).
#[instrument(skip(state))]
pub fn serve(state: Arc<dispatch::ServerState>, bind_addr: &str) -> anyhow::Result<()> {
    let socket = UdpSocket::bind(bind_addr)?;
    info!(bind_addr, "udp shell server listening");

    let (tx, rx) = bounded::<Datagram>(64);
    spawn_workers(state, socket.try_clone()?, rx);

    let mut buf = vec![0u8; wire::MAX_PAYLOAD_SIZE + wire::HEADER_SIZE];
    loop {
        let (n, from) = socket.recv_from(&mut buf)?;
        if let Err(e) = tx.send(Datagram { buf: buf[..n].to_vec(), from }) {
            error!("worker pool channel closed: {}", e);
            return Ok(());
        }
    }
}

fn spawn_workers(state: Arc<dispatch::ServerState>, socket: UdpSocket, rx: crossbeam_channel::Receiver<Datagram>) {
    for worker_id in 0..consts::DATAGRAM_WORKER_POOL_SIZE {
        let state = state.clone();
        let socket = socket.try_clone().expect("cloning udp socket for worker");
        let rx = rx.clone();
        std::thread::spawn(move || worker_loop(worker_id, state, socket, rx));
    }
}

fn worker_loop(
    worker_id: usize,
    state: Arc<dispatch::ServerState>,
    socket: UdpSocket,
    rx: crossbeam_channel::Receiver<Datagram>,
) {
    while let Ok(dgram) = rx.recv() {
        if let Err(e) = handle_one(worker_id, &state, &socket, &dgram) {
            warn!(worker_id, "error handling datagram: {:?}", e);
        }
    }
}

fn handle_one(
    worker_id: usize,
    state: &dispatch::ServerState,
    socket: &UdpSocket,
    dgram: &Datagram,
) -> anyhow::Result<()> {
    let request = wire::decode_datagram(&dgram.buf)?;

    let resp_needed = request.header.resp_needed;
    let (header, payload) = dispatch::handle_message(state, &request);
    if !resp_needed {
        return Ok(());
    }

    let payload_size = state.payload_size();
    for (h, chunk) in
        dispatch::fragment_response(header.msg_type, header.status, header.seq_num, &payload, payload_size)
    {
        let frame = wire::encode_datagram(&h, &chunk)?;
        socket.send_to(&frame, dgram.from)?;
    }
    let _ = worker_id;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::registry::{CommandRegistry, DuplicatePolicy};
    use pshell_protocol::{DispatchStatus, MsgHeader};
    use std::net::UdpSocket;

    fn state() -> Arc<dispatch::ServerState> {
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
        Arc::new(dispatch::ServerState::new("udpTest", reg))
    }

    #[test]
    fn handle_one_replies_on_same_socket() {
        let state = state();
        let server_sock = UdpSocket::bind("127.0.0.1:0").unwrap();
        let client_sock = UdpSocket::bind("127.0.0.1:0").unwrap();
        client_sock.connect(server_sock.local_addr().unwrap()).unwrap();

        let req = wire::WireMessage {
            header: MsgHeader::request(wire::MsgType::UserCommand, true, 42),
            payload: b"echo hi".to_vec(),
        };
        let frame = wire::encode_datagram(&req.header, &req.payload).unwrap();
        client_sock.send(&frame).unwrap();

        let mut buf = [0u8; 4096];
        let (n, from) = server_sock.recv_from(&mut buf).unwrap();
        let dgram = Datagram { buf: buf[..n].to_vec(), from };
        handle_one(0, &state, &server_sock, &dgram).unwrap();

        let mut reply = [0u8; 4096];
        let n = client_sock.recv(&mut reply).unwrap();
        let resp = wire::decode_datagram(&reply[..n]).unwrap();
        assert_eq!(resp.header.status, DispatchStatus::Success);
        assert_eq!(resp.payload, b"hi");
    }

    #[test]
    fn handle_one_skips_reply_when_not_needed() {
        let state = state();
        let server_sock = UdpSocket::bind("127.0.0.1:0").unwrap();
        let client_sock = UdpSocket::bind("127.0.0.1:0").unwrap();
        client_sock.set_read_timeout(Some(consts::JOIN_POLL_DURATION)).unwrap();
        client_sock.connect(server_sock.local_addr().unwrap()).unwrap();

        let req = wire::WireMessage {
            header: MsgHeader::request(wire::MsgType::UserCommand, false, 1),
            payload: b"echo hi".to_vec(),
        };
        let frame = wire::encode_datagram(&req.header, &req.payload).unwrap();
        client_sock.send(&frame).unwrap();

        let mut buf = [0u8; 4096];
        let (n, from) = server_sock.recv_from(&mut buf).unwrap();
        let dgram = Datagram { buf: buf[..n].to_vec(), from };
        handle_one(0, &state, &server_sock, &dgram).unwrap();

        let mut reply = [0u8; 4096];
        assert!(client_sock.recv(&mut reply).is_err());
    }
}
