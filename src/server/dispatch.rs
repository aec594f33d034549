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

//! The transport-independent half of the Shell Server: state shared by
//! every transport, the wire-level dispatch entry point, and response
//! fragmentation for oversized payloads.

use std::sync::{atomic::{AtomicUsize, Ordering}, Mutex};

use pshell_protocol::{self as wire, DispatchStatus, MsgHeader, MsgType};
use tracing::{instrument, warn};

use crate::registry::CommandRegistry;

/// State shared by all transports serving the same registry. Owned by an
/// `Arc` so the datagram worker pool and a background server thread can
/// all reach it.
pub struct ServerState {
    pub name: String,
    pub banner: String,
    pub title: String,
    pub prompt: String,
    pub registry: Mutex<CommandRegistry>,
    payload_size: AtomicUsize,
}

impl ServerState {
    pub fn new(name: impl Into<String>, registry: CommandRegistry) -> Self {
        let name = name.into();
        ServerState {
            title: name.clone(),
            name,
            banner: "PSHELL: Command Line Interface".to_string(),
            prompt: "pshell> ".to_string(),
            registry: Mutex::new(registry),
            payload_size: AtomicUsize::new(wire::DEFAULT_PAYLOAD_SIZE),
        }
    }

    pub fn payload_size(&self) -> usize {
        self.payload_size.load(Ordering::Relaxed)
    }

    pub fn set_payload_size(&self, size: usize) {
        let bounded = size.min(wire::MAX_PAYLOAD_SIZE);
        self.payload_size.store(bounded, Ordering::Relaxed);
    }
}

/// Frame the banner/title/prompt triad inside a border sized to the
/// longest line, matching `PSHELL_PRINT_WELCOME_BORDER` in the original
/// implementation.
pub fn render_welcome(banner: &str, title: &str, prompt: &str) -> String {
    let server_line = format!("Shell: {title}");
    let lines = [banner, &server_line, prompt];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    let border: String = "-".repeat(width);

    let mut out = String::new();
    out.push_str(&border);
    out.push('\n');
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(&border);
    out.push('\n');
    out
}

/// Dispatch one decoded request to completion, returning the response
/// header/payload pair a transport should send back (when `resp_needed`
/// was set).
#[instrument(skip(state, request))]
pub fn handle_message(state: &ServerState, request: &wire::WireMessage) -> (MsgHeader, Vec<u8>) {
    let seq = request.header.seq_num;
    match request.header.msg_type {
        MsgType::QueryVersion => {
            (MsgHeader::response(MsgType::QueryVersion, DispatchStatus::Success, seq), vec![wire::VERSION])
        }
        MsgType::QueryPayloadSize => {
            let size = state.payload_size() as u32;
            (
                MsgHeader::response(MsgType::QueryPayloadSize, DispatchStatus::Success, seq),
                size.to_le_bytes().to_vec(),
            )
        }
        MsgType::UpdatePayloadSize => {
            if request.payload.len() == 4 {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(&request.payload);
                state.set_payload_size(u32::from_le_bytes(buf) as usize);
            }
            (MsgHeader::response(MsgType::UpdatePayloadSize, DispatchStatus::Success, seq), Vec::new())
        }
        MsgType::QueryName => {
            (MsgHeader::response(MsgType::QueryName, DispatchStatus::Success, seq), state.name.clone().into_bytes())
        }
        MsgType::QueryBanner => (
            MsgHeader::response(MsgType::QueryBanner, DispatchStatus::Success, seq),
            render_welcome(&state.banner, &state.title, &state.prompt).into_bytes(),
        ),
        MsgType::QueryTitle => {
            (MsgHeader::response(MsgType::QueryTitle, DispatchStatus::Success, seq), state.title.clone().into_bytes())
        }
        MsgType::QueryPrompt => {
            (MsgHeader::response(MsgType::QueryPrompt, DispatchStatus::Success, seq), state.prompt.clone().into_bytes())
        }
        MsgType::QueryCommands1 => {
            let reg = state.registry.lock().unwrap();
            let mut out = String::new();
            for e in reg.entries() {
                out.push_str(&format!("{}  -  {}\n", e.keyword, e.description));
            }
            (MsgHeader::response(MsgType::QueryCommands1, DispatchStatus::Success, seq), out.into_bytes())
        }
        MsgType::QueryCommands2 => {
            let reg = state.registry.lock().unwrap();
            let joined = reg.keywords().collect::<Vec<_>>().join(wire::COMMAND_DELIMITER);
            (MsgHeader::response(MsgType::QueryCommands2, DispatchStatus::Success, seq), joined.into_bytes())
        }
        MsgType::UserCommand | MsgType::ControlCommand => {
            let line = String::from_utf8_lossy(&request.payload).to_string();
            let (status, response) = {
                let mut reg = state.registry.lock().unwrap();
                reg.run_command(&line)
            };
            (MsgHeader::response(request.header.msg_type, status, seq), response.into_bytes())
        }
        MsgType::CommandComplete => {
            warn!("received a CommandComplete frame as a request, ignoring");
            (MsgHeader::response(MsgType::CommandComplete, DispatchStatus::Success, seq), Vec::new())
        }
    }
}

/// Split an oversized response into consecutive frames no larger than
/// `payload_size`, all sharing `seq_num`. Every frame but the last keeps
/// the original response `msg_type`; the last is sent as
/// `CommandComplete` per the response assembly rule in the spec.
pub fn fragment_response(
    msg_type: MsgType,
    status: DispatchStatus,
    seq_num: u32,
    payload: &[u8],
    payload_size: usize,
) -> Vec<(MsgHeader, Vec<u8>)> {
    if payload.is_empty() {
        return vec![(MsgHeader::response(MsgType::CommandComplete, status, seq_num), Vec::new())];
    }

    let chunks: Vec<&[u8]> = payload.chunks(payload_size.max(1)).collect();
    let last = chunks.len() - 1;
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let t = if i == last { MsgType::CommandComplete } else { msg_type };
            (MsgHeader::response(t, status, seq_num), chunk.to_vec())
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::registry::DuplicatePolicy;

    fn state_with(registry: CommandRegistry) -> ServerState {
        ServerState::new("test", registry)
    }

    #[test]
    fn version_query_returns_protocol_version() {
        let state = state_with(CommandRegistry::new(DuplicatePolicy::Reject));
        let req = wire::WireMessage {
            header: MsgHeader::request(MsgType::QueryVersion, true, 1),
            payload: Vec::new(),
        };
        let (header, payload) = handle_message(&state, &req);
        assert_eq!(header.status, DispatchStatus::Success);
        assert_eq!(payload, vec![wire::VERSION]);
    }

    #[test]
    fn user_command_round_trips_printf_output() {
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
        let state = state_with(reg);
        let req = wire::WireMessage {
            header: MsgHeader::request(MsgType::UserCommand, true, 5),
            payload: b"echo hello world".to_vec(),
        };
        let (header, payload) = handle_message(&state, &req);
        assert_eq!(header.status, DispatchStatus::Success);
        assert_eq!(payload, b"hello world");
    }

    #[test]
    fn not_found_status_is_echoed() {
        let state = state_with(CommandRegistry::new(DuplicatePolicy::Reject));
        let req = wire::WireMessage {
            header: MsgHeader::request(MsgType::UserCommand, true, 1),
            payload: b"nope".to_vec(),
        };
        let (header, _) = handle_message(&state, &req);
        assert_eq!(header.status, DispatchStatus::NotFound);
    }

    #[test]
    fn fragment_response_marks_only_last_chunk_complete() {
        let frames = fragment_response(MsgType::UserCommand, DispatchStatus::Success, 9, b"0123456789", 4);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].0.msg_type, MsgType::UserCommand);
        assert_eq!(frames[1].0.msg_type, MsgType::UserCommand);
        assert_eq!(frames[2].0.msg_type, MsgType::CommandComplete);
        assert!(frames.iter().all(|(h, _)| h.seq_num == 9));
        let rejoined: Vec<u8> = frames.iter().flat_map(|(_, p)| p.clone()).collect();
        assert_eq!(rejoined, b"0123456789");
    }

    #[test]
    fn welcome_border_matches_longest_line() {
        let welcome = render_welcome("PSHELL", "myServer", "pshell> ");
        let lines: Vec<&str> = welcome.lines().collect();
        assert_eq!(lines[0], lines[lines.len() - 1]);
    }
}
