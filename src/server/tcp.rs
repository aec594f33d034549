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

//! The stream/IP (TCP) transport: one interactive session at a time,
//! driven by the [`crate::readline`] line editor, torn down after
//! `consts::TCP_IDLE_TIMEOUT` of inactivity.

use std::{
    io::Write,
    net::{TcpListener, TcpStream},
    sync::Arc,
};

use tracing::{info, instrument, warn};

use crate::{
    consts,
    readline::{CompletionStyle, ReaderSource, Readline, ReadlineState, SourceKind, TabSet},
    server::dispatch,
};

/// Accept and serve TCP sessions one at a time, blocking forever. Only
/// one client is attached at any moment, matching the original library's
/// single-session TCP behavior.
#[instrument(skip(state))]
pub fn serve(state: Arc<dispatch::ServerState>, bind_addr: &str) -> anyhow::Result<()> {
    state.registry.lock().unwrap().enable_quit();
    let listener = TcpListener::bind(bind_addr)?;
    info!(bind_addr, "tcp shell server listening");

    loop {
        let (stream, peer) = listener.accept()?;
        info!(?peer, "tcp client connected");
        if let Err(e) = serve_one(&state, stream) {
            warn!(?peer, "session ended with error: {:?}", e);
        }
        info!(?peer, "tcp client disconnected");
    }
}

fn serve_one(state: &dispatch::ServerState, stream: TcpStream) -> anyhow::Result<()> {
    stream.set_read_timeout(Some(consts::TCP_IDLE_TIMEOUT))?;
    let mut reader = ReaderSource::new(stream.try_clone()?, SourceKind::Socket);
    let mut writer = stream;

    write!(writer, "{}", dispatch::render_welcome(&state.banner, &state.title, &state.prompt))?;
    writer.flush()?;

    let keywords = { state.registry.lock().unwrap().keywords().map(str::to_string).collect::<Vec<_>>() };
    let mut rl = Readline::new(state.prompt.clone(), TabSet::new(keywords), CompletionStyle::Fast);

    loop {
        match rl.read_line(&mut reader, &mut writer, Some(consts::TCP_IDLE_TIMEOUT))? {
            ReadlineState::Idle | ReadlineState::TimedOut => {
                writeln!(writer, "idle session timeout")?;
                return Ok(());
            }
            ReadlineState::Editing => continue,
            ReadlineState::Committed(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let (_, response) = {
                    let mut reg = state.registry.lock().unwrap();
                    reg.run_command(trimmed)
                };
                write!(writer, "{response}")?;
                writer.flush()?;
                if trimmed.split_whitespace().next() == Some("quit") {
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::registry::{CommandRegistry, DuplicatePolicy};
    use std::io::{BufRead, BufReader};

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
        Arc::new(dispatch::ServerState::new("tcpTest", reg))
    }

    #[test]
    fn single_session_echoes_and_quits() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let state = state();

        let server_thread = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            serve_one(&state, stream).unwrap();
        });

        let mut client = TcpStream::connect(addr).unwrap();
        client.set_read_timeout(Some(std::time::Duration::from_secs(2))).unwrap();
        write!(client, "echo hi there\nquit\n").unwrap();
        client.flush().unwrap();

        let mut reader = BufReader::new(client);
        let mut lines = Vec::new();
        let mut line = String::new();
        while reader.read_line(&mut line).unwrap_or(0) > 0 {
            lines.push(std::mem::take(&mut line));
        }
        server_thread.join().unwrap();
        assert!(lines.iter().any(|l| l.contains("hi there")));
    }
}
