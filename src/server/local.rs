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

//! The in-process local transport: no socket at all, the host's own
//! controlling terminal drives [`crate::readline`] directly. Used when a
//! host program wants an interactive shell without giving up a port or a
//! filesystem socket.

use std::{
    io::{self, Write},
    sync::Arc,
};

use tracing::instrument;

use crate::{
    readline::{CompletionStyle, ReaderSource, Readline, ReadlineState, SourceKind, TabSet},
    server::dispatch,
    tty,
};

/// Drive an interactive session on stdin/stdout until `quit` is entered
/// or stdin closes. Blocks the calling thread.
#[instrument(skip(state))]
pub fn serve(state: Arc<dispatch::ServerState>) -> anyhow::Result<()> {
    state.registry.lock().unwrap().enable_quit();
    let _raw_guard = tty::set_raw_mode()?;

    let mut reader = ReaderSource::new(io::stdin(), SourceKind::Tty);
    let mut writer = io::stdout();

    write!(writer, "{}", dispatch::render_welcome(&state.banner, &state.title, &state.prompt))?;
    writer.flush()?;

    let keywords = { state.registry.lock().unwrap().keywords().map(str::to_string).collect::<Vec<_>>() };
    let mut rl = Readline::new(state.prompt.clone(), TabSet::new(keywords), CompletionStyle::Fast);

    loop {
        match rl.read_line(&mut reader, &mut writer, None)? {
            ReadlineState::Idle | ReadlineState::TimedOut => continue,
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
    use crate::readline::CharSource;
    use std::collections::VecDeque;
    use std::time;

    struct FixedSource {
        bytes: VecDeque<u8>,
    }

    impl CharSource for FixedSource {
        fn read_byte(&mut self, _idle_timeout: Option<time::Duration>) -> io::Result<Option<u8>> {
            Ok(self.bytes.pop_front())
        }

        fn kind(&self) -> SourceKind {
            SourceKind::Tty
        }
    }

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
        reg.enable_quit();
        Arc::new(dispatch::ServerState::new("localTest", reg))
    }

    #[test]
    fn dispatch_loop_runs_one_command_to_completion() {
        let state = state();
        let mut source = FixedSource { bytes: "echo hi\n".bytes().collect() };
        let mut out = Vec::new();
        let keywords = state.registry.lock().unwrap().keywords().map(str::to_string).collect::<Vec<_>>();
        let mut rl = Readline::new(state.prompt.clone(), TabSet::new(keywords), CompletionStyle::Fast);
        let result = rl.read_line(&mut source, &mut out, None).unwrap();
        assert_eq!(result, ReadlineState::Committed("echo hi".to_string()));
        let (_, response) = state.registry.lock().unwrap().run_command("echo hi");
        assert_eq!(response, "hi");
    }
}
