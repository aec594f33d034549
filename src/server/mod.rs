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

//! The Shell Server: a registry of host-supplied commands exposed over
//! one of four transports.

pub mod dispatch;
pub mod local;
pub mod tcp;
pub mod udp;
pub mod unix_dgram;

use std::sync::Arc;

use tracing::instrument;

use crate::registry::{CommandRegistry, DuplicatePolicy, Handler, RegistryError};

/// How a Shell Server is reached.
#[derive(Clone, Debug)]
pub enum Transport {
    /// A UDP socket bound to `bind_addr` (e.g. `"0.0.0.0:6001"`).
    Udp { bind_addr: String },
    /// A `SOCK_DGRAM` unix socket at `/tmp/<server name>`.
    UnixDgram,
    /// A single-session TCP listener bound to `bind_addr`.
    Tcp { bind_addr: String },
    /// The host's own controlling terminal, no socket at all.
    Local,
}

/// Whether [`ShellServer::start`] blocks the calling thread or spawns a
/// background thread and returns immediately.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StartMode {
    Blocking,
    NonBlocking,
}

/// Builds a [`ShellServer`] command-by-command before it starts serving.
pub struct ShellServerBuilder {
    name: String,
    banner: String,
    title: String,
    prompt: String,
    registry: CommandRegistry,
}

impl ShellServerBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        ShellServerBuilder {
            name: name.into(),
            banner: "PSHELL: Command Line Interface".to_string(),
            title: String::new(),
            prompt: "PSHELL> ".to_string(),
            registry: CommandRegistry::new(DuplicatePolicy::Reject),
        }
    }

    pub fn banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = banner.into();
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Set the `tracing` level filter pshell itself logs at. Mirrors the
    /// server-side log-level knob documented in `PshellServer.h`.
    pub fn log_level(self, level: &str) -> Self {
        if let Ok(filter) = level.parse::<tracing::Level>() {
            let _ = tracing::subscriber::set_global_default(
                tracing_subscriber::fmt().with_max_level(filter).finish(),
            );
        }
        self
    }

    /// Run `f` against the builder's in-progress registry directly,
    /// for callers wiring in a batch of commands registered elsewhere
    /// (e.g. [`crate::trace::commands::register`]) rather than one at a
    /// time through [`Self::add_command`].
    pub fn with_registry(mut self, f: impl FnOnce(&mut CommandRegistry) -> Result<(), RegistryError>) -> Result<Self, RegistryError> {
        f(&mut self.registry)?;
        Ok(self)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_command(
        mut self,
        keyword: &str,
        handler: Handler,
        description: &str,
        usage: Option<&str>,
        min_args: u8,
        max_args: u8,
        show_usage_on_help: bool,
    ) -> Result<Self, RegistryError> {
        self.registry.add_command(keyword, handler, description, usage, min_args, max_args, show_usage_on_help)?;
        Ok(self)
    }

    pub fn build(self) -> ShellServer {
        let title = if self.title.is_empty() { self.name.clone() } else { self.title };
        let mut state = dispatch::ServerState::new(self.name, self.registry);
        state.banner = self.banner;
        state.title = title;
        state.prompt = self.prompt;
        ShellServer { state: Arc::new(state) }
    }
}

/// A running (or not-yet-started) shell server, sharing its command
/// registry and negotiated payload size across every transport it's
/// asked to serve.
pub struct ShellServer {
    state: Arc<dispatch::ServerState>,
}

impl ShellServer {
    pub fn state(&self) -> Arc<dispatch::ServerState> {
        self.state.clone()
    }

    /// Start serving `transport`. In [`StartMode::Blocking`] mode this
    /// call does not return until the transport errors out (TCP/local)
    /// or is killed (UDP/unix datagram, which never return on success).
    /// In [`StartMode::NonBlocking`] mode a background thread is spawned
    /// and this call returns immediately; errors from that thread are
    /// only visible in the logs.
    #[instrument(skip(self))]
    pub fn start(&self, transport: Transport, mode: StartMode) -> anyhow::Result<()> {
        let state = self.state.clone();
        let run = move || -> anyhow::Result<()> {
            match transport {
                Transport::Udp { bind_addr } => udp::serve(state, &bind_addr),
                Transport::UnixDgram => unix_dgram::serve(state),
                Transport::Tcp { bind_addr } => tcp::serve(state, &bind_addr),
                Transport::Local => local::serve(state),
            }
        };

        match mode {
            StartMode::Blocking => run(),
            StartMode::NonBlocking => {
                std::thread::spawn(move || {
                    if let Err(e) = run() {
                        tracing::error!("shell server transport exited with error: {:?}", e);
                    }
                });
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builder_applies_title_default_from_name() {
        let server = ShellServerBuilder::new("myServer").build();
        assert_eq!(server.state().title, "myServer");
    }

    #[test]
    fn builder_rejects_duplicate_commands() {
        let result = ShellServerBuilder::new("myServer")
            .add_command("foo", Box::new(|_, _| {}), "a", None, 0, 0, false)
            .unwrap()
            .add_command("foo", Box::new(|_, _| {}), "b", None, 0, 0, false);
        assert!(result.is_err());
    }

    #[test]
    fn with_registry_adds_commands_in_bulk() {
        let server = ShellServerBuilder::new("myServer")
            .with_registry(|registry| {
                registry.add_command("foo", Box::new(|_, _| {}), "a", None, 0, 0, false)?;
                registry.add_command("bar", Box::new(|_, _| {}), "b", None, 0, 0, false)
            })
            .unwrap()
            .build();
        let state = server.state();
        let registry = state.registry.lock().unwrap();
        let keywords: Vec<&str> = registry.keywords().collect();
        assert!(keywords.contains(&"foo") && keywords.contains(&"bar"));
    }
}
