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

//! pshell is an embeddable, in-process command shell framework. A host
//! program registers commands against a [`server::ShellServer`], which
//! can then be driven interactively over UDP, a UNIX datagram socket, a
//! TCP socket, or the host's own controlling terminal, or
//! programmatically from another process via [`control`]. A companion
//! [`trace`] engine lets the host instrument its own trace call sites
//! and adjust their verbosity at runtime through the same shell.
//!
//! This crate does not parse its own command line arguments or own a
//! `main`; a host binary links it and decides how it is configured and
//! started. See the `demos` crate in this workspace for worked examples.

use std::{fs, io, path::Path, sync::Mutex};

use anyhow::Context;
use tracing_subscriber::fmt::format::FmtSpan;

pub mod config;
pub mod consts;
pub mod control;
pub mod readline;
pub mod registry;
pub mod server;
pub mod signals;
pub mod tokenizer;
pub mod trace;
mod trie;
pub mod tty;

/// Initialize a `tracing` subscriber at `level`, writing to `log_file` if
/// given or to stderr otherwise. Hosts that already run their own
/// subscriber should skip this and just use the `tracing` macros
/// directly; pshell's own spans and events work with any subscriber.
pub fn init_logging(level: tracing::Level, log_file: Option<&Path>) -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_thread_ids(true)
        .with_target(false)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    match log_file {
        Some(path) => {
            let file = fs::File::create(path).context("creating log file")?;
            builder.with_writer(Mutex::new(file)).init();
        }
        None => {
            builder.with_writer(io::stderr).init();
        }
    }
    Ok(())
}
