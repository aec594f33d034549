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

//! The command registry and the transport-independent dispatch algorithm.
//!
//! A [`CommandRegistry`] is an ordered table of [`CommandEntry`] plus a
//! handful of auto-installed built-ins (`help`, `quit`, `history`,
//! `batch`). Dispatch turns one received line into a handler invocation
//! and a filled-in [`ResponseBuffer`], independent of which transport the
//! line arrived on.

use std::{collections::HashSet, fmt, fs, io::BufRead};

use pshell_protocol::DispatchStatus;
use tracing::{debug, instrument, warn};

use crate::{consts, tokenizer};

/// Errors raised when registering a command. These are never surfaced to
/// a remote user; a program that hits one at startup is expected to abort
/// after printing the diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    DuplicateKeyword(String),
    InvalidUsage(String),
    TooManyArgs(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateKeyword(k) => write!(f, "duplicate keyword '{k}'"),
            RegistryError::InvalidUsage(k) => write!(f, "invalid usage for command '{k}'"),
            RegistryError::TooManyArgs(k) => {
                write!(f, "command '{k}' exceeds the {} arg ceiling", consts::MAX_COMMAND_ARGS)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// A handler registered against a keyword. Receives the argument vector
/// (excluding the keyword itself) and a [`DispatchContext`] through which
/// it writes its response.
pub type Handler = Box<dyn Fn(&[&str], &mut DispatchContext) + Send + Sync>;

/// One entry in the command table.
pub struct CommandEntry {
    pub keyword: String,
    pub handler: Handler,
    pub description: String,
    pub usage: Option<String>,
    pub min_args: u8,
    pub max_args: u8,
    pub show_usage_on_help: bool,
}

impl CommandEntry {
    fn validate(
        keyword: &str,
        usage: &Option<String>,
        min_args: u8,
        max_args: u8,
    ) -> Result<(), RegistryError> {
        if keyword.is_empty() || keyword.chars().any(|c| c.is_whitespace()) {
            return Err(RegistryError::InvalidUsage(keyword.to_string()));
        }
        if min_args > max_args {
            return Err(RegistryError::InvalidUsage(keyword.to_string()));
        }
        if max_args > consts::MAX_COMMAND_ARGS {
            return Err(RegistryError::TooManyArgs(keyword.to_string()));
        }
        if usage.is_none() && (min_args != 0 || max_args != 0) {
            return Err(RegistryError::InvalidUsage(keyword.to_string()));
        }
        Ok(())
    }
}

/// Per-dispatch accumulator a handler writes its output into. Scoped to a
/// single request/response cycle; never shared across threads or
/// sessions, per the Design Notes' guidance on response buffers.
pub struct DispatchContext {
    buf: String,
    is_help: bool,
    usage: Option<String>,
    current_keyword: String,
    flush_requested: bool,
}

impl DispatchContext {
    fn new(usage: Option<String>, current_keyword: String, is_help: bool) -> Self {
        DispatchContext { buf: String::new(), is_help, usage, current_keyword, flush_requested: false }
    }

    /// Append formatted text to the response buffer.
    pub fn printf(&mut self, args: fmt::Arguments<'_>) {
        use fmt::Write;
        let _ = self.buf.write_fmt(args);
    }

    /// Request an intermediate flush of whatever has accumulated so far.
    /// Meaningful only for datagram transports; a no-op on stream/local
    /// transports (see spec's Open Question on `flush` semantics).
    pub fn flush(&mut self) {
        self.flush_requested = true;
    }

    pub fn take_flush_request(&mut self) -> bool {
        std::mem::replace(&mut self.flush_requested, false)
    }

    /// Append a short keepalive tick plus an implicit flush, used by
    /// long-running handlers to avoid tripping a caller's response
    /// timeout.
    pub fn wheel(&mut self, prefix: Option<&str>) {
        const SPOKES: [char; 4] = ['|', '/', '-', '\\'];
        let tick = self.buf.chars().filter(|&c| SPOKES.contains(&c)).count() % SPOKES.len();
        if let Some(p) = prefix {
            self.buf.push_str(p);
        }
        self.buf.push(SPOKES[tick]);
        self.buf.push('\r');
        self.flush();
    }

    pub fn march(&mut self, s: &str) {
        self.buf.push_str(s);
        self.flush();
    }

    /// Emit the registered usage string, if any.
    pub fn show_usage(&mut self) {
        if let Some(usage) = self.usage.clone() {
            self.buf.push_str(&usage);
            self.buf.push('\n');
        }
    }

    /// True if the current invocation was triggered by a trailing `?`/`-h`
    /// and the command did not auto-show usage.
    pub fn is_help(&self) -> bool {
        self.is_help
    }

    /// The keyword this invocation was dispatched under. Useful for a
    /// handler registered under multiple keywords (the aggregator
    /// pattern) to tell them apart.
    pub fn current_keyword(&self) -> &str {
        &self.current_keyword
    }

    pub fn into_response(self) -> String {
        self.buf
    }
}

/// Whether a registry permits the same keyword to be registered more than
/// once. Used by the control-client aggregator, which fans a single
/// handler out under many remote servers' keywords.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DuplicatePolicy {
    Reject,
    Allow,
}

pub struct CommandRegistry {
    entries: Vec<CommandEntry>,
    keywords: HashSet<String>,
    duplicate_policy: DuplicatePolicy,
    history: Vec<String>,
    history_cap: usize,
    has_quit: bool,
}

impl CommandRegistry {
    pub fn new(duplicate_policy: DuplicatePolicy) -> Self {
        CommandRegistry {
            entries: Vec::new(),
            keywords: HashSet::new(),
            duplicate_policy,
            history: Vec::new(),
            history_cap: 256,
            has_quit: false,
        }
    }

    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self, handler))]
    pub fn add_command(
        &mut self,
        keyword: &str,
        handler: Handler,
        description: &str,
        usage: Option<&str>,
        min_args: u8,
        max_args: u8,
        show_usage_on_help: bool,
    ) -> Result<(), RegistryError> {
        let usage = usage.map(str::to_string);
        CommandEntry::validate(keyword, &usage, min_args, max_args)?;

        if self.duplicate_policy == DuplicatePolicy::Reject && self.keywords.contains(keyword) {
            return Err(RegistryError::DuplicateKeyword(keyword.to_string()));
        }

        debug!(keyword, "registering command");
        self.keywords.insert(keyword.to_string());
        self.entries.push(CommandEntry {
            keyword: keyword.to_string(),
            handler,
            description: description.to_string(),
            usage,
            min_args,
            max_args,
            show_usage_on_help,
        });
        Ok(())
    }

    /// Install the built-in `quit` command. Only meaningful for TCP and
    /// local transports; the dispatcher treats it as a signal rather than
    /// inspecting the response text.
    pub fn enable_quit(&mut self) {
        self.has_quit = true;
    }

    pub fn quit_enabled(&self) -> bool {
        self.has_quit
    }

    pub fn entries(&self) -> &[CommandEntry] {
        &self.entries
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.keyword.as_str())
    }

    fn find(&self, keyword: &str) -> Option<&CommandEntry> {
        self.entries.iter().find(|e| e.keyword == keyword)
    }

    /// Dispatch one already-tokenized line locally, without involving any
    /// transport. Used both by the in-process local transport and
    /// directly by host code as a bootstrap/meta-command hook
    /// (`run_command` in the original API).
    #[instrument(skip(self))]
    pub fn run_command(&mut self, line: &str) -> (DispatchStatus, String) {
        let toks = tokenizer::tokenize_whitespace(line);
        if toks.is_empty() {
            return (DispatchStatus::Success, String::new());
        }

        self.history.push(line.to_string());
        if self.history.len() > self.history_cap {
            self.history.remove(0);
        }

        let keyword = toks.get(0).unwrap();
        let rest: Vec<&str> = toks.iter().skip(1).copied().collect();

        match keyword {
            "help" | "?" | "-h" => (DispatchStatus::Success, self.render_help()),
            "history" => (DispatchStatus::Success, self.render_history()),
            "quit" if self.has_quit => (DispatchStatus::Success, String::new()),
            "batch" => self.run_batch(&rest),
            _ => self.dispatch_user_command(keyword, &rest),
        }
    }

    fn dispatch_user_command(&mut self, keyword: &str, argv: &[&str]) -> (DispatchStatus, String) {
        let Some(entry_idx) = self.entries.iter().position(|e| e.keyword == keyword) else {
            warn!(keyword, "command not found");
            return (DispatchStatus::NotFound, "command not found\n".to_string());
        };

        let argc = argv.len() as u8;
        let (min_args, max_args, show_usage_on_help, usage) = {
            let e = &self.entries[entry_idx];
            (e.min_args, e.max_args, e.show_usage_on_help, e.usage.clone())
        };

        if argc < min_args || argc > max_args {
            let mut ctx = DispatchContext::new(usage, keyword.to_string(), false);
            if show_usage_on_help {
                ctx.show_usage();
            }
            return (DispatchStatus::InvalidArgCount, ctx.into_response());
        }

        let is_help = matches!(argv.last(), Some(&"?") | Some(&"-h"));
        let mut ctx = DispatchContext::new(usage, keyword.to_string(), is_help);
        if is_help && show_usage_on_help {
            ctx.show_usage();
            return (DispatchStatus::Success, ctx.into_response());
        }

        (self.entries[entry_idx].handler)(argv, &mut ctx);
        (DispatchStatus::Success, ctx.into_response())
    }

    fn render_help(&self) -> String {
        let mut out = String::new();
        for e in &self.entries {
            out.push_str(&format!("{}  -  {}\n", e.keyword, e.description));
        }
        out
    }

    fn render_history(&self) -> String {
        let mut out = String::new();
        for (i, line) in self.history.iter().enumerate() {
            out.push_str(&format!("{:>4}  {}\n", i + 1, line));
        }
        out
    }

    fn run_batch(&mut self, argv: &[&str]) -> (DispatchStatus, String) {
        let Some(path) = argv.first() else {
            return (DispatchStatus::InvalidArgCount, "usage: batch <file>\n".to_string());
        };

        let file = match fs::File::open(path) {
            Ok(f) => f,
            Err(e) => {
                return (DispatchStatus::Success, format!("ERROR: could not open '{path}': {e}\n"))
            }
        };

        let mut out = String::new();
        for line in std::io::BufReader::new(file).lines().map_while(Result::ok) {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let (_, response) = self.run_command(trimmed);
            out.push_str(&response);
        }
        (DispatchStatus::Success, out)
    }
}
