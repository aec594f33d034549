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

//! A character-stream line editor with history recall, in-line editing,
//! and tab completion, driven one byte at a time so it can sit either on
//! top of a local terminal or an accepted socket.

use std::{
    collections::VecDeque,
    io::{self, Read},
    time,
};

use tracing::{debug, instrument};

use crate::trie::{Trie, TrieCursor};

const CR: u8 = b'\r';
const LF: u8 = b'\n';
const BS: u8 = 0x08;
const DEL: u8 = 0x7f;
const BEL: u8 = 0x07;
const ESC: u8 = 0x1b;
const TAB: u8 = b'\t';
const IAC: u8 = 0xff;

/// What happened the last time [`Readline::read_line`] returned control to
/// the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadlineState {
    Idle,
    Editing,
    Committed(String),
    TimedOut,
}

/// The kind of character source a [`Readline`] is reading from. `Socket`
/// additionally filters telnet IAC option-negotiation sequences out of
/// the byte stream before they reach the editor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SourceKind {
    Tty,
    Socket,
}

/// An abstract byte source a [`Readline`] reads from one byte at a time.
pub trait CharSource {
    /// Read a single byte, blocking for at most `idle_timeout` (if any).
    /// `Ok(None)` signals the idle timeout elapsed with no byte read.
    fn read_byte(&mut self, idle_timeout: Option<time::Duration>) -> io::Result<Option<u8>>;

    fn kind(&self) -> SourceKind;
}

/// A [`CharSource`] backed by any blocking `Read`, honoring idle timeouts
/// by relying on the underlying descriptor's read timeout (set by the
/// caller, e.g. via `TcpStream::set_read_timeout`).
pub struct ReaderSource<R> {
    inner: R,
    kind: SourceKind,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(inner: R, kind: SourceKind) -> Self {
        ReaderSource { inner, kind }
    }
}

impl<R: Read> CharSource for ReaderSource<R> {
    fn read_byte(&mut self, _idle_timeout: Option<time::Duration>) -> io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.inner.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }
}

/// Fast: a single TAB attempts completion, printing ambiguous candidates
/// immediately and redrawing the line. Classic: a single TAB beeps;
/// a second consecutive TAB prints candidates.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CompletionStyle {
    Fast,
    Classic,
}

/// A bounded ring of previously committed lines, newest last.
struct History {
    lines: VecDeque<String>,
    cap: usize,
    cursor: Option<usize>,
}

impl History {
    fn new(cap: usize) -> Self {
        History { lines: VecDeque::with_capacity(cap), cap, cursor: None }
    }

    fn push(&mut self, line: String) {
        if line.is_empty() {
            return;
        }
        if self.lines.len() == self.cap {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
        self.cursor = None;
    }

    fn prev(&mut self) -> Option<&str> {
        if self.lines.is_empty() {
            return None;
        }
        let idx = match self.cursor {
            None => self.lines.len() - 1,
            Some(0) => 0,
            Some(i) => i - 1,
        };
        self.cursor = Some(idx);
        self.lines.get(idx).map(|s| s.as_str())
    }

    fn next(&mut self) -> Option<&str> {
        match self.cursor {
            None => None,
            Some(i) if i + 1 < self.lines.len() => {
                self.cursor = Some(i + 1);
                self.lines.get(i + 1).map(|s| s.as_str())
            }
            Some(_) => {
                self.cursor = None;
                None
            }
        }
    }
}

/// A keyword completion set, indexed by a [`Trie`] so prefix lookup stays
/// cheap as the registered command list grows.
pub struct TabSet {
    trie: Trie<u8, String, Vec<Option<usize>>>,
    words: Vec<String>,
}

impl TabSet {
    pub fn new<I: IntoIterator<Item = String>>(words: I) -> Self {
        let words: Vec<String> = words.into_iter().collect();
        let mut trie = Trie::new();
        for w in &words {
            trie.insert(w.bytes(), w.clone());
        }
        TabSet { trie, words }
    }

    /// All registered words with the given prefix.
    pub fn complete(&self, prefix: &str) -> Vec<&str> {
        self.words.iter().filter(|w| w.starts_with(prefix)).map(|w| w.as_str()).collect()
    }

    /// True if `prefix` uniquely identifies a word via the trie, and if
    /// so, the identified word.
    pub fn unique_match(&self, prefix: &str) -> Option<&str> {
        let mut cursor = TrieCursor::Start;
        for b in prefix.bytes() {
            cursor = self.trie.advance(cursor, b);
            if let TrieCursor::NoMatch = cursor {
                return None;
            }
        }
        // Only a genuinely unique candidate counts: either the cursor sits
        // exactly on a value with no further branches, or there is
        // exactly one completion overall.
        let candidates = self.complete(prefix);
        if candidates.len() == 1 {
            Some(candidates[0])
        } else {
            self.trie.get(cursor).map(|s| s.as_str())
        }
    }
}

/// The line editor itself. One instance is owned per session.
pub struct Readline {
    buf: Vec<char>,
    cursor: usize,
    history: History,
    tab_set: TabSet,
    completion_style: CompletionStyle,
    prompt: String,
    last_tab_was_beep: bool,
}

impl Readline {
    pub fn new(prompt: impl Into<String>, tab_set: TabSet, completion_style: CompletionStyle) -> Self {
        Readline {
            buf: Vec::new(),
            cursor: 0,
            history: History::new(256),
            tab_set,
            completion_style,
            prompt: prompt.into(),
            last_tab_was_beep: false,
        }
    }

    /// Read and edit a single line to completion, driving `source` and
    /// `out` (for echo and redraw) until a line is committed or the idle
    /// timer fires.
    #[instrument(skip_all)]
    pub fn read_line<S: CharSource, W: io::Write>(
        &mut self,
        source: &mut S,
        out: &mut W,
        idle_timeout: Option<time::Duration>,
    ) -> io::Result<ReadlineState> {
        write!(out, "{}", self.prompt)?;
        out.flush()?;

        loop {
            let byte = match source.read_byte(idle_timeout)? {
                Some(b) => b,
                None => return Ok(ReadlineState::Idle),
            };

            if byte == IAC && source.kind() == SourceKind::Socket {
                self.consume_telnet_option(source)?;
                continue;
            }

            match byte {
                CR | LF => {
                    let line: String = self.buf.iter().collect();
                    writeln!(out)?;
                    self.history.push(line.clone());
                    self.buf.clear();
                    self.cursor = 0;
                    return Ok(ReadlineState::Committed(line));
                }
                BS | DEL => {
                    self.backspace(out)?;
                }
                TAB => {
                    self.complete(out)?;
                }
                ESC => {
                    self.handle_escape(source, out, idle_timeout)?;
                }
                b if (b as char).is_ascii_graphic() || b == b' ' => {
                    self.insert(b as char, out)?;
                }
                _ => {
                    debug!(byte, "ignoring unhandled control byte");
                }
            }
        }
    }

    fn insert(&mut self, c: char, out: &mut impl io::Write) -> io::Result<()> {
        self.buf.insert(self.cursor, c);
        self.cursor += 1;
        write!(out, "{c}")?;
        out.flush()
    }

    fn backspace(&mut self, out: &mut impl io::Write) -> io::Result<()> {
        if self.cursor == 0 {
            return Ok(());
        }
        self.cursor -= 1;
        self.buf.remove(self.cursor);
        write!(out, "\u{8} \u{8}")?;
        out.flush()
    }

    fn redraw(&self, out: &mut impl io::Write) -> io::Result<()> {
        let line: String = self.buf.iter().collect();
        write!(out, "\r{}{}", self.prompt, line)?;
        out.flush()
    }

    fn complete(&mut self, out: &mut impl io::Write) -> io::Result<()> {
        let line: String = self.buf.iter().collect();
        let prefix = line.split_whitespace().next().unwrap_or("");
        if !line.trim_start().eq(prefix) && !prefix.is_empty() {
            // completion only applies to the first word
            return Ok(());
        }

        match self.completion_style {
            CompletionStyle::Fast => {
                if let Some(word) = self.tab_set.unique_match(prefix) {
                    self.buf = word.chars().collect();
                    self.cursor = self.buf.len();
                    self.redraw(out)?;
                } else {
                    let candidates = self.tab_set.complete(prefix);
                    if candidates.len() > 1 {
                        writeln!(out)?;
                        writeln!(out, "{}", candidates.join("  "))?;
                        self.redraw(out)?;
                    }
                }
            }
            CompletionStyle::Classic => {
                if self.last_tab_was_beep {
                    let candidates = self.tab_set.complete(prefix);
                    writeln!(out)?;
                    writeln!(out, "{}", candidates.join("  "))?;
                    self.redraw(out)?;
                    self.last_tab_was_beep = false;
                } else {
                    write!(out, "{}", BEL as char)?;
                    out.flush()?;
                    self.last_tab_was_beep = true;
                }
            }
        }
        Ok(())
    }

    fn recall(&mut self, dir: i8, out: &mut impl io::Write) -> io::Result<()> {
        let line = if dir < 0 { self.history.prev() } else { self.history.next() };
        if let Some(line) = line {
            self.buf = line.chars().collect();
            self.cursor = self.buf.len();
            self.redraw(out)?;
        } else if dir > 0 {
            self.buf.clear();
            self.cursor = 0;
            self.redraw(out)?;
        }
        Ok(())
    }

    fn handle_escape<S: CharSource>(
        &mut self,
        source: &mut S,
        out: &mut impl io::Write,
        idle_timeout: Option<time::Duration>,
    ) -> io::Result<()> {
        // Arrow keys and Home/End arrive as ESC '[' <code>.
        let Some(b1) = source.read_byte(idle_timeout)? else { return Ok(()) };
        if b1 != b'[' {
            return Ok(());
        }
        let Some(b2) = source.read_byte(idle_timeout)? else { return Ok(()) };
        match b2 {
            b'A' => self.recall(-1, out)?, // up
            b'B' => self.recall(1, out)?,  // down
            b'C' => {
                if self.cursor < self.buf.len() {
                    self.cursor += 1;
                }
            }
            b'D' => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                }
            }
            b'H' => self.cursor = 0,
            b'F' => self.cursor = self.buf.len(),
            _ => {}
        }
        Ok(())
    }

    /// Consume a telnet IAC option-negotiation sequence (IAC + command +
    /// option, 3 bytes total including the already-read IAC byte) without
    /// handing any of it to the line editor.
    fn consume_telnet_option<S: CharSource>(&mut self, source: &mut S) -> io::Result<()> {
        let _command = source.read_byte(None)?;
        let _option = source.read_byte(None)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct FixedSource {
        bytes: VecDeque<u8>,
    }

    impl FixedSource {
        fn new(s: &str) -> Self {
            FixedSource { bytes: s.bytes().collect() }
        }
    }

    impl CharSource for FixedSource {
        fn read_byte(&mut self, _idle_timeout: Option<time::Duration>) -> io::Result<Option<u8>> {
            Ok(self.bytes.pop_front())
        }

        fn kind(&self) -> SourceKind {
            SourceKind::Tty
        }
    }

    #[test]
    fn commits_on_newline() {
        let mut rl = Readline::new(
            "> ",
            TabSet::new(["help".to_string(), "history".to_string()]),
            CompletionStyle::Fast,
        );
        let mut src = FixedSource::new("echo hi\n");
        let mut out = Vec::new();
        let result = rl.read_line(&mut src, &mut out, None).unwrap();
        assert_eq!(result, ReadlineState::Committed("echo hi".to_string()));
    }

    #[test]
    fn idle_timeout_yields_idle_state() {
        struct NeverSource;
        impl CharSource for NeverSource {
            fn read_byte(&mut self, _: Option<time::Duration>) -> io::Result<Option<u8>> {
                Ok(None)
            }
            fn kind(&self) -> SourceKind {
                SourceKind::Tty
            }
        }
        let mut rl = Readline::new(">", TabSet::new(Vec::<String>::new()), CompletionStyle::Fast);
        let mut src = NeverSource;
        let mut out = Vec::new();
        let result = rl.read_line(&mut src, &mut out, Some(time::Duration::from_millis(1))).unwrap();
        assert_eq!(result, ReadlineState::Idle);
    }

    #[test]
    fn backspace_removes_last_char() {
        let mut rl = Readline::new(">", TabSet::new(Vec::<String>::new()), CompletionStyle::Fast);
        let mut src = FixedSource::new("ab\u{8}\n");
        let mut out = Vec::new();
        let result = rl.read_line(&mut src, &mut out, None).unwrap();
        assert_eq!(result, ReadlineState::Committed("a".to_string()));
    }

    #[test]
    fn history_recall_round_trips() {
        let mut history = History::new(4);
        history.push("one".to_string());
        history.push("two".to_string());
        assert_eq!(history.prev(), Some("two"));
        assert_eq!(history.prev(), Some("one"));
        assert_eq!(history.next(), Some("two"));
        assert_eq!(history.next(), None);
    }

    #[test]
    fn tab_set_unique_match() {
        let set = TabSet::new(["history".to_string(), "help".to_string()]);
        assert_eq!(set.unique_match("his"), Some("history"));
        assert_eq!(set.unique_match("hel"), Some("help"));
        assert_eq!(set.unique_match("h"), None); // ambiguous: help vs history
    }
}
