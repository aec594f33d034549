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

//! Raw-mode terminal handling for the local (in-process) transport, so
//! [`crate::readline`] sees one byte at a time instead of a
//! line-buffered, canonically-echoed stream.

use std::{
    io,
    os::unix::io::{AsRawFd, BorrowedFd, RawFd},
};

use anyhow::Context;
use nix::{
    sys::termios::{self, ControlFlags, InputFlags, LocalFlags, OutputFlags, SetArg},
    unistd::isatty,
};
use tracing::error;

/// Put stdin into raw, unechoed mode, restoring the previous settings
/// when the guard drops. A no-op (with `is_tty()` false) when stdin
/// isn't attached to a terminal, e.g. under a test harness or when piped.
pub fn set_raw_mode() -> anyhow::Result<RawModeGuard> {
    let fd = io::stdin().as_raw_fd();
    let borrowed_fd = unsafe { BorrowedFd::borrow_raw(fd) };
    if !isatty(borrowed_fd)? {
        return Ok(RawModeGuard { fd, old: None });
    }

    let old = termios::tcgetattr(borrowed_fd).context("grabbing term flags")?;
    let mut new = old.clone();
    new.input_flags &= !(InputFlags::IGNBRK
        | InputFlags::BRKINT
        | InputFlags::PARMRK
        | InputFlags::ISTRIP
        | InputFlags::INLCR
        | InputFlags::IGNCR
        | InputFlags::ICRNL
        | InputFlags::IXON);
    new.output_flags &= !OutputFlags::OPOST;
    new.local_flags &=
        !(LocalFlags::ECHO | LocalFlags::ECHONL | LocalFlags::ICANON | LocalFlags::ISIG | LocalFlags::IEXTEN);
    new.control_flags &= !(ControlFlags::CSIZE | ControlFlags::PARENB);
    new.control_flags |= ControlFlags::CS8;
    termios::tcsetattr(borrowed_fd, SetArg::TCSANOW, &new).context("setting raw mode")?;

    Ok(RawModeGuard { fd, old: Some(old) })
}

pub struct RawModeGuard {
    fd: RawFd,
    old: Option<termios::Termios>,
}

impl RawModeGuard {
    pub fn is_tty(&self) -> bool {
        self.old.is_some()
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Some(old) = &self.old {
            let borrowed_fd = unsafe { BorrowedFd::borrow_raw(self.fd) };
            if let Err(e) = termios::tcsetattr(borrowed_fd, SetArg::TCSANOW, old) {
                error!("error restoring terminal settings: {:?}", e);
            }
        }
    }
}
