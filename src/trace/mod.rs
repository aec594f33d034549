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

//! The Dynamic Trace Filter: a process-wide engine hooking the host's own
//! logging macros so trace output can be gated at runtime by level, file,
//! function, and thread, plus watchpoints and callback triggers.
//!
//! The engine itself (`filter`) is usable standalone; [`commands`] wires
//! it into a [`crate::registry::CommandRegistry`] as the `trace`/`set`
//! shell commands when a host wants that surface exposed.

pub mod commands;
pub mod filter;
pub mod levels;
pub mod watch;

use std::sync::Arc;

use lazy_static::lazy_static;

pub use filter::{register_thread, TraceFilterState};
pub use levels::{LevelError, LevelRegistry, TraceLevel};
pub use watch::{Callback, TraceControl, Watch};

lazy_static! {
    /// The process-wide trace filter instance, shared by every trace call
    /// site and by the `trace`/`set` shell commands.
    pub static ref GLOBAL: Arc<TraceFilterState> = Arc::new(TraceFilterState::new());
}

/// The hot-path query every trace call site makes, delegating to
/// [`GLOBAL`]. Most hosts call this through their own logging macro
/// rather than directly.
pub fn is_filter_passed(file: &str, line: u32, function: &str, level: u32) -> bool {
    GLOBAL.is_filter_passed(file, line, function, level)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn global_instance_starts_disabled() {
        assert!(!GLOBAL.is_enabled());
    }
}
