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

//! Watchpoints and callback triggers: the two re-evaluated-at-every-site
//! mechanisms the trace filter offers on top of plain level filtering.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

/// What happens to a watchpoint or callback the moment it fires.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TraceControl {
    /// Fire once, then remove.
    Once,
    /// Fire every time the condition holds, stay registered.
    Continuous,
    /// Fire once, then abort the process.
    Abort,
}

/// A `(memory, format, control)` record re-evaluated at every trace site.
/// `peek` reads the current bytes of the watched value; a change from the
/// last observed bytes triggers an emission.
pub struct Watch {
    pub name: String,
    peek: Box<dyn Fn() -> Vec<u8> + Send + Sync>,
    pub control: TraceControl,
    last: Mutex<Option<Vec<u8>>>,
}

impl Watch {
    pub fn new(name: impl Into<String>, control: TraceControl, peek: Box<dyn Fn() -> Vec<u8> + Send + Sync>) -> Self {
        Watch { name: name.into(), peek, control, last: Mutex::new(None) }
    }

    /// Returns `Some(current_bytes)` if the watched memory changed since
    /// the last call, `None` otherwise.
    pub fn poll(&self) -> Option<Vec<u8>> {
        let current = (self.peek)();
        let mut last = self.last.lock().unwrap();
        if last.as_ref() != Some(&current) {
            *last = Some(current.clone());
            Some(current)
        } else {
            None
        }
    }
}

/// A user predicate re-evaluated at every trace site; emits on the
/// `false -> true` transition (or on every true evaluation, for
/// `Continuous`).
pub struct Callback {
    pub name: String,
    predicate: Box<dyn Fn() -> bool + Send + Sync>,
    pub control: TraceControl,
    was_true: AtomicBool,
}

impl Callback {
    pub fn new(name: impl Into<String>, control: TraceControl, predicate: Box<dyn Fn() -> bool + Send + Sync>) -> Self {
        Callback { name: name.into(), predicate, control, was_true: AtomicBool::new(false) }
    }

    /// Returns true if this evaluation should emit a record: either a
    /// fresh `false -> true` transition, or `Continuous` re-firing while
    /// still true.
    pub fn poll(&self) -> bool {
        let now = (self.predicate)();
        let was = self.was_true.swap(now, Ordering::SeqCst);
        match self.control {
            TraceControl::Continuous => now,
            TraceControl::Once | TraceControl::Abort => now && !was,
        }
    }
}
