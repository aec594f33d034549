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

//! The trace filter's process-wide state and its hot-path query,
//! `is_filter_passed`. Every trace call site consults this, so the
//! enabled bit and current mask live behind atomics; everything else
//! (locality filters, watchpoints, callbacks) sits behind one coarse
//! mutex, matching the Design Notes' guidance to avoid scattered statics.

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Mutex,
    },
};

use tracing::warn;

use crate::trace::{
    levels::LevelRegistry,
    watch::{Callback, TraceControl, Watch},
};

thread_local! {
    static CURRENT_THREAD_NAME: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Associate a name with the calling thread, consulted by thread-locality
/// filters. Must be called once per thread before any trace call site on
/// that thread should be eligible for a thread filter match.
pub fn register_thread(name: &str) {
    CURRENT_THREAD_NAME.with(|c| *c.borrow_mut() = Some(name.to_string()));
}

fn current_thread_name() -> Option<String> {
    CURRENT_THREAD_NAME.with(|c| c.borrow().clone())
}

type LogFn = Box<dyn Fn(&str) + Send + Sync>;

/// The trace filter's full process-wide state.
pub struct TraceFilterState {
    enabled: AtomicBool,
    local_filter_on: AtomicBool,
    current_mask: AtomicU64,
    levels: Mutex<LevelRegistry>,
    file_filters: Mutex<HashMap<String, Vec<(u32, u32)>>>,
    function_filters: Mutex<HashSet<String>>,
    thread_filters: Mutex<HashSet<String>>,
    watchpoints: Mutex<Vec<Watch>>,
    callbacks: Mutex<Vec<Callback>>,
    log_fn: Mutex<Option<LogFn>>,
}

impl Default for TraceFilterState {
    fn default() -> Self {
        TraceFilterState {
            enabled: AtomicBool::new(false),
            local_filter_on: AtomicBool::new(false),
            current_mask: AtomicU64::new(0),
            levels: Mutex::new(LevelRegistry::new()),
            file_filters: Mutex::new(HashMap::new()),
            function_filters: Mutex::new(HashSet::new()),
            thread_filters: Mutex::new(HashSet::new()),
            watchpoints: Mutex::new(Vec::new()),
            callbacks: Mutex::new(Vec::new()),
            log_fn: Mutex::new(None),
        }
    }
}

impl TraceFilterState {
    pub fn new() -> Self {
        TraceFilterState::default()
    }

    /// Register every level before calling this; registration after
    /// `trace_init` fails.
    pub fn trace_init(&self, build: impl FnOnce(&mut LevelRegistry)) {
        let mut levels = self.levels.lock().unwrap();
        build(&mut levels);
        let default_mask = levels.freeze();
        self.current_mask.store(default_mask, Ordering::SeqCst);
    }

    pub fn set_log_callback(&self, f: LogFn) {
        *self.log_fn.lock().unwrap() = Some(f);
    }

    fn emit(&self, record: &str) {
        if let Some(f) = self.log_fn.lock().unwrap().as_ref() {
            f(record);
        } else {
            warn!(record, "trace emission with no log callback registered");
        }
    }

    pub fn set_enabled(&self, on: bool) {
        self.enabled.store(on, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Master switch for locality filtering (clause 3 of
    /// [`Self::is_filter_passed`]). Off by default: every configured
    /// file/function/thread filter is ignored and every site passes
    /// this clause until `trace local on` is issued.
    pub fn set_local_filter_on(&self, on: bool) {
        self.local_filter_on.store(on, Ordering::SeqCst);
    }

    pub fn set_current_mask(&self, mask: u64) {
        self.current_mask.store(mask, Ordering::SeqCst);
    }

    pub fn current_mask(&self) -> u64 {
        self.current_mask.load(Ordering::SeqCst)
    }

    pub fn reset_to_default(&self) {
        let mask = self.levels.lock().unwrap().default_mask();
        self.current_mask.store(mask, Ordering::SeqCst);
    }

    pub fn level_names(&self, mask: u64) -> Vec<String> {
        self.levels
            .lock()
            .unwrap()
            .levels()
            .iter()
            .filter(|l| mask & (1 << l.value) != 0)
            .map(|l| l.name.clone())
            .collect()
    }

    pub fn mask_for_names(&self, names: &[&str]) -> u64 {
        self.levels.lock().unwrap().mask_for(names)
    }

    pub fn add_file_filter(&self, file: &str, line_lo: u32, line_hi: u32) {
        self.file_filters.lock().unwrap().entry(file.to_string()).or_default().push((line_lo, line_hi));
    }

    pub fn add_function_filter(&self, function: &str) {
        self.function_filters.lock().unwrap().insert(function.to_string());
    }

    pub fn add_thread_filter(&self, thread: &str) {
        self.thread_filters.lock().unwrap().insert(thread.to_string());
    }

    pub fn clear_locality_filters(&self) {
        self.file_filters.lock().unwrap().clear();
        self.function_filters.lock().unwrap().clear();
        self.thread_filters.lock().unwrap().clear();
    }

    pub fn add_watch(&self, watch: Watch) {
        self.watchpoints.lock().unwrap().push(watch);
    }

    pub fn add_callback(&self, callback: Callback) {
        self.callbacks.lock().unwrap().push(callback);
    }

    /// Render the current configuration, for the `trace show` command.
    pub fn render_show(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("enabled: {}\n", self.is_enabled()));
        out.push_str(&format!("local filter: {}\n", self.local_filter_on.load(Ordering::SeqCst)));
        out.push_str(&format!("levels: {}\n", self.level_names(self.current_mask()).join(" ")));
        let files = self.file_filters.lock().unwrap();
        for (file, ranges) in files.iter() {
            out.push_str(&format!("file: {file} {ranges:?}\n"));
        }
        for f in self.function_filters.lock().unwrap().iter() {
            out.push_str(&format!("function: {f}\n"));
        }
        for t in self.thread_filters.lock().unwrap().iter() {
            out.push_str(&format!("thread: {t}\n"));
        }
        out
    }

    fn locality_matches(&self, file: &str, line: u32, function: &str) -> bool {
        let file_filters = self.file_filters.lock().unwrap();
        let function_filters = self.function_filters.lock().unwrap();
        let thread_filters = self.thread_filters.lock().unwrap();

        if file_filters.is_empty() && function_filters.is_empty() && thread_filters.is_empty() {
            return true;
        }

        if let Some(ranges) = file_filters.get(file) {
            if ranges.iter().any(|&(lo, hi)| line >= lo && line <= hi) {
                return true;
            }
        }
        if function_filters.contains(function) {
            return true;
        }
        if let Some(name) = current_thread_name() {
            if thread_filters.contains(&name) {
                return true;
            }
        }
        false
    }

    fn poll_watchpoints(&self) {
        let mut watches = self.watchpoints.lock().unwrap();
        let mut remove = Vec::new();
        for (i, w) in watches.iter().enumerate() {
            if let Some(bytes) = w.poll() {
                self.emit(&format!("watch '{}' changed: {:?}", w.name, bytes));
                match w.control {
                    TraceControl::Once => remove.push(i),
                    TraceControl::Continuous => {}
                    TraceControl::Abort => std::process::abort(),
                }
            }
        }
        for i in remove.into_iter().rev() {
            watches.remove(i);
        }
    }

    fn poll_callbacks(&self) {
        let mut callbacks = self.callbacks.lock().unwrap();
        let mut remove = Vec::new();
        for (i, c) in callbacks.iter().enumerate() {
            if c.poll() {
                self.emit(&format!("callback '{}' triggered", c.name));
                match c.control {
                    TraceControl::Once => remove.push(i),
                    TraceControl::Continuous => {}
                    TraceControl::Abort => std::process::abort(),
                }
            }
        }
        for i in remove.into_iter().rev() {
            callbacks.remove(i);
        }
    }

    /// The single hot-path query every trace call site makes. Returns
    /// true iff the site's output should be emitted; always runs the
    /// watchpoint/callback sweep as a side effect, independent of the
    /// return value.
    pub fn is_filter_passed(&self, file: &str, line: u32, function: &str, level: u32) -> bool {
        self.poll_watchpoints();
        self.poll_callbacks();

        if !self.is_enabled() {
            return false;
        }

        let maskable = self.levels.lock().unwrap().is_maskable(level);
        if maskable && self.current_mask() & (1 << level) == 0 {
            return false;
        }

        if !self.local_filter_on.load(Ordering::SeqCst) {
            return true;
        }

        self.locality_matches(file, line, function)
    }
}
