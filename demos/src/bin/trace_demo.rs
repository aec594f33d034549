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

//! Worked example of the dynamic trace filter: a couple of functions and
//! a worker thread emit trace records gated by [`pshell::trace`], with
//! a `setTriggers` command exposing a watchpoint and a callback trigger
//! alongside the standard `trace`/`set` commands.

use std::{
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
    thread,
    time::Duration,
};

use clap::{Parser, ValueEnum};
use pshell::{
    registry::DispatchContext,
    server::{ShellServerBuilder, StartMode, Transport},
    tokenizer, trace,
};

#[derive(Copy, Clone, ValueEnum)]
enum TransportArg {
    Udp,
    UnixDgram,
    Tcp,
}

#[derive(Parser)]
struct Args {
    #[arg(value_enum, default_value_t = TransportArg::Udp)]
    transport: TransportArg,

    #[arg(long, default_value = "0.0.0.0:6002")]
    bind: String,
}

fn trace_line(function: &str, level: &str, level_value: u32, message: &str) {
    if trace::is_filter_passed(file!(), line!(), function, level_value) {
        eprintln!("[{level}] {function}: {message}");
    }
}

fn foo() {
    trace_line("foo", "INFO", 1, "message 1");
    thread::sleep(Duration::from_secs(1));
    trace_line("foo", "INFO", 1, "message 2");
}

fn bar() {
    trace_line("bar", "INFO", 1, "message 1");
    thread::sleep(Duration::from_secs(1));
    trace_line("bar", "INFO", 1, "message 2");
}

static WATCH_ADDRESS: AtomicU32 = AtomicU32::new(0);
static CALLBACK_CONDITION: AtomicBool = AtomicBool::new(false);

fn spawn_worker_thread() {
    thread::spawn(|| {
        trace::register_thread("myThread");
        loop {
            trace_line("myThread", "WARNING", 2, "message 1");
            thread::sleep(Duration::from_secs(1));
            trace_line("myThread", "INFO", 1, "message 2");
            thread::sleep(Duration::from_secs(1));
            trace_line("myThread", "DEBUG", 3, "message 3");
            thread::sleep(Duration::from_secs(1));
            trace_line("myThread", "ERROR", 0, "message 4");
            thread::sleep(Duration::from_secs(1));
        }
    });
}

fn set_triggers(argv: &[&str], ctx: &mut DispatchContext) {
    if tokenizer::is_substring(argv[0], "callback", 1) {
        if tokenizer::is_substring(argv[1], "true", 1) {
            CALLBACK_CONDITION.store(true, Ordering::SeqCst);
        } else if tokenizer::is_substring(argv[1], "false", 1) {
            CALLBACK_CONDITION.store(false, Ordering::SeqCst);
        } else {
            ctx.show_usage();
        }
    } else if tokenizer::is_substring(argv[0], "watchpoint", 1) {
        if tokenizer::is_numeric(argv[1]) {
            WATCH_ADDRESS.store(argv[1].parse().unwrap_or(0), Ordering::SeqCst);
        } else {
            ctx.show_usage();
        }
    } else {
        ctx.show_usage();
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    pshell::init_logging(tracing::Level::INFO, None)?;

    trace::GLOBAL.trace_init(|levels| {
        levels.add_level("ERROR", 0, true, false).unwrap();
        levels.add_level("INFO", 1, true, true).unwrap();
        levels.add_level("WARNING", 2, true, true).unwrap();
        levels.add_level("DEBUG", 3, false, true).unwrap();
    });
    trace::GLOBAL.set_enabled(true);
    trace::GLOBAL.add_watch(trace::Watch::new(
        "watchAddress",
        trace::TraceControl::Continuous,
        Box::new(|| WATCH_ADDRESS.load(Ordering::SeqCst).to_le_bytes().to_vec()),
    ));
    trace::GLOBAL.add_callback(trace::Callback::new(
        "callbackCondition",
        trace::TraceControl::Continuous,
        Box::new(|| CALLBACK_CONDITION.load(Ordering::SeqCst)),
    ));

    spawn_worker_thread();
    thread::spawn(|| loop {
        foo();
        bar();
        thread::sleep(Duration::from_secs(2));
    });

    let server = ShellServerBuilder::new("traceFilterDemo")
        .title("PSHELL Trace Filter Demo")
        .add_command(
            "setTriggers",
            Box::new(set_triggers),
            "set the watchpoint address or callback condition",
            Some("callback <true|false> | watchpoint <address>"),
            2,
            2,
            true,
        )?
        .with_registry(|registry| trace::commands::register(registry, trace::GLOBAL.clone()))?
        .build();

    let transport = match args.transport {
        TransportArg::Udp => Transport::Udp { bind_addr: args.bind },
        TransportArg::UnixDgram => Transport::UnixDgram,
        TransportArg::Tcp => Transport::Tcp { bind_addr: args.bind },
    };
    server.start(transport, StartMode::Blocking)
}
