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

//! Worked example of a host program that registers a handful of commands
//! and serves them over one of pshell's four transports.

use clap::{Parser, ValueEnum};
use pshell::{
    server::{ShellServerBuilder, StartMode, Transport},
    tokenizer,
};

#[derive(Copy, Clone, ValueEnum)]
enum TransportArg {
    Udp,
    UnixDgram,
    Tcp,
    Local,
}

#[derive(Parser)]
struct Args {
    /// which transport to serve the demo shell over
    #[arg(value_enum, default_value_t = TransportArg::Local)]
    transport: TransportArg,

    /// bind address for the udp/tcp transports
    #[arg(long, default_value = "0.0.0.0:6001")]
    bind: String,
}

fn hello_world(argv: &[&str], ctx: &mut pshell::registry::DispatchContext) {
    ctx.printf(format_args!("helloWorld command dispatched:\n"));
    for (i, arg) in argv.iter().enumerate() {
        ctx.printf(format_args!("  argv[{i}]: '{arg}'\n"));
    }
}

fn wildcard_match(argv: &[&str], ctx: &mut pshell::registry::DispatchContext) {
    if ctx.is_help() {
        ctx.show_usage();
        ctx.printf(format_args!("\n  where valid <args> are:\n"));
        ctx.printf(format_args!(
            "    on\n    of*f\n    a*ll\n    sy*mbols\n    se*ttings\n    d*efault\n"
        ));
        return;
    }
    let arg = argv.first().copied().unwrap_or("");
    let matched = [("on", 2), ("off", 2), ("all", 1), ("symbols", 2), ("settings", 2), ("default", 1)]
        .into_iter()
        .find(|&(word, min)| tokenizer::is_substring(arg, word, min));
    match matched {
        Some((word, _)) => ctx.printf(format_args!("argv '{word}' match\n")),
        None => {
            ctx.show_usage();
            ctx.printf(format_args!("\n  where valid <args> are:\n"));
            ctx.printf(format_args!(
                "    on\n    of*f\n    a*ll\n    sy*mbols\n    se*ttings\n    d*efault\n"
            ));
        }
    }
}

const MAX_MONTH: i32 = 12;
const MAX_DAY: i32 = 31;
const MAX_YEAR: i32 = 3000;
const MAX_HOUR: i32 = 23;
const MAX_MINUTE: i32 = 59;
const MAX_SECOND: i32 = 59;

fn advanced_parsing(argv: &[&str], ctx: &mut pshell::registry::DispatchContext) {
    let date = tokenizer::tokenize(argv[0], "/");
    let time = tokenizer::tokenize(argv[1], ":");

    if date.len() != 3 || time.len() != 3 {
        ctx.printf(format_args!("ERROR: Improper timestamp format!!\n"));
        ctx.show_usage();
        return;
    }

    let fields: [(&str, i32, &str); 6] = [
        (date.get(0).unwrap(), MAX_MONTH, "month"),
        (date.get(1).unwrap(), MAX_DAY, "day"),
        (date.get(2).unwrap(), MAX_YEAR, "year"),
        (time.get(0).unwrap(), MAX_HOUR, "hour"),
        (time.get(1).unwrap(), MAX_MINUTE, "minute"),
        (time.get(2).unwrap(), MAX_SECOND, "second"),
    ];
    for (token, max, name) in fields {
        let valid = tokenizer::is_decimal(token) && token.parse::<i32>().map(|v| v <= max).unwrap_or(false);
        if !valid {
            ctx.printf(format_args!("ERROR: Invalid {name}: {token}, must be numeric value <= {max}\n"));
            return;
        }
    }

    ctx.printf(format_args!(
        "Month  : {}\nDay    : {}\nYear   : {}\nHour   : {}\nMinute : {}\nSecond : {}\n",
        date.get(0).unwrap(),
        date.get(1).unwrap(),
        date.get(2).unwrap(),
        time.get(0).unwrap(),
        time.get(1).unwrap(),
        time.get(2).unwrap(),
    ));
}

fn keep_alive(argv: &[&str], ctx: &mut pshell::registry::DispatchContext) {
    if ctx.is_help() {
        ctx.show_usage();
        ctx.printf(format_args!(
            "\nNote, this demonstrates intermediate flushes in a callback command to\n\
             keep a UDP/UNIX interactive client from timing out on a slow command.\n"
        ));
        return;
    }
    let marker = match argv.first().copied() {
        Some("dots") => ".",
        Some("bang") => "!",
        Some("pound") => "#",
        _ => {
            ctx.show_usage();
            return;
        }
    };
    ctx.printf(format_args!("marching keep alive:\n"));
    for _ in 0..10 {
        ctx.march(marker);
        std::thread::sleep(std::time::Duration::from_millis(200));
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    pshell::init_logging(tracing::Level::INFO, None)?;

    let server = ShellServerBuilder::new("pshellServerDemo")
        .title("PSHELL Server Demo")
        .banner("PSHELL: Command Line Interface")
        .prompt("PSHELL> ")
        .add_command(
            "helloWorld",
            Box::new(hello_world),
            "command that just prints out all of its passed in arguments",
            Some("<arg1> [<arg2>...<argN>]"),
            0,
            pshell::consts::MAX_COMMAND_ARGS,
            true,
        )?
        .add_command(
            "wildcardMatch",
            Box::new(wildcard_match),
            "show wildcard matching for command arguments",
            Some("<arg>"),
            1,
            1,
            false,
        )?
        .add_command(
            "advancedParsing",
            Box::new(advanced_parsing),
            "show advanced command line parsing",
            Some("<mm/dd/yyyy> <hh:mm:ss>"),
            2,
            2,
            true,
        )?
        .add_command(
            "keepAlive",
            Box::new(keep_alive),
            "show a command that keeps a UDP/UNIX client alive during a long call",
            Some("dots | bang | pound"),
            1,
            1,
            false,
        )?
        .build();

    let transport = match args.transport {
        TransportArg::Udp => Transport::Udp { bind_addr: args.bind },
        TransportArg::UnixDgram => Transport::UnixDgram,
        TransportArg::Tcp => Transport::Tcp { bind_addr: args.bind },
        TransportArg::Local => Transport::Local,
    };
    server.start(transport, StartMode::Blocking)
}
