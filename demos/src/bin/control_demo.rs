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

//! Worked example of a Control Client: connects to a remote Shell
//! Server and lets the user drive it interactively from a terminal.

use std::io::{self, BufRead, Write};

use clap::Parser;
use pshell::control::{self, ControlResult};

#[derive(Parser)]
struct Args {
    /// name this session registers under in pshell-control.conf lookups
    control_name: String,

    /// hostname, IP address, or UNIX server name of the remote shell
    remote: String,

    /// port number of a UDP server, or "unix" for a UNIX datagram server
    port: String,

    /// wait timeout for a response, in milliseconds
    #[arg(short = 't', long, default_value_t = 100)]
    timeout: u64,

    /// extract and print the response payload instead of firing and forgetting
    #[arg(long)]
    extract: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    pshell::init_logging(tracing::Level::WARN, None)?;

    let port: u16 = if args.port == "unix" { 0 } else { args.port.parse()? };

    let sid = control::connect(&args.control_name, &args.remote, port, args.timeout)
        .map_err(|e| anyhow::anyhow!("connect failed: {e}"))?;

    println!("Enter command or 'q' to quit");
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("pshellControlCmd> ");
        io::stdout().flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        if command == "q" {
            break;
        }

        if args.extract {
            let (status, results) = control::send_command_extract(
                sid,
                300,
                Some(std::time::Duration::from_millis(args.timeout)),
                command,
            );
            if status == ControlResult::Success && !results.is_empty() {
                println!("{} bytes extracted, results:\n{}", results.len(), results);
            } else {
                println!("No results extracted");
            }
        } else {
            control::send_command(sid, Some(std::time::Duration::from_millis(args.timeout)), command);
        }
    }

    control::disconnect(sid);
    Ok(())
}
