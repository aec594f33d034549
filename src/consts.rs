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

use std::time;

/// Upper bound on `min_args`/`max_args` for any registered command.
pub const MAX_COMMAND_ARGS: u8 = 30;

/// TCP shell sessions are closed after this much time with no input.
pub const TCP_IDLE_TIMEOUT: time::Duration = time::Duration::from_secs(10 * 60);

/// Bound on the number of concurrently live Control Client sessions.
pub const MAX_CONTROL_SESSIONS: usize = 256;

/// Number of probe attempts when allocating a session id before giving up.
pub const SID_ALLOC_PROBES: usize = 4096;

/// Directory datagram/local-socket shell servers bind their socket under.
pub const LOCAL_SOCKET_DIR: &str = "/tmp";

/// Prefix used for ephemeral Control Client local sockets.
pub const CONTROL_CLIENT_SOCKET_PREFIX: &str = "pshellControlClient";

/// Environment variable used to override the config file search directory.
pub const CONFIG_DIR_VAR: &str = "PSHELL_CONFIG_DIR";

/// Fallback config directory, consulted after `$PSHELL_CONFIG_DIR`.
pub const DEFAULT_CONFIG_DIR: &str = "/etc/pshell";

pub const SERVER_CONFIG_FILE: &str = "pshell-server.conf";
pub const CONTROL_CONFIG_FILE: &str = "pshell-control.conf";

/// Size of the datagram worker pool used by UDP/UNIX-datagram shells.
pub const DATAGRAM_WORKER_POOL_SIZE: usize = 4;

/// Poll interval used when joining worker threads during teardown.
pub const JOIN_POLL_DURATION: time::Duration = time::Duration::from_millis(100);
