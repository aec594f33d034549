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

//! The Control Client: drives commands in a remote Shell Server, either
//! one session at a time via [`session`] or fanned out across sessions
//! via [`multicast`].

pub mod multicast;
pub mod session;

pub use session::{connect, disconnect, disconnect_all, send_command, send_command_extract, set_default_timeout, ConnectError, ControlResult};
