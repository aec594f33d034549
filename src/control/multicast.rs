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

//! Multicast groups: a keyword maps to an ordered list of control
//! sessions. Sending fans a command out to every member, in registration
//! order, discarding all responses.

use std::{
    collections::HashMap,
    sync::Mutex,
};

use lazy_static::lazy_static;
use tracing::{instrument, warn};

use crate::control::session;

lazy_static! {
    static ref GROUPS: Mutex<HashMap<String, Vec<u16>>> = Mutex::new(HashMap::new());
}

/// Register every session named in `members_csv` (a comma-separated list
/// of control names, each resolved against the live session table via
/// [`session::session_control_name`]) to the group named `keyword`, in
/// listed order. A name with no currently-connected session is skipped
/// and logged; idempotent per member, same as [`add_multicast_sid`].
#[instrument]
pub fn add_multicast(keyword: &str, members_csv: &str) {
    let live_sids = session::all_sids();
    for name in members_csv.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match live_sids.iter().find(|&&sid| session::session_control_name(sid).as_deref() == Some(name)) {
            Some(&sid) => add_multicast_sid(keyword, sid),
            None => warn!(name, keyword, "multicast member has no live control session, skipping"),
        }
    }
}

/// Register `sid` as a member of the group named `keyword`. Idempotent:
/// registering the same `(keyword, sid)` pair twice leaves the group
/// unchanged the second time.
#[instrument]
pub fn add_multicast_sid(keyword: &str, sid: u16) {
    let mut groups = GROUPS.lock().unwrap();
    let members = groups.entry(keyword.to_string()).or_default();
    if !members.contains(&sid) {
        members.push(sid);
    }
}

/// Send `line` as a `CONTROL_COMMAND` to every member of the group whose
/// keyword matches `line`'s first whitespace-delimited token, in
/// registration order. Fire-and-forget: no response is collected from
/// any member, and a member whose socket errors is logged and skipped.
#[instrument(skip(line))]
pub fn send_multicast(line: &str) {
    let Some(keyword) = line.split_whitespace().next() else { return };
    let members = { GROUPS.lock().unwrap().get(keyword).cloned().unwrap_or_default() };
    for sid in members {
        if let Err(e) = session::send_fire_and_forget(sid, line) {
            warn!(sid, "multicast send failed: {}", e);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn registering_twice_is_idempotent() {
        let keyword = "test_idempotent_keyword";
        add_multicast_sid(keyword, 1);
        add_multicast_sid(keyword, 1);
        add_multicast_sid(keyword, 2);
        let members = GROUPS.lock().unwrap().get(keyword).cloned().unwrap();
        assert_eq!(members, vec![1, 2]);
    }

    #[test]
    fn send_multicast_to_unknown_keyword_is_a_noop() {
        send_multicast("no_such_keyword_in_any_test arg");
    }

    #[test]
    fn csv_entry_with_no_live_session_is_skipped() {
        let keyword = "test_csv_no_session_keyword";
        add_multicast(keyword, "noSuchControlName");
        assert!(GROUPS.lock().unwrap().get(keyword).map(Vec::is_empty).unwrap_or(true));
    }
}
