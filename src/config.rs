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

//! Config file loading.
//!
//! Two file formats are in play here. `pshell-server.conf` and
//! `pshell-control.conf` use pshell's own line-oriented stanza format,
//! inherited unchanged from the original C implementation, so hosts that
//! already have config files for the C library can reuse them verbatim.
//! A separate, optional `pshell.toml` carries this crate's own ambient
//! settings (trace verbosity, default payload size) and is parsed with
//! `serde`/`toml` like any other Rust-native config.

use std::{collections::HashMap, env, fs, path::PathBuf};

use anyhow::Context;
use serde_derive::Deserialize;
use tracing::{info, instrument, warn};

use crate::consts;

/// Search `$PSHELL_CONFIG_DIR`, then `/etc/pshell`, then the current
/// working directory, for `filename`. Returns the first hit.
pub fn find_config_file(filename: &str) -> Option<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    if let Ok(dir) = env::var(consts::CONFIG_DIR_VAR) {
        dirs.push(PathBuf::from(dir));
    }
    dirs.push(PathBuf::from(consts::DEFAULT_CONFIG_DIR));
    if let Ok(cwd) = env::current_dir() {
        dirs.push(cwd);
    }

    for dir in dirs {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

/// A parsed `key=value` stanza, keyed by stanza name (the bracketed
/// header line, e.g. `[myServer]`).
#[derive(Debug, Clone, Default)]
pub struct Stanza(HashMap<String, String>);

impl Stanza {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.as_str())
    }
}

/// Parse pshell's line-oriented config format: `#` starts a comment,
/// `[name]` opens a stanza, `key=value` sets a key within the current
/// stanza, quoted values have their surrounding quotes stripped.
#[instrument(skip(contents))]
fn parse_stanzas(contents: &str) -> HashMap<String, Stanza> {
    let mut stanzas: HashMap<String, Stanza> = HashMap::new();
    let mut current: Option<String> = None;

    for raw_line in contents.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            current = Some(name.trim().to_string());
            stanzas.entry(name.trim().to_string()).or_default();
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            warn!(line, "ignoring malformed config line");
            continue;
        };
        let key = key.trim().to_string();
        let value = unquote(value.trim());

        let Some(stanza_name) = &current else {
            warn!(line, "key=value line outside of any stanza");
            continue;
        };
        stanzas.entry(stanza_name.clone()).or_default().0.insert(key, value);
    }

    stanzas
}

fn unquote(s: &str) -> String {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 && (bytes[0] == b'"' || bytes[0] == b'\'') && bytes[bytes.len() - 1] == bytes[0] {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

/// Load and parse `pshell-server.conf`, returning the stanza named
/// `server_name`, if any.
#[instrument]
pub fn load_server_stanza(server_name: &str) -> anyhow::Result<Option<Stanza>> {
    load_stanza(consts::SERVER_CONFIG_FILE, server_name)
}

/// Load and parse `pshell-control.conf`, returning the stanza named
/// `control_name`, if any.
#[instrument]
pub fn load_control_stanza(control_name: &str) -> anyhow::Result<Option<Stanza>> {
    load_stanza(consts::CONTROL_CONFIG_FILE, control_name)
}

fn load_stanza(filename: &str, stanza_name: &str) -> anyhow::Result<Option<Stanza>> {
    let Some(path) = find_config_file(filename) else {
        return Ok(None);
    };
    info!(?path, "reading config file");
    let contents = fs::read_to_string(&path).context("reading config file")?;
    let stanzas = parse_stanzas(&contents);
    Ok(stanzas.get(stanza_name).cloned())
}

/// This crate's own ambient settings, layered over pshell's native config
/// files. Optional; defaults apply if no `pshell.toml` is found.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct AmbientConfig {
    /// Overrides the initial (pre-negotiation) wire payload size.
    pub default_payload_size: Option<usize>,

    /// `tracing` level filter string (e.g. "info", "debug") for the
    /// in-library server/control log-level knob described in
    /// `PshellServer.h`/`PshellControl.h`.
    pub log_level: Option<String>,
}

#[instrument]
pub fn read_ambient_config(path: &Option<String>) -> anyhow::Result<AmbientConfig> {
    let resolved = match path {
        Some(p) => Some(PathBuf::from(p)),
        None => find_config_file("pshell.toml"),
    };

    match resolved {
        Some(p) => {
            let contents = fs::read_to_string(&p).context("reading pshell.toml")?;
            toml::from_str(&contents).context("parsing pshell.toml")
        }
        None => Ok(AmbientConfig::default()),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_multiple_stanzas() {
        let contents = r#"
            # a comment
            [myServer]
            port=6001
            host=localhost
            type=udp

            [otherServer]
            type = "unix"
        "#;
        let stanzas = parse_stanzas(contents);
        assert_eq!(stanzas["myServer"].get("port"), Some("6001"));
        assert_eq!(stanzas["myServer"].get("type"), Some("udp"));
        assert_eq!(stanzas["otherServer"].get("type"), Some("unix"));
    }

    #[test]
    fn ignores_malformed_lines() {
        let stanzas = parse_stanzas("[a]\nnotakeyvalue\nport=1\n");
        assert_eq!(stanzas["a"].get("port"), Some("1"));
        assert_eq!(stanzas["a"].get("notakeyvalue"), None);
    }

    #[test]
    fn ambient_config_defaults_when_absent() {
        let cfg = AmbientConfig::default();
        assert!(cfg.default_payload_size.is_none());
        assert!(cfg.log_level.is_none());
    }

    #[test]
    fn ambient_config_parses_toml() {
        let cfg: AmbientConfig = toml::from_str("log_level = \"debug\"\n").unwrap();
        assert_eq!(cfg.log_level.as_deref(), Some("debug"));
    }
}
