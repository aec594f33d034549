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

//! Registers the `trace` and `set` commands into a [`CommandRegistry`],
//! wiring the shell surface described for the trace filter onto
//! [`TraceFilterState`].

use std::sync::Arc;

use crate::{registry::CommandRegistry, trace::filter::TraceFilterState};

fn parse_file_spec(spec: &str) -> (String, Option<(u32, u32)>) {
    let Some((name, range)) = spec.split_once(':') else { return (spec.to_string(), None) };
    let Some((lo, hi)) = range.split_once('-') else { return (spec.to_string(), None) };
    match (lo.parse(), hi.parse()) {
        (Ok(lo), Ok(hi)) => (name.to_string(), Some((lo, hi))),
        _ => (spec.to_string(), None),
    }
}

/// Install `trace` (and its `set` alias for toggling a single level) into
/// `registry`, closing over `state`.
pub fn register(registry: &mut CommandRegistry, state: Arc<TraceFilterState>) -> Result<(), crate::registry::RegistryError> {
    let trace_state = state.clone();
    registry.add_command(
        "trace",
        Box::new(move |argv, ctx| {
            let Some(&sub) = argv.first() else {
                ctx.printf(format_args!("{}", trace_state.render_show()));
                return;
            };
            match sub {
                "on" => trace_state.set_enabled(true),
                "off" => trace_state.set_enabled(false),
                "default" => trace_state.reset_to_default(),
                "show" => ctx.printf(format_args!("{}", trace_state.render_show())),
                "local" => match argv.get(1).copied() {
                    Some("on") => trace_state.set_local_filter_on(true),
                    Some("off") => trace_state.set_local_filter_on(false),
                    _ => ctx.printf(format_args!("usage: trace local on|off")),
                },
                "level" => {
                    let names: Vec<&str> = argv[1..].to_vec();
                    trace_state.set_current_mask(trace_state.mask_for_names(&names));
                }
                "file" => {
                    for spec in &argv[1..] {
                        let (name, range) = parse_file_spec(spec);
                        let (lo, hi) = range.unwrap_or((0, u32::MAX));
                        trace_state.add_file_filter(&name, lo, hi);
                    }
                }
                "function" => {
                    for f in &argv[1..] {
                        trace_state.add_function_filter(f);
                    }
                }
                "thread" => {
                    for t in &argv[1..] {
                        trace_state.add_thread_filter(t);
                    }
                }
                _ => ctx.printf(format_args!("ERROR: unknown trace sub-command '{sub}'")),
            }
        }),
        "show or control the dynamic trace filter",
        Some("on|off|default|show|local on|off|level <name>...|file <name[:lo-hi]>...|function <name>...|thread <name>..."),
        0,
        crate::consts::MAX_COMMAND_ARGS,
        true,
    )?;

    registry.add_command(
        "set",
        Box::new(move |argv, ctx| {
            let (Some(&name), Some(&onoff)) = (argv.first(), argv.get(1)) else {
                ctx.printf(format_args!("usage: set <levelName> on|off"));
                return;
            };
            let mut mask = state.current_mask();
            let bit = state.mask_for_names(&[name]);
            match onoff {
                "on" => mask |= bit,
                "off" => mask &= !bit,
                _ => {
                    ctx.printf(format_args!("usage: set <levelName> on|off"));
                    return;
                }
            }
            state.set_current_mask(mask);
        }),
        "toggle a single trace level on or off",
        Some("<levelName> on|off"),
        2,
        2,
        true,
    )?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::registry::DuplicatePolicy;

    fn registry_with_trace() -> (CommandRegistry, Arc<TraceFilterState>) {
        let state = Arc::new(TraceFilterState::new());
        state.trace_init(|levels| {
            levels.add_level("ERROR", 0, true, false).unwrap();
            levels.add_level("INFO", 1, true, true).unwrap();
            levels.add_level("DEBUG", 2, false, true).unwrap();
        });
        let mut reg = CommandRegistry::new(DuplicatePolicy::Reject);
        register(&mut reg, state.clone()).unwrap();
        (reg, state)
    }

    #[test]
    fn trace_on_and_off_toggle_enabled() {
        let (mut reg, state) = registry_with_trace();
        reg.run_command("trace on");
        assert!(state.is_enabled());
        reg.run_command("trace off");
        assert!(!state.is_enabled());
    }

    #[test]
    fn trace_level_sets_current_mask() {
        let (mut reg, state) = registry_with_trace();
        reg.run_command("trace level DEBUG");
        assert_eq!(state.current_mask(), state.mask_for_names(&["DEBUG"]));
    }

    #[test]
    fn set_command_toggles_a_single_level() {
        let (mut reg, state) = registry_with_trace();
        reg.run_command("trace default");
        let before = state.current_mask();
        reg.run_command("set DEBUG on");
        assert_eq!(state.current_mask(), before | state.mask_for_names(&["DEBUG"]));
        reg.run_command("set DEBUG off");
        assert_eq!(state.current_mask(), before);
    }

    #[test]
    fn trace_file_parses_line_range() {
        let (name, range) = parse_file_spec("main.rs:10-20");
        assert_eq!(name, "main.rs");
        assert_eq!(range, Some((10, 20)));
    }
}
