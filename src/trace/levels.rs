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

//! The trace level registry. Levels are named bits in the current trace
//! mask; non-maskable levels (typically just `ERROR`) always pass.
//! Registration is only permitted before [`LevelRegistry::freeze`] is
//! called, matching `trace_init`'s one-shot setup in the original API.

use std::fmt;

/// One named trace level. `value` is the bit position within the 64-bit
/// trace mask, so levels above 63 cannot be represented.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceLevel {
    pub name: String,
    pub value: u32,
    pub is_default_on: bool,
    pub is_maskable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelError {
    DuplicateName(String),
    DuplicateValue(u32),
    ValueOutOfRange(u32),
    RegistryFrozen,
}

impl fmt::Display for LevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelError::DuplicateName(n) => write!(f, "trace level '{n}' already registered"),
            LevelError::DuplicateValue(v) => write!(f, "trace level value {v} already registered"),
            LevelError::ValueOutOfRange(v) => write!(f, "trace level value {v} exceeds the 64-bit mask width"),
            LevelError::RegistryFrozen => write!(f, "trace levels are frozen after trace_init"),
        }
    }
}

impl std::error::Error for LevelError {}

#[derive(Default)]
pub struct LevelRegistry {
    levels: Vec<TraceLevel>,
    frozen: bool,
}

impl LevelRegistry {
    pub fn new() -> Self {
        LevelRegistry::default()
    }

    pub fn add_level(
        &mut self,
        name: &str,
        value: u32,
        is_default_on: bool,
        is_maskable: bool,
    ) -> Result<(), LevelError> {
        if self.frozen {
            return Err(LevelError::RegistryFrozen);
        }
        if value >= 64 {
            return Err(LevelError::ValueOutOfRange(value));
        }
        if self.levels.iter().any(|l| l.name == name) {
            return Err(LevelError::DuplicateName(name.to_string()));
        }
        if self.levels.iter().any(|l| l.value == value) {
            return Err(LevelError::DuplicateValue(value));
        }
        self.levels.push(TraceLevel { name: name.to_string(), value, is_default_on, is_maskable });
        Ok(())
    }

    /// Freeze the registry and compute the default mask (the OR of every
    /// `is_default_on` level's bit).
    pub fn freeze(&mut self) -> u64 {
        self.frozen = true;
        self.default_mask()
    }

    pub fn default_mask(&self) -> u64 {
        self.levels.iter().filter(|l| l.is_default_on).fold(0u64, |acc, l| acc | (1 << l.value))
    }

    pub fn find(&self, name: &str) -> Option<&TraceLevel> {
        self.levels.iter().find(|l| l.name == name)
    }

    pub fn is_maskable(&self, value: u32) -> bool {
        self.levels.iter().find(|l| l.value == value).map(|l| l.is_maskable).unwrap_or(true)
    }

    pub fn levels(&self) -> &[TraceLevel] {
        &self.levels
    }

    pub fn mask_for(&self, names: &[&str]) -> u64 {
        names.iter().filter_map(|n| self.find(n)).fold(0u64, |acc, l| acc | (1 << l.value))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn names_and_values_must_be_unique() {
        let mut reg = LevelRegistry::new();
        reg.add_level("INFO", 0, true, true).unwrap();
        assert_eq!(reg.add_level("INFO", 1, true, true).unwrap_err(), LevelError::DuplicateName("INFO".to_string()));
        assert_eq!(reg.add_level("DEBUG", 0, true, true).unwrap_err(), LevelError::DuplicateValue(0));
    }

    #[test]
    fn registration_fails_after_freeze() {
        let mut reg = LevelRegistry::new();
        reg.add_level("INFO", 0, true, true).unwrap();
        reg.freeze();
        assert_eq!(reg.add_level("DEBUG", 1, true, true).unwrap_err(), LevelError::RegistryFrozen);
    }

    #[test]
    fn default_mask_only_includes_default_on_levels() {
        let mut reg = LevelRegistry::new();
        reg.add_level("INFO", 0, true, true).unwrap();
        reg.add_level("DEBUG", 1, false, true).unwrap();
        let mask = reg.freeze();
        assert_eq!(mask, 0b01);
    }

    #[test]
    fn error_level_is_non_maskable_by_convention() {
        let mut reg = LevelRegistry::new();
        reg.add_level("ERROR", 0, true, false).unwrap();
        assert!(!reg.is_maskable(0));
    }
}
